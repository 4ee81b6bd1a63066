//! # Trivia Client Library
//!
//! This library provides the client side of the trivia sync protocol: a
//! self-healing WebSocket connection, a local view of the game and a small
//! console front end for hosts and players.
//!
//! ## Architecture Overview
//!
//! The server is authoritative. A client never edits the game locally; it
//! sends commands and waits for the next snapshot. What the client owns is
//! the connection itself:
//!
//! ### Liveness
//! The server sends a heartbeat every 1500 ms. If none arrives for 5000 ms
//! the socket is closed and a reconnect is scheduled.
//!
//! ### Reconnect Backoff
//! The first retry is immediate. Every further failure adds 1000 ms up to a
//! cap of 5000 ms, and a successful open resets the delay.
//!
//! ### Snapshot Ordering
//! Every snapshot carries the server time it was taken at. A snapshot older
//! than the newest one applied is dropped, across reconnects too.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! I/O-free connection bookkeeping: status, backoff, the snapshot guard and
//! classification of inbound frames.
//!
//! ### Network Module (`network`)
//! The async `ConnectionManager` that owns the socket and publishes
//! `ConnectionEvent`s.
//!
//! ### Game Module (`game`)
//! The local view of the game built from connection events.
//!
//! ### Input Module (`input`)
//! Parses console lines into protocol commands.
//!
//! ### Rendering Module (`rendering`)
//! Plain text rendering of the local view.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{ClientConfig, ConnectionEvent, ConnectionManager};
//! use shared::{Command, PlayerId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(ClientConfig::default());
//!     let mut events = manager.subscribe();
//!     manager.start();
//!
//!     while let Ok(event) = events.recv().await {
//!         if let ConnectionEvent::Connected = event {
//!             manager
//!                 .send_command(&Command::Buzz { player_id: PlayerId(0) })
//!                 .await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
