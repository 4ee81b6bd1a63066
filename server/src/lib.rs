//! # Trivia Server Library
//!
//! This library provides the authoritative server for a live trivia event. A
//! host console, a public display and per-player buzzer devices all connect
//! over WebSockets and observe one shared game state in real time.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! The server owns the player roster, the buzzer queue and the currently
//! selected activity together with its interaction state. Clients never
//! mutate state directly; they send commands and receive snapshots.
//!
//! ### Validation
//! Commands are decoded in two phases. Decoding only establishes a known
//! command tag. Interaction states and effects stay raw JSON until the
//! validators check them against the rules of the game and the catalog.
//! Anything that fails is dropped and logged, with no reply.
//!
//! ### State Broadcasting
//! Every accepted mutation that changes observable state produces exactly
//! one `GameState` snapshot, pushed to every connection. Mutations that
//! change nothing produce nothing.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One hub task owns the engine and the connection registry. Connection
//! tasks do socket I/O only and forward everything to the hub over a
//! channel, so commands are applied in arrival order and each is handled to
//! completion before the next.
//!
//! ### Liveness
//! Each connection task sends a `Heartbeat` event every 1500 ms. Clients
//! that hear nothing for 5000 ms drop the connection and reconnect.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Registry of live connections and their outbound channels.
//!
//! ### Game Module (`game`)
//! The game engine, the host role and command dispatch.
//!
//! ### Network Module (`network`)
//! Accept loop, per-connection tasks and the broadcast hub.
//!
//! ### Settings Module (`settings`)
//! Loads the player roster and the activity catalog from the media home.
//!
//! ### Validation Module (`validation`)
//! Validators for interaction states and effects.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::GameEngine;
//! use server::network::{Server, ServerConfig};
//! use shared::Activities;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = GameEngine::new(Arc::new(Activities::new()));
//!     engine.add_player("Ada", "http://127.0.0.1:8334/media/ada.png", None);
//!
//!     let server = Server::bind(ServerConfig::default(), engine).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod settings;
pub mod validation;
