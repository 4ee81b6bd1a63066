//! Registry of live WebSocket connections
//!
//! Connections carry no identity beyond the transport: each one gets a
//! server-assigned id and an outbound channel drained by its connection
//! task. The registry is owned by the hub task, so it needs no locking.

use log::{debug, info};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A connected client as seen by the hub
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the accept loop
    pub id: u32,
    /// Peer address, for logging only
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Outbound frames, written to the socket by the connection task
    sender: mpsc::UnboundedSender<Message>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues a text frame; returns false if the connection task is gone
    pub fn send(&self, text: &str) -> bool {
        self.sender.send(Message::Text(text.into())).is_ok()
    }
}

/// All live connections, indexed by connection id
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, replacing any stale entry under the same id
    pub fn add_client(&mut self, client: Client) {
        info!("Client {} connected from {}", client.id, client.addr);
        self.clients.insert(client.id, client);
    }

    /// Removes a connection; returns false if it was already gone
    pub fn remove_client(&mut self, client_id: u32) -> bool {
        match self.clients.remove(&client_id) {
            Some(client) => {
                info!(
                    "Client {} disconnected after {:.1}s",
                    client.id,
                    client.connected_at.elapsed().as_secs_f32()
                );
                true
            }
            None => false,
        }
    }

    /// Sends a text frame to one connection
    pub fn send_to(&self, client_id: u32, text: &str) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|client| client.send(text))
    }

    /// Sends a text frame to every connection
    ///
    /// Best effort: connections whose task already exited are skipped and
    /// left for their `Closed` notification to clean up. Returns the number
    /// of connections the frame was queued for.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;
        for client in self.clients.values() {
            if client.send(text) {
                delivered += 1;
            } else {
                debug!("Skipping closed client {}", client.id);
            }
        }
        delivered
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("Unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_add_and_remove_client() {
        let mut manager = ClientManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.add_client(Client::new(1, test_addr(), tx));
        assert_eq!(manager.len(), 1);
        assert!(manager.send_to(1, "hi"));

        assert!(manager.remove_client(1));
        assert!(!manager.remove_client(1));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_send_to_single_client() {
        let mut manager = ClientManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.add_client(Client::new(1, test_addr(), tx1));
        manager.add_client(Client::new(2, test_addr(), tx2));

        assert!(manager.send_to(2, "hello"));
        assert!(!manager.send_to(3, "hello"));

        assert_eq!(text_of(rx2.try_recv().unwrap()), "hello");
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_skips_closed_clients() {
        let mut manager = ClientManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        manager.add_client(Client::new(1, test_addr(), tx1));
        manager.add_client(Client::new(2, test_addr(), tx2));
        drop(rx2);

        assert_eq!(manager.broadcast("state"), 1);
        assert_eq!(text_of(rx1.try_recv().unwrap()), "state");
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_removed_client_gets_no_broadcast() {
        let mut manager = ClientManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.add_client(Client::new(1, test_addr(), tx1));
        manager.add_client(Client::new(2, test_addr(), tx2));

        manager.remove_client(1);
        assert_eq!(manager.broadcast("state"), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(text_of(rx2.try_recv().unwrap()), "state");
    }
}
