//! Transport-level connection table for the UDP server
//!
//! This module tracks which socket addresses are currently connected and
//! which player id each of them was given:
//! - Id allocation for new connections, bounded by a capacity limit
//! - Address lookup for routing inbound datagrams to a player
//! - Liveness tracking and timeout detection
//!
//! Player state itself is kept by the session registry; this table only
//! knows where to send packets.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer
#[derive(Debug)]
pub struct Client {
    /// Player id assigned when the peer connected
    pub id: PlayerId,
    /// Address responses are sent to
    pub addr: SocketAddr,
    /// Last time any packet arrived from this peer
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the peer as alive.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard from the peer within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks connected peers and hands out player ids
///
/// Ids start at 1 and are never reused within a process, so a late datagram
/// from a departed peer can never be attributed to a newer connection.
pub struct ClientManager {
    /// Connected peers indexed by player id
    clients: HashMap<PlayerId, Client>,
    /// Next id to hand out
    next_client_id: PlayerId,
    /// Maximum number of concurrent peers
    max_clients: usize,
    /// Silence threshold after which a peer is considered gone
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to register a new peer
    ///
    /// Returns the allocated id, or None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the liveness timestamp of a peer. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Removes and returns the ids of peers that went silent
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            info!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Copy of every (id, address) pair, used as the recipient list of a broadcast
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
