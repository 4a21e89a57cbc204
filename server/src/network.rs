//! Server network layer handling UDP communications and task coordination

use crate::broadcaster::TickBroadcaster;
use crate::client_manager::ClientManager;
use crate::error::ServerError;
use crate::lifecycle::LifecycleHandler;
use crate::registry::SessionRegistry;
use bincode::serialize;
use log::{debug, error, info, warn};
use shared::{decode_packet, Packet, PlayerId, PROTOCOL_VERSION, TICK_INTERVAL_MS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Runtime knobs for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Period between tick snapshots
    pub tick_duration: Duration,
    /// Maximum number of concurrently connected peers
    pub max_clients: usize,
    /// Silence after which a peer is disconnected
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(TICK_INTERVAL_MS),
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
}

/// Messages queued for the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        client_id: PlayerId,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

/// Handle for queueing outbound packets
///
/// Queueing never waits on the network: packets are delivered by the sender
/// task, one attempt per recipient.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<GameMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { tx }
    }

    pub fn send_to(&self, client_id: PlayerId, packet: Packet) {
        if let Err(e) = self.tx.send(GameMessage::SendPacket { packet, client_id }) {
            error!("Failed to queue packet for client {}: {}", client_id, e);
        }
    }

    pub fn broadcast(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self.tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }
}

/// Main server coordinating networking, the session registry and the tick loop
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    registry: Arc<SessionRegistry>,
    lifecycle: LifecycleHandler,
    outbox: Outbox,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(SessionRegistry::new());
        let outbox = Outbox::new(game_tx);
        let lifecycle = LifecycleHandler::new(Arc::clone(&registry), outbox.clone());

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            registry,
            lifecycle,
            outbox,
            config,
            server_tx,
            server_rx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle to the player registry the server mutates
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Some(packet) = decode_packet(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            warn!("Network sender already running");
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, client_id } => {
                        let addr = {
                            let clients_guard = clients.read().await;
                            clients_guard.addr_of(client_id)
                        };

                        match addr {
                            Some(addr) => {
                                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send packet to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Dropping packet for departed client {}", client_id),
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast packet: {}", e);
                                continue;
                            }
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the fixed-rate snapshot broadcaster
    fn spawn_tick_broadcaster(&self) {
        let broadcaster = TickBroadcaster::new(
            Arc::clone(&self.registry),
            self.outbox.clone(),
            self.config.tick_duration,
        );

        tokio::spawn(broadcaster.run());
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Replies to a peer that has no player id (rejected handshakes)
    async fn reject(&self, reason: &str, addr: SocketAddr) {
        let packet = Packet::Disconnected {
            reason: reason.to_string(),
        };
        if let Err(e) = Self::send_packet_impl(&self.socket, &packet, addr).await {
            error!("Failed to send rejection to {}: {}", addr, e);
        }
    }

    async fn disconnect_client(&self, client_id: PlayerId) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id)
        };

        if removed {
            self.lifecycle.on_disconnect(client_id).await;
        }
    }

    /// Looks up the sender of a datagram and marks it alive
    async fn touch_client(&self, addr: SocketAddr) -> Option<PlayerId> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Routes one inbound packet to the lifecycle handler
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol version {} (expected {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.reject("Protocol version mismatch", addr).await;
                    return;
                }

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Replacing existing client {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        self.outbox.send_to(client_id, Packet::Connected { client_id });
                        if let Err(e) = self.lifecycle.on_connect(client_id).await {
                            error!("Failed to register player {}: {}", client_id, e);
                        }
                    }
                    None => {
                        warn!("Rejecting {}: server full", addr);
                        self.reject("Server full", addr).await;
                    }
                }
            }

            Packet::Input { sequence, input } => match self.touch_client(addr).await {
                Some(client_id) => {
                    self.lifecycle.on_input(client_id, sequence, &input).await;
                }
                None => debug!("Ignoring input from unknown peer {}", addr),
            },

            Packet::Heartbeat => {
                if self.touch_client(addr).await.is_none() {
                    debug!("Ignoring heartbeat from unknown peer {}", addr);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.disconnect_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
            }
            ServerMessage::ClientTimeout { client_id } => {
                self.lifecycle.on_disconnect(client_id).await;
            }
        }
    }

    /// Main server loop: spawns the background tasks, then handles inbound
    /// packets one at a time so each player's inputs apply in arrival order
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_tick_broadcaster();

        info!(
            "Server started successfully ({}ms tick, {} max clients)",
            self.config.tick_duration.as_millis(),
            self.config.max_clients
        );

        while let Some(message) = self.server_rx.recv().await {
            self.handle_message(message).await;
        }

        info!("Server shutting down");
        Ok(())
    }
}
