//! Server network layer handling UDP communications and the tick loop

use crate::registry::UserRegistry;
use crate::session::SessionManager;
use crate::store::ItemStore;
use crate::view;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{now_ms, ItemKind, Packet, ADMIN_USER_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionTimeout {
        addr: SocketAddr,
        user_id: Option<String>,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the outbound network task
#[derive(Debug)]
pub enum OutboundMessage {
    Send { packet: Packet, addr: SocketAddr },
}

/// Main server coordinating networking, command handling and the tick loop
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    store: ItemStore,
    registry: UserRegistry,
    tick_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_interval: Duration,
        max_sessions: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionManager::new(max_sessions))),
            store: ItemStore::new(),
            registry: UserRegistry::new(),
            tick_interval,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
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

    /// Spawns task that drains the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(OutboundMessage::Send { packet, addr }) = out_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that sweeps inactive sessions
    fn spawn_timeout_sweeper(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let swept = {
                    let mut sessions_guard = sessions.write().await;
                    sessions_guard.sweep_timeouts()
                };

                for session in swept {
                    if let Err(e) = server_tx.send(ServerMessage::SessionTimeout {
                        addr: session.addr,
                        user_id: session.user_id,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(OutboundMessage::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes an inbound command and updates server state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        {
            let mut sessions = self.sessions.write().await;
            sessions.touch(addr);
        }

        match packet {
            Packet::Register { user_id, user_name } => {
                self.handle_register(addr, user_id, user_name).await;
            }

            Packet::CreateItem {
                name,
                kind,
                duration_secs,
                owner,
            } => {
                self.handle_create(addr, name, kind, duration_secs, owner)
                    .await;
            }

            Packet::StartItem { item_id } => {
                self.store.start(item_id, now_ms());
                self.broadcast_views().await;
            }

            Packet::PauseItem { item_id } => {
                self.store.pause(item_id, now_ms());
                self.broadcast_views().await;
            }

            Packet::StopItem { item_id } => {
                self.store.stop(item_id);
                self.broadcast_views().await;
            }

            Packet::Heartbeat { timestamp: _ } => {
                // Activity already refreshed above
            }

            Packet::Disconnect => {
                let closed = {
                    let mut sessions = self.sessions.write().await;
                    sessions.close(addr)
                };
                if let Some(session) = closed {
                    if let Some(user_id) = session.user_id {
                        self.registry.unregister(&user_id);
                    }
                    self.broadcast_views().await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_register(&mut self, addr: SocketAddr, user_id: String, user_name: String) {
        let opened = {
            let mut sessions = self.sessions.write().await;
            sessions.open(addr)
        };

        if !opened {
            warn!("Rejected session from {}: server full", addr);
            self.send_packet(
                Packet::RegistrationError {
                    message: "Server is full.".to_string(),
                },
                addr,
            );
            return;
        }

        match self.registry.register(&user_id, &user_name) {
            Ok(()) => {
                let mut sessions = self.sessions.write().await;
                sessions.bind_identity(addr, &user_id);
                drop(sessions);
                self.broadcast_views().await;
            }
            Err(e) => {
                info!(
                    "Registration of {:?} by {} refused: {}",
                    user_name, user_id, e
                );
                self.send_packet(
                    Packet::RegistrationError {
                        message: e.to_string(),
                    },
                    addr,
                );
            }
        }
    }

    async fn handle_create(
        &mut self,
        addr: SocketAddr,
        name: String,
        kind: ItemKind,
        duration_secs: Option<u64>,
        owner: Option<String>,
    ) {
        let owner = match owner {
            Some(owner) => Some(owner),
            None => {
                let sessions = self.sessions.read().await;
                sessions.user_id(addr)
            }
        };

        let owner = match owner {
            Some(owner) => owner,
            None => {
                error!("No owner resolved for item creation from {}", addr);
                return;
            }
        };

        if self
            .store
            .create(&name, kind, duration_secs, &owner)
            .is_some()
        {
            self.broadcast_views().await;
        }
    }

    /// Pushes the current filtered view to every registered session, and
    /// the connected-user roster to admin sessions
    async fn broadcast_views(&mut self) {
        let registered = {
            let sessions = self.sessions.read().await;
            sessions.registered()
        };

        if registered.is_empty() {
            return;
        }

        // Take timestamp as close to transmission as possible
        let now = now_ms();
        let roster = self.registry.roster();

        for (addr, user_id) in registered {
            let items = view::items_for(&self.store, &self.registry, &user_id, now);
            self.send_packet(Packet::ActiveItems { items }, addr);

            if user_id == ADMIN_USER_ID {
                self.send_packet(
                    Packet::ConnectedUsers {
                        users: roster.clone(),
                    },
                    addr,
                );
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_sweeper();

        let mut tick_interval = interval(self.tick_interval);
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SessionTimeout { addr, user_id }) => {
                            debug!("Cleaning up timed-out session {}", addr);
                            if let Some(user_id) = user_id {
                                self.registry.unregister(&user_id);
                            }
                            self.broadcast_views().await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Advance countdown expiry and refresh all views
                _ = tick_interval.tick() => {
                    let now = now_ms();
                    if self.store.tick_all(now) {
                        debug!("Countdown expiry detected at {}", now);
                    }
                    self.broadcast_views().await;

                    tick += 1;
                    if tick % 100 == 0 {
                        let session_count = {
                            let sessions = self.sessions.read().await;
                            sessions.len()
                        };
                        if session_count > 0 {
                            debug!(
                                "Tick {}: {} sessions, {} users, {} items",
                                tick,
                                session_count,
                                self.registry.len(),
                                self.store.len()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", Duration::from_millis(100), 8)
            .await
            .expect("failed to bind test server")
    }

    fn addr(port: u16) -> SocketAddr {
        format!("10.0.0.1:{}", port).parse().unwrap()
    }

    fn register(user_id: &str, user_name: &str) -> Packet {
        Packet::Register {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        }
    }

    fn drain_outbound(server: &mut Server) -> Vec<(Packet, SocketAddr)> {
        let mut sent = Vec::new();
        while let Ok(OutboundMessage::Send { packet, addr }) = server.out_rx.try_recv() {
            sent.push((packet, addr));
        }
        sent
    }

    #[tokio::test]
    async fn test_register_binds_session_and_broadcasts() {
        let mut server = test_server().await;

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;

        assert!(server.registry.is_registered("u1"));
        {
            let sessions = server.sessions.read().await;
            assert_eq!(sessions.user_id(addr(1000)), Some("u1".to_string()));
        }

        let sent = drain_outbound(&mut server);
        assert!(sent
            .iter()
            .any(|(p, a)| matches!(p, Packet::ActiveItems { .. }) && *a == addr(1000)));
    }

    #[tokio::test]
    async fn test_name_conflict_errors_offender_only() {
        let mut server = test_server().await;

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;
        drain_outbound(&mut server);

        server.handle_packet(register("u2", "Alice"), addr(2000)).await;

        assert!(!server.registry.is_registered("u2"));
        let sent = drain_outbound(&mut server);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            (Packet::RegistrationError { message }, a) => {
                assert_eq!(*a, addr(2000));
                assert_eq!(message, "User name already taken.");
            }
            other => panic!("Unexpected outbound packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capacity_rejection() {
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(100), 1)
            .await
            .unwrap();

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;
        drain_outbound(&mut server);

        server.handle_packet(register("u2", "Bob"), addr(2000)).await;

        let sent = drain_outbound(&mut server);
        assert!(sent.iter().any(|(p, a)| matches!(
            p,
            Packet::RegistrationError { message } if message == "Server is full."
        ) && *a == addr(2000)));
    }

    #[tokio::test]
    async fn test_create_resolves_owner_from_session() {
        let mut server = test_server().await;

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;
        server
            .handle_packet(
                Packet::CreateItem {
                    name: "Deep work".to_string(),
                    kind: ItemKind::Stopwatch,
                    duration_secs: None,
                    owner: None,
                },
                addr(1000),
            )
            .await;

        assert_eq!(server.store.len(), 1);
        let item = server.store.iter().next().unwrap();
        assert_eq!(item.owner, "u1");
    }

    #[tokio::test]
    async fn test_create_without_owner_is_dropped() {
        let mut server = test_server().await;

        // No session, no explicit owner: nothing happens
        server
            .handle_packet(
                Packet::CreateItem {
                    name: "Orphan".to_string(),
                    kind: ItemKind::Stopwatch,
                    duration_secs: None,
                    owner: None,
                },
                addr(1000),
            )
            .await;

        assert!(server.store.is_empty());
        assert!(drain_outbound(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_admin_receives_roster_and_all_items() {
        let mut server = test_server().await;

        server.handle_packet(register("admin", "Admin"), addr(1000)).await;
        server.handle_packet(register("u1", "Alice"), addr(2000)).await;
        server.handle_packet(register("u2", "Bob"), addr(3000)).await;

        server
            .handle_packet(
                Packet::CreateItem {
                    name: "A".to_string(),
                    kind: ItemKind::Stopwatch,
                    duration_secs: None,
                    owner: Some("u1".to_string()),
                },
                addr(2000),
            )
            .await;
        server
            .handle_packet(
                Packet::CreateItem {
                    name: "B".to_string(),
                    kind: ItemKind::Countdown,
                    duration_secs: Some(30),
                    owner: Some("u2".to_string()),
                },
                addr(3000),
            )
            .await;
        drain_outbound(&mut server);

        server.broadcast_views().await;
        let sent = drain_outbound(&mut server);

        // Admin view has both items with the owners' display names
        let admin_items = sent
            .iter()
            .find_map(|(p, a)| match (p, a) {
                (Packet::ActiveItems { items }, a) if *a == addr(1000) => Some(items),
                _ => None,
            })
            .expect("admin received no item view");
        assert_eq!(admin_items.len(), 2);
        assert_eq!(admin_items[0].user_name, "Alice");
        assert_eq!(admin_items[1].user_name, "Bob");

        // Non-admin views are filtered to the owner
        let u1_items = sent
            .iter()
            .find_map(|(p, a)| match (p, a) {
                (Packet::ActiveItems { items }, a) if *a == addr(2000) => Some(items),
                _ => None,
            })
            .unwrap();
        assert_eq!(u1_items.len(), 1);
        assert_eq!(u1_items[0].user_id, "u1");

        // Roster goes to the admin session only
        let roster_targets: Vec<SocketAddr> = sent
            .iter()
            .filter(|(p, _)| matches!(p, Packet::ConnectedUsers { .. }))
            .map(|(_, a)| *a)
            .collect();
        assert_eq!(roster_targets, vec![addr(1000)]);
    }

    #[tokio::test]
    async fn test_stop_race_is_tolerated() {
        let mut server = test_server().await;

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;
        server
            .handle_packet(
                Packet::CreateItem {
                    name: "A".to_string(),
                    kind: ItemKind::Stopwatch,
                    duration_secs: None,
                    owner: None,
                },
                addr(1000),
            )
            .await;
        let id = server.store.iter().next().unwrap().id;

        server
            .handle_packet(Packet::StopItem { item_id: id }, addr(1000))
            .await;
        // Second stop for the same id, e.g. from the admin racing the owner
        server
            .handle_packet(Packet::StopItem { item_id: id }, addr(1000))
            .await;
        server
            .handle_packet(Packet::StartItem { item_id: id }, addr(1000))
            .await;

        assert!(server.store.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_identity() {
        let mut server = test_server().await;

        server.handle_packet(register("u1", "Alice"), addr(1000)).await;
        assert!(server.registry.is_registered("u1"));

        server.handle_packet(Packet::Disconnect, addr(1000)).await;

        assert!(!server.registry.is_registered("u1"));
        let sessions = server.sessions.read().await;
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_sessions_receive_no_views() {
        let mut server = test_server().await;

        server
            .handle_packet(
                Packet::CreateItem {
                    name: "A".to_string(),
                    kind: ItemKind::Stopwatch,
                    duration_secs: None,
                    owner: Some("u1".to_string()),
                },
                addr(1000),
            )
            .await;

        server.broadcast_views().await;
        assert!(drain_outbound(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_packet_is_ignored() {
        let mut server = test_server().await;

        server
            .handle_packet(Packet::ActiveItems { items: vec![] }, addr(1000))
            .await;

        assert!(server.store.is_empty());
        assert!(drain_outbound(&mut server).is_empty());
    }
}
