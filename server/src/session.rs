//! Connection session management for the synchronization server
//!
//! This module handles the server-side lifecycle of client sessions:
//! - Session establishment and identity binding after registration
//! - Connection health monitoring via heartbeats and automatic cleanup
//! - Session capacity enforcement and address tracking
//!
//! A session is keyed by the client's socket address. It exists as soon as
//! the client registers and is released deterministically on an explicit
//! disconnect or an inactivity timeout, at which point the bound identity
//! (if any) is handed back to the caller so it can be unregistered.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Sessions are swept after this long without any inbound packet.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected client and the identity it registered under
#[derive(Debug)]
pub struct Session {
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Bound user id; None until a successful registration
    pub user_id: Option<String>,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
}

impl Session {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            user_id: None,
            last_seen: Instant::now(),
        }
    }

    /// Marks the session as recently active
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if no packets have arrived within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks all live sessions and enforces the capacity limit
///
/// The manager is the transport-side counterpart of the identity registry:
/// the registry decides who a user is, the manager decides where to reach
/// them. Only sessions with a bound identity receive item views.
pub struct SessionManager {
    sessions: HashMap<SocketAddr, Session>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    /// Opens a session for `addr`, or refreshes the existing one. Returns
    /// false when the server is at capacity and the address is new.
    pub fn open(&mut self, addr: SocketAddr) -> bool {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.touch();
            return true;
        }
        if self.sessions.len() >= self.max_sessions {
            return false;
        }
        info!("Session opened from {}", addr);
        self.sessions.insert(addr, Session::new(addr));
        true
    }

    /// Closes the session for `addr` and returns it so the caller can
    /// unregister any bound identity. None if no session existed.
    pub fn close(&mut self, addr: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&addr);
        if let Some(session) = &session {
            info!(
                "Session from {} closed (user: {})",
                addr,
                session.user_id.as_deref().unwrap_or("-")
            );
        }
        session
    }

    /// Associates a registered identity with an open session
    pub fn bind_identity(&mut self, addr: SocketAddr, user_id: &str) {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.user_id = Some(user_id.to_string());
            session.touch();
        }
    }

    /// User id bound to `addr`, if the session exists and has registered
    pub fn user_id(&self, addr: SocketAddr) -> Option<String> {
        self.sessions.get(&addr).and_then(|s| s.user_id.clone())
    }

    /// Refreshes activity for `addr`; no-op for unknown addresses
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.touch();
        }
    }

    /// Removes and returns every session that exceeded [`SESSION_TIMEOUT`]
    pub fn sweep_timeouts(&mut self) -> Vec<Session> {
        let stale: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(SESSION_TIMEOUT))
            .map(|s| s.addr)
            .collect();

        stale
            .into_iter()
            .filter_map(|addr| {
                info!("Session from {} timed out", addr);
                self.sessions.remove(&addr)
            })
            .collect()
    }

    /// Address and identity of every registered session, for the broadcast
    /// fan-out. Unregistered sessions are silently skipped.
    pub fn registered(&self) -> Vec<(SocketAddr, String)> {
        self.sessions
            .values()
            .filter_map(|s| s.user_id.clone().map(|id| (s.addr, id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
