//! # Time-Tracking Synchronization Server Library
//!
//! This library provides the authoritative server for a multi-user
//! time-tracking board. It owns the canonical state of every stopwatch and
//! countdown, applies client commands, and broadcasts per-user filtered
//! views to keep all connected clients consistent with server truth.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Time State
//! All time arithmetic happens here. Items carry wall-clock anchors
//! (run start or run deadline) and the server materializes display values
//! from them on demand, so client clocks and network latency can never
//! corrupt the recorded time.
//!
//! ### Identity Management
//! Users register with a stable, client-generated user id and a chosen
//! display name. Display names are unique across the server; the reserved
//! `admin` user id is granted visibility into every user's items and
//! receives the roster of connected users.
//!
//! ### View Broadcasting
//! Every accepted command and every periodic tick ends with a broadcast.
//! Each registered session receives exactly the items it is allowed to
//! see, already materialized, annotated with the owner's display name.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One `tokio::select!` loop processes inbound commands and the periodic
//! tick sequentially. Store and registry are owned by that loop, so no
//! two mutations ever interleave and every session observes views in the
//! order commands were accepted.
//!
//! ### UDP-Based Communication
//! Clients exchange `bincode`-encoded packets over UDP. Sessions are
//! tracked per remote address, kept alive by heartbeats, and swept by a
//! background task after ten seconds of silence.
//!
//! ## Module Organization
//!
//! - [`engine`] — item entities and the pure start/pause/materialize/expiry
//!   transitions, parameterized on a caller-supplied clock
//! - [`store`] — the single owner of all items, id assignment, command
//!   application and the per-tick expiry sweep
//! - [`registry`] — bidirectional user id / display name mapping with the
//!   uniqueness guarantee
//! - [`session`] — connection lifecycle, identity binding, capacity and
//!   timeout handling
//! - [`view`] — per-viewer filtering and snapshot assembly
//! - [`network`] — UDP plumbing, command dispatch and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 100ms ticks give smooth countdown expiry detection
//!     let mut server = Server::new("127.0.0.1:8080", Duration::from_millis(100), 64).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod network;
pub mod registry;
pub mod session;
pub mod store;
pub mod view;
