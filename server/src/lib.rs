//! # Arena Server Library
//!
//! Authoritative state-synchronization server for a shared 2D arena. Every
//! connected client controls one player; the server owns the only true copy
//! of every player's position and pushes it back out at a fixed rate.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Client input samples are applied to the server's copy of the player as
//! soon as they arrive, using the movement rules in the `shared` crate. The
//! result is acknowledged straight back to the sender with the sequence
//! number it reflects, so the client can reconcile its own prediction
//! without waiting for the next tick.
//!
//! ### State Broadcasting
//! A background task snapshots the whole registry every tick (100 ms by
//! default) and sends it to every connected client. A snapshot is sent even
//! when the arena is empty.
//!
//! ### Connection Lifecycle
//! Connecting creates a player with the next palette color and a random
//! spawn point, hands the newcomer the full current state and announces it
//! to everybody else. Disconnecting, explicitly or by timing out, removes the
//! player and announces the departure exactly once.
//!
//! ## Module Organization
//!
//! - `registry`: the session registry, the single shared mutable resource
//! - `lifecycle`: connect / input / disconnect handling on top of the registry
//! - `broadcaster`: the fixed-rate snapshot task
//! - `client_manager`: transport connection table (addresses, ids, liveness)
//! - `network`: UDP transport, outbound queue and task wiring
//! - `error`: error types
//!
//! ## Concurrency
//!
//! Inbound datagrams are decoded by a receiver task and handled one at a time
//! by the main loop, so inputs from one player are applied in arrival order.
//! The registry sits behind a single lock; the tick task reads it under that
//! lock and therefore never observes a half-applied input. Outbound packets
//! are queued on an unbounded channel and delivered by a dedicated sender
//! task, one attempt per recipient, so neither input handling nor the tick
//! ever waits on a client.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use arena_server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("0.0.0.0:3000", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client_manager;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod registry;
