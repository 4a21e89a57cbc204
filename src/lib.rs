//! Workspace facade re-exporting the arena server and its wire protocol.
//!
//! The crate exists so the workspace-level integration tests and benchmarks
//! can reach both members through a single package.

pub use arena_server as server;
pub use shared;
