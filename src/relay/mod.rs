//! Relay HTTP server: message dispatch, session state, liveness.

pub mod commands;
pub mod dispatch;
pub mod liveness;
pub mod server;

pub use commands::CommandQueue;
pub use liveness::{spawn_liveness_timer, LivenessHandle};
pub use server::{router, serve, RelayState};
