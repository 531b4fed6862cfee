//! Stream relay host: framed stdio ↔ relay HTTP forwarding.

pub mod log;
pub mod relay;

pub use log::{Direction, MessageLog};
pub use relay::run_host;
