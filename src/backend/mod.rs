//! Backend process client and supervisor.

pub mod client;
pub mod supervisor;

pub use client::{ApiOutcome, BackendClient, BatchAccepted};
pub use supervisor::{BackendProcessState, Supervisor};
