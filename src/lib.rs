#![forbid(unsafe_code)]

//! `focus-bridge` — desktop activity bridge library.
//!
//! Connects three processes: a browser extension (framed stdio protocol),
//! a supervised local analysis backend (loopback HTTP), and a desktop
//! shell (status snapshot). See the `focus-bridge` and `focus-bridge-host`
//! binaries for the two runtime entry points.

pub mod backend;
pub mod config;
pub mod errors;
pub mod events;
pub mod frame;
pub mod host;
pub mod models;
pub mod relay;
pub mod tracker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
