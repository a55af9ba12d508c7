//! MongoDB connection bootstrap and liveness probing
//!
//! Credentials come from the environment through [`DbConfig`]. Connecting
//! never terminates the process: every failure is reported as a
//! [`StartupError`] and the caller decides what to do with it.

pub mod config;
pub mod connect;

pub use config::DbConfig;
pub use connect::{Connection, Liveness, connect, probe, verify_liveness};

use thiserror::Error;

/// Reasons a database handle could not be established
#[derive(Error, Debug)]
pub enum StartupError {
    /// One or more required environment variables are unset or blank
    #[error("Missing one of: {}", .0.join(" / "))]
    MissingVariables(Vec<&'static str>),

    /// The connection string or client options were rejected by the driver
    #[error("Invalid connection options: {0}")]
    InvalidOptions(#[source] mongodb::error::Error),

    /// The liveness check did not succeed
    #[error("Connection failed: {0}")]
    Unreachable(String),
}
