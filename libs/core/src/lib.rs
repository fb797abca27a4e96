//! Switchboard Core - Shared error taxonomy, configuration and hashing
//!
//! Every other switchboard crate reports failures through [`Error`], so the
//! request boundary only has to tell fatal errors from degraded ones.

pub mod config;
pub mod error;
pub mod hash;

pub use config::{ClientConfig, Endpoint, Environment};
pub use error::{Error, Result};
