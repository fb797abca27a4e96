//! Switchboard RPC - Envelope layer for backend calls
//!
//! Wraps calls in JSON-RPC style envelopes with a fresh correlation id,
//! sends them over the persistent connection, and validates each reply
//! against its request before handing back the result.

pub mod client;
pub mod envelope;

pub use client::{RpcBackend, RpcClient};
pub use envelope::Call;
