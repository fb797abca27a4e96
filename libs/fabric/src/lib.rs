//! Switchboard Fabric - Connection management, transports and codecs
//!
//! Provides the persistent backend connection used by the RPC layer: TCP and
//! Unix socket transports without framing, a connection manager that
//! reconnects once on write failure, and codec support for the wire format.
//!
//! # Example
//!
//! ```no_run
//! use switchboard_core::Endpoint;
//! use switchboard_fabric::{Channel, codec::JsonCodec};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::Tcp { host: "127.0.0.1".into(), port: 6006 };
//! let mut channel = Channel::open(endpoint, JsonCodec).await?;
//! let reply: Value = channel.request(&json!({"ping": true})).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use connection::Connection;
pub use error::{Error, Result};
