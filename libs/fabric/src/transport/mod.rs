use std::time::Duration;

use switchboard_core::Endpoint;

use crate::error::{Error, Result};

pub mod tcp;
pub mod unix;

pub use self::tcp::{TcpTransport, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportListener};

/// Size of a single socket read
pub const READ_CHUNK_SIZE: usize = 8192;

/// Upper bound on a single buffered response (100MB)
pub const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection. There is no
/// framing: `receive` waits for the first bytes of a reply and then returns
/// everything the socket already has buffered.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Write all bytes to the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read until the socket reports nothing more buffered
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh transports to one endpoint
///
/// The connection manager goes through a connector for the first connect and
/// for every reconnect.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable endpoint, used in logs and errors
    fn describe(&self) -> String;

    /// Open a new transport
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}

/// Optional limits applied to a transport; all unset by default
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub send: Option<Duration>,
    pub receive: Option<Duration>,
}

/// Run `op`, failing with a "<what> timeout exceeded" error past `limit`
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, what: &str, op: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| Error::Custom(format!("{what} timeout exceeded")))?,
        None => op.await,
    }
}

/// Connector for a configured [`Endpoint`]
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: Endpoint,
    timeouts: Timeouts,
}

impl EndpointConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Connector for EndpointConnector {
    fn describe(&self) -> String {
        self.endpoint.to_string()
    }

    async fn connect(&self) -> Result<Box<dyn Transport>> {
        match &self.endpoint {
            Endpoint::Tcp { host, port } => Ok(Box::new(
                TcpTransport::connect_with(host, *port, self.timeouts).await?,
            )),
            Endpoint::Unix(path) => Ok(Box::new(
                UnixTransport::connect_with(path, self.timeouts).await?,
            )),
        }
    }
}
