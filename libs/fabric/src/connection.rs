use tracing::{debug, info, warn};

use switchboard_core::Endpoint;

use crate::error::{Error, Result};
use crate::transport::{Connector, EndpointConnector, Transport};

/// Persistent connection to the backend
///
/// Owns at most one live transport. A failed write tears the transport down,
/// reconnects once through the connector, and retries the write before
/// giving up. Reads are never retried: once a request has been written the
/// backend may already have acted on it.
pub struct Connection {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
}

impl Connection {
    /// Create an unconnected manager around a connector
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            transport: None,
        }
    }

    /// Create a manager for `endpoint` and connect it
    pub async fn open(endpoint: Endpoint) -> Result<Self> {
        let mut connection = Self::new(EndpointConnector::new(endpoint));
        connection.connect().await?;
        Ok(connection)
    }

    /// Establish the connection, replacing any existing transport
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(mut stale) = self.transport.take() {
            let _ = stale.close().await;
        }

        match self.connector.connect().await {
            Ok(transport) => {
                debug!(endpoint = %self.connector.describe(), "Connected to backend");
                self.transport = Some(transport);
                Ok(())
            }
            Err(err) => {
                warn!(endpoint = %self.connector.describe(), error = %err, "Opening socket failed");
                Err(err)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Endpoint description used in logs and errors
    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    /// Write `bytes` and read back the buffered reply
    pub async fn write_and_read(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        if let Err(err) = self.write(bytes).await {
            warn!(
                endpoint = %self.connector.describe(),
                error = %err,
                "Write failed, reconnecting"
            );
            self.transport = None;
            self.connect().await?;
            if let Err(err) = self.write(bytes).await {
                self.transport = None;
                return Err(err);
            }
        }

        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        match transport.receive().await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                // The stream position is unknown now; start fresh next time
                self.transport = None;
                Err(err)
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport.send(bytes).await
    }

    /// Close the connection; a later `connect` may reopen it
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
            info!(endpoint = %self.connector.describe(), "Connection closed");
        }
        Ok(())
    }
}
