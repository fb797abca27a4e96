use serde::{Deserialize, Serialize};

use switchboard_core::Endpoint;

use crate::codec::Codec;
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Request/response channel over a persistent connection
///
/// Combines the connection manager with a codec: one `request` is one
/// encoded write followed by one buffered read.
pub struct Channel<C> {
    connection: Connection,
    codec: C,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing connection
    pub fn new(connection: Connection, codec: C) -> Self {
        Self { connection, codec }
    }

    /// Open a connected channel to `endpoint`
    pub async fn open(endpoint: Endpoint, codec: C) -> Result<Self> {
        let connection = Connection::open(endpoint).await?;
        Ok(Self::new(connection, codec))
    }

    /// Send `message` and decode the reply
    ///
    /// A reply that does not decode is reported as [`Error::Decode`] so callers
    /// can tell a broken peer from a local encoding failure.
    pub async fn request<Req, Res>(&mut self, message: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: for<'de> Deserialize<'de>,
    {
        let bytes = self.codec.encode(message)?;
        let reply = self.connection.write_and_read(&bytes).await?;
        self.codec.decode(&reply).map_err(|e| match e {
            Error::Codec(message) => Error::Decode(message),
            other => other,
        })
    }

    /// Endpoint description used in logs and errors
    pub fn describe(&self) -> String {
        self.connection.describe()
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Close the underlying connection
    pub async fn close(&mut self) -> Result<()> {
        self.connection.close().await
    }
}
