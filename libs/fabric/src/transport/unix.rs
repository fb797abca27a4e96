use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Error, Result};
use crate::transport::{with_timeout, Timeouts, Transport, MAX_RESPONSE_SIZE, READ_CHUNK_SIZE};

/// Unframed Unix domain socket transport
pub struct UnixTransport {
    stream: UnixStream,
    timeouts: Timeouts,
}

impl UnixTransport {
    /// Connect to a Unix socket with no timeouts
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, Timeouts::default()).await
    }

    /// Connect to a Unix socket with the given limits
    pub async fn connect_with(path: impl AsRef<Path>, timeouts: Timeouts) -> Result<Self> {
        let path = path.as_ref();
        let connect_op = async {
            UnixStream::connect(path)
                .await
                .map_err(|source| Error::Connect {
                    endpoint: format!("unix://{}", path.display()),
                    source,
                })
        };
        let stream = with_timeout(timeouts.connect, "Connect", connect_op).await?;

        Ok(Self { stream, timeouts })
    }

    /// Create from an existing UnixStream
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            timeouts: Timeouts::default(),
        }
    }

    async fn drain(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        let n = self.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        let mut buf = chunk[..n].to_vec();

        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_RESPONSE_SIZE {
                        return Err(Error::ResponseTooLarge(buf.len()));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let limit = self.timeouts.send;
        let send_op = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await?;
            Ok::<(), Error>(())
        };
        with_timeout(limit, "Send", send_op).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let limit = self.timeouts.receive;
        with_timeout(limit, "Receive", self.drain()).await
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Unix socket listener for accepting incoming connections
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path, replacing a stale socket file
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(UnixTransport::from_stream(stream))
    }

    /// Get the path this listener is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
