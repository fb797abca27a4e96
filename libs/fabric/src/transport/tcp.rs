use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{with_timeout, Timeouts, Transport, MAX_RESPONSE_SIZE, READ_CHUNK_SIZE};

/// Unframed TCP transport
///
/// A reply is whatever the peer has written by the time the socket buffer
/// runs dry after the first read.
pub struct TcpTransport {
    stream: TcpStream,
    timeouts: Timeouts,
}

impl TcpTransport {
    /// Connect to a remote host with no timeouts
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(host, port, Timeouts::default()).await
    }

    /// Connect to a remote host, resolving names, with the given limits
    pub async fn connect_with(host: &str, port: u16, timeouts: Timeouts) -> Result<Self> {
        let connect_op = async {
            TcpStream::connect((host, port))
                .await
                .map_err(|source| Error::Connect {
                    endpoint: format!("{host}:{port}"),
                    source,
                })
        };
        let stream = with_timeout(timeouts.connect, "Connect", connect_op).await?;
        stream.set_nodelay(true)?;

        Ok(Self { stream, timeouts })
    }

    /// Create from an existing TcpStream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            timeouts: Timeouts::default(),
        }
    }

    async fn drain(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        // Block until the peer starts replying
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
impl Transport for TcpTransport {
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

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream), addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}
