//! memcached text protocol client.
//!
//! Speaks only the `get`, `add` and `delete` commands. Items are stored with
//! flags `0` and exptime `0`; freshness is decided by the call cache.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use switchboard_core::{Endpoint, Error, Result};

use crate::store::CacheStore;

/// Longest key memcached accepts
const MAX_KEY_LEN: usize = 250;

trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

/// One open connection to the server
struct Session {
    stream: BufReader<Box<dyn Socket>>,
}

impl Session {
    async fn open(endpoint: &Endpoint) -> io::Result<Self> {
        let socket: Box<dyn Socket> = match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            Endpoint::Unix(path) => Box::new(UnixStream::connect(path).await?),
        };
        Ok(Self {
            stream: BufReader::new(socket),
        })
    }

    async fn command(&mut self, bytes: &[u8]) -> io::Result<()> {
        let socket = self.stream.get_mut();
        socket.write_all(bytes).await?;
        socket.flush().await
    }

    async fn line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "memcached closed the connection",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn get(&mut self, key: &str) -> io::Result<Option<Vec<u8>>> {
        self.command(format!("get {key}\r\n").as_bytes()).await?;

        let mut value = None;
        loop {
            let line = self.line().await?;
            if line == "END" {
                return Ok(value);
            }

            // VALUE <key> <flags> <bytes> [<cas unique>]
            let Some(header) = line.strip_prefix("VALUE ") else {
                return Err(unexpected(&line));
            };
            let len: usize = header
                .split_whitespace()
                .nth(2)
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| unexpected(&line))?;

            let mut data = vec![0; len + 2];
            self.stream.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(unexpected("data block without terminator"));
            }
            data.truncate(len);
            value = Some(data);
        }
    }

    async fn add(&mut self, key: &str, value: &[u8]) -> io::Result<bool> {
        let mut command = format!("add {key} 0 0 {}\r\n", value.len()).into_bytes();
        command.extend_from_slice(value);
        command.extend_from_slice(b"\r\n");
        self.command(&command).await?;

        match self.line().await?.as_str() {
            "STORED" => Ok(true),
            "NOT_STORED" => Ok(false),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&mut self, key: &str) -> io::Result<bool> {
        self.command(format!("delete {key}\r\n").as_bytes()).await?;

        match self.line().await?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(line: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Unexpected memcached reply: {line}"),
    )
}

/// [`CacheStore`] backed by a memcached server
///
/// Holds a single connection. Any I/O or protocol failure drops it and the
/// next operation dials again.
pub struct MemcacheStore {
    endpoint: Endpoint,
    timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl MemcacheStore {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Connect to the server at `endpoint`
    ///
    /// Fails with [`Error::CacheUnavailable`] when the server cannot be
    /// reached, so callers can fall back to running without a cache.
    pub async fn connect(endpoint: Endpoint) -> Result<Self> {
        Self::connect_with_timeout(endpoint, Self::DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let store = Self {
            endpoint,
            timeout,
            session: Mutex::new(None),
        };
        {
            let mut slot = store.session.lock().await;
            store.session(&mut slot).await?;
        }
        Ok(store)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn session<'a>(&self, slot: &'a mut Option<Session>) -> Result<&'a mut Session> {
        if slot.is_none() {
            let session = tokio::time::timeout(self.timeout, Session::open(&self.endpoint))
                .await
                .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into()))
                .map_err(|e| self.unavailable("connect", e))?;
            debug!(endpoint = %self.endpoint, "Connected to memcached");
            *slot = Some(session);
        }

        slot.as_mut()
            .ok_or_else(|| Error::CacheUnavailable(format!("{}: no session", self.endpoint)))
    }

    /// Turn an operation outcome into a store result, dropping the session on failure
    fn settle<T>(
        &self,
        slot: &mut Option<Session>,
        operation: &str,
        outcome: std::result::Result<io::Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        let result = outcome.unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into()));
        result.map_err(|e| {
            *slot = None;
            self.unavailable(operation, e)
        })
    }

    fn unavailable(&self, operation: &str, err: io::Error) -> Error {
        warn!(endpoint = %self.endpoint, operation, error = %err, "memcached operation failed");
        Error::CacheUnavailable(format!("{} ({operation}): {err}", self.endpoint))
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(Error::CacheUnavailable(format!(
            "Key not usable with memcached: {key:?}"
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl CacheStore for MemcacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let mut slot = self.session.lock().await;
        let session = self.session(&mut slot).await?;
        let outcome = tokio::time::timeout(self.timeout, session.get(key)).await;
        self.settle(&mut slot, "get", outcome)
    }

    async fn add(&self, key: &str, value: &[u8]) -> Result<bool> {
        check_key(key)?;
        let mut slot = self.session.lock().await;
        let session = self.session(&mut slot).await?;
        let outcome = tokio::time::timeout(self.timeout, session.add(key, value)).await;
        self.settle(&mut slot, "add", outcome)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let mut slot = self.session.lock().await;
        let session = self.session(&mut slot).await?;
        let outcome = tokio::time::timeout(self.timeout, session.delete(key)).await;
        self.settle(&mut slot, "delete", outcome)
    }
}
