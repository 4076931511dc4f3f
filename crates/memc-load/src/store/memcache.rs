//! Memcached partition client
//!
//! Speaks the memcached text protocol `set` command:
//!
//! ```text
//! set <key> 0 0 <bytes>\r\n
//! <data block>\r\n
//! ```
//!
//! and expects `STORED\r\n` back. Idle connections are pooled and reused
//! by every writer of the partition; a connection that saw an error is
//! dropped instead of going back to the pool.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::KvStore;
use crate::error::StoreError;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on pooled idle connections per partition
const MAX_IDLE_CONNECTIONS: usize = 16;

type Connection = BufStream<TcpStream>;

/// Connection pool for one memcached address
pub struct MemcacheStore {
    addr: String,
    timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl MemcacheStore {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn checkout(&self) -> Result<Connection, StoreError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        debug!(addr = %self.addr, "Opening memcached connection");
        let stream = TcpStream::connect(self.addr.as_str())
            .await
            .map_err(|source| StoreError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        // Writes are small; don't let Nagle hold them back
        stream.set_nodelay(true).map_err(|source| StoreError::Connect {
            addr: self.addr.clone(),
            source,
        })?;

        Ok(BufStream::new(stream))
    }

    async fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    async fn set_on(
        &self,
        conn: &mut Connection,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            addr: self.addr.clone(),
            source,
        };

        conn.write_all(format!("set {} 0 0 {}\r\n", key, value.len()).as_bytes())
            .await
            .map_err(io_err)?;
        conn.write_all(value).await.map_err(io_err)?;
        conn.write_all(b"\r\n").await.map_err(io_err)?;
        conn.flush().await.map_err(io_err)?;

        let mut response = String::new();
        let read = conn.read_line(&mut response).await.map_err(io_err)?;
        if read == 0 {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before response",
            )));
        }

        let response = response.trim_end();
        trace!(addr = %self.addr, key = %key, response = %response, "memcached set");

        if response == "STORED" {
            Ok(())
        } else {
            Err(StoreError::Rejected {
                addr: self.addr.clone(),
                response: response.to_string(),
            })
        }
    }
}

#[async_trait]
impl KvStore for MemcacheStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let attempt = async {
            let mut conn = self.checkout().await?;
            self.set_on(&mut conn, key, value).await?;
            Ok::<_, StoreError>(conn)
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok(conn)) => {
                self.checkin(conn).await;
                Ok(())
            },
            Ok(Err(err)) => Err(err),
            Err(_) => Err(StoreError::Timeout {
                addr: self.addr.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn address(&self) -> &str {
        &self.addr
    }
}

impl std::fmt::Debug for MemcacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheStore")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish()
    }
}
