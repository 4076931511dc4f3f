//! Key-value store partitions
//!
//! Each device type routes to one partition. A partition is a [`KvStore`]
//! (the raw connection) wrapped by a [`StoreClient`], which applies the
//! retry policy. Write workers share the client of their partition.

pub mod dry_run;
pub mod memcache;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;
use crate::retry::RetryPolicy;

pub use dry_run::DryRunStore;
pub use memcache::MemcacheStore;

/// A single store partition
///
/// Implementations must be safe to call from several write workers at once.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, one attempt
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Network address of the partition, for logging
    fn address(&self) -> &str;
}

/// Successful write acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Retrying client bound to one partition
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
}

impl StoreClient {
    pub fn new(store: Arc<dyn KvStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn address(&self) -> &str {
        self.store.address()
    }

    /// Write with bounded retry; the error of the last attempt is returned
    pub async fn write(&self, key: &str, payload: &[u8]) -> Result<Ack, StoreError> {
        let result = self.retry.run(|| self.store.set(key, payload)).await;

        match result {
            Ok(((), attempts)) => Ok(Ack { attempts }),
            Err(err) => {
                warn!(
                    addr = %self.store.address(),
                    key = %key,
                    attempts = self.retry.max_attempts(),
                    error = %err,
                    "Store write failed after retries"
                );
                Err(err)
            },
        }
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("address", &self.store.address())
            .field("retry", &self.retry)
            .finish()
    }
}
