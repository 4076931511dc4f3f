//! Store stand-in for `--dry` runs: logs the write and acknowledges it

use async_trait::async_trait;
use memc_common::schema::decode_user_apps;
use tracing::debug;

use super::KvStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct DryRunStore {
    addr: String,
}

impl DryRunStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl KvStore for DryRunStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        match decode_user_apps(value) {
            Ok(apps) => debug!(
                addr = %self.addr,
                key = %key,
                apps = ?apps.apps,
                lat = ?apps.lat,
                lon = ?apps.lon,
                "Dry run write"
            ),
            Err(err) => debug!(
                addr = %self.addr,
                key = %key,
                bytes = value.len(),
                error = %err,
                "Dry run write (undecodable payload)"
            ),
        }
        Ok(())
    }

    fn address(&self) -> &str {
        &self.addr
    }
}
