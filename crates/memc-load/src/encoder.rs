//! Record to store-write encoding

use memc_common::schema::{encode_user_apps, UserApps};

use crate::error::EncodeError;
use crate::record::Record;

/// Longest key memcached accepts
pub const MAX_KEY_LEN: usize = 250;

/// A keyed payload ready to be written to a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTask {
    key: String,
    payload: Vec<u8>,
}

impl WriteTask {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Store key for a device: `<dev_type>:<dev_id>`
pub fn routing_key(dev_type: &str, dev_id: &str) -> String {
    format!("{}:{}", dev_type, dev_id)
}

/// Encode a record into its store key and serialized payload
///
/// Device type and id only go into the key; the payload carries apps and
/// coordinates.
pub fn encode(record: &Record) -> Result<WriteTask, EncodeError> {
    let key = routing_key(record.dev_type(), record.dev_id());
    validate_key(&key)?;

    let payload = encode_user_apps(&UserApps::new(
        record.apps.clone(),
        record.lat,
        record.lon,
    ))?;

    Ok(WriteTask { key, payload })
}

fn validate_key(key: &str) -> Result<(), EncodeError> {
    let reason = if key.len() > MAX_KEY_LEN {
        "longer than 250 bytes"
    } else if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "contains whitespace or control characters"
    } else {
        return Ok(());
    };

    Err(EncodeError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
