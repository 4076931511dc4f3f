//! Versioned store payload schema
//!
//! Every record written to the key-value store is a `UserApps` protobuf
//! message. Device type and id are not part of the payload; they live only
//! in the store key.
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1 [packed=true];
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```

use prost::Message;

use crate::error::Result;

/// Installed applications of one device, as stored in memcached
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "true", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl UserApps {
    pub fn new(apps: Vec<u32>, lat: f64, lon: f64) -> Self {
        Self {
            apps,
            lat: Some(lat),
            lon: Some(lon),
        }
    }
}

/// Serialize a payload into its wire bytes
pub fn encode_user_apps(apps: &UserApps) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(apps.encoded_len());
    apps.encode(&mut buf)?;
    Ok(buf)
}

/// Parse wire bytes back into a payload
pub fn decode_user_apps(bytes: &[u8]) -> Result<UserApps> {
    Ok(UserApps::decode(bytes)?)
}
