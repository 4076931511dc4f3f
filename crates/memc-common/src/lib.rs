//! memc-load common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared schema, error handling, and logging for the memc-load workspace.
//!
//! # Overview
//!
//! - **Schema**: the versioned `UserApps` payload written to the store
//! - **Error Handling**: common error and result types
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use memc_common::schema::{decode_user_apps, encode_user_apps, UserApps};
//!
//! fn roundtrip() -> memc_common::Result<()> {
//!     let apps = UserApps::new(vec![1423, 43], 55.55, 42.42);
//!     let bytes = encode_user_apps(&apps)?;
//!     assert_eq!(decode_user_apps(&bytes)?, apps);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod schema;

// Re-export commonly used types
pub use error::{CommonError, Result};
