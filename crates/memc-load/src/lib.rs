//! memc-load library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads gzip TSV logs of installed apps per device into memcached, one
//! memcached partition per device type.
//!
//! # Pipeline
//!
//! - **Streaming**: lines are read from `*.tsv.gz` files in sorted order
//! - **Parsing**: a pool of parse workers turns lines into store writes
//! - **Writing**: per-partition write workers commit them with retries
//! - **Evaluation**: each file is accepted or rejected on its error rate
//!   and renamed with a leading dot so later runs skip it
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use memc_load::config::LoaderConfig;
//! use memc_load::discovery::discover;
//! use memc_load::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoaderConfig::parse();
//!     config.validate()?;
//!
//!     let pipeline = Pipeline::new(config.pipeline_config(), config.store_clients()?);
//!     let files = discover(&config.dir, &config.file_pattern()?)?;
//!     let summary = pipeline.run(&files).await;
//!     println!("{} files processed", summary.totals.files);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod router;
pub mod stats;
pub mod store;
pub mod workers;

pub use error::{ConfigError, EncodeError, FileError, ParseError, StoreError};
