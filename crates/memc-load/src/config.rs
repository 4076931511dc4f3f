//! Loader configuration
//!
//! Every option can come from the command line or from the environment
//! (a `.env` file is loaded first by the binary). Command line wins.

use clap::Parser;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::DEFAULT_PATTERN;
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use crate::router::PartitionTable;
use crate::store::{DryRunStore, KvStore, MemcacheStore, StoreClient};

// ============================================================================
// Loader Configuration Constants
// ============================================================================

/// Default input directory.
pub const DEFAULT_DIR: &str = "./logs";

/// Default partition addresses, one memcached per device type.
pub const DEFAULT_IDFA_ADDR: &str = "127.0.0.1:33013";
pub const DEFAULT_GAID_ADDR: &str = "127.0.0.1:33014";
pub const DEFAULT_ADID_ADDR: &str = "127.0.0.1:33015";
pub const DEFAULT_DVID_ADDR: &str = "127.0.0.1:33016";

/// Default number of parse workers.
pub const DEFAULT_PARSE_WORKERS: usize = 100;

/// Threads tokio keeps for blocking work unless told otherwise.
pub const BLOCKING_THREAD_LIMIT: usize = 512;

/// Parse workers each hold a blocking thread; one more is needed for the
/// line streamer.
pub const MAX_PARSE_WORKERS: usize = BLOCKING_THREAD_LIMIT - 1;

/// Default number of write workers per partition.
pub const DEFAULT_WRITERS_PER_PARTITION: usize = 1;

/// Default capacity of every bounded queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default per-attempt store timeout in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

/// Default store retry policy.
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
pub const DEFAULT_RETRY_MULTIPLIER: u32 = 2;

/// Load device apps logs into sharded memcached
#[derive(Parser, Debug, Clone)]
#[command(name = "memc-load")]
#[command(author, version, about = "Load device apps logs into sharded memcached")]
pub struct LoaderConfig {
    /// Directory with input files
    #[arg(long, env = "MEMC_LOAD_DIR", default_value = DEFAULT_DIR)]
    pub dir: PathBuf,

    /// Regex that input file names must match
    #[arg(long, env = "MEMC_LOAD_PATTERN", default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// memcached address for idfa devices
    #[arg(long, env = "MEMC_LOAD_IDFA", default_value = DEFAULT_IDFA_ADDR)]
    pub idfa: String,

    /// memcached address for gaid devices
    #[arg(long, env = "MEMC_LOAD_GAID", default_value = DEFAULT_GAID_ADDR)]
    pub gaid: String,

    /// memcached address for adid devices
    #[arg(long, env = "MEMC_LOAD_ADID", default_value = DEFAULT_ADID_ADDR)]
    pub adid: String,

    /// memcached address for dvid devices
    #[arg(long, env = "MEMC_LOAD_DVID", default_value = DEFAULT_DVID_ADDR)]
    pub dvid: String,

    #[arg(long, env = "MEMC_LOAD_PARSE_WORKERS", default_value_t = DEFAULT_PARSE_WORKERS)]
    pub parse_workers: usize,

    #[arg(
        long,
        env = "MEMC_LOAD_WRITERS_PER_PARTITION",
        default_value_t = DEFAULT_WRITERS_PER_PARTITION
    )]
    pub writers_per_partition: usize,

    /// Capacity of the line queue and of each partition queue
    #[arg(long, env = "MEMC_LOAD_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Per-attempt store timeout
    #[arg(long, env = "MEMC_LOAD_STORE_TIMEOUT_MS", default_value_t = DEFAULT_STORE_TIMEOUT_MS)]
    pub store_timeout_ms: u64,

    /// Retries after a failed store write
    #[arg(long, env = "MEMC_LOAD_RETRIES", default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Delay before the first retry
    #[arg(long, env = "MEMC_LOAD_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Factor applied to the delay after each retry
    #[arg(long, env = "MEMC_LOAD_RETRY_MULTIPLIER", default_value_t = DEFAULT_RETRY_MULTIPLIER)]
    pub retry_multiplier: u32,

    /// Highest acceptable share of failed records per file
    #[arg(
        long,
        env = "MEMC_LOAD_ERROR_THRESHOLD",
        default_value_t = crate::stats::DEFAULT_ERROR_THRESHOLD
    )]
    pub error_threshold: f64,

    /// Log writes instead of sending them
    #[arg(long, env = "MEMC_LOAD_DRY")]
    pub dry: bool,

    /// Stop at the first file that cannot be loaded
    #[arg(long, env = "MEMC_LOAD_FAIL_FAST")]
    pub fail_fast: bool,

    /// Write logs to this file instead of stdout
    #[arg(long, env = "MEMC_LOAD_LOG")]
    pub log: Option<PathBuf>,

    /// Write the run summary as JSON to this file
    #[arg(long, env = "MEMC_LOAD_SUMMARY_JSON")]
    pub summary_json: Option<PathBuf>,
}

impl LoaderConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parse_workers == 0 {
            return Err(ConfigError::Zero("parse workers"));
        }
        if self.parse_workers > MAX_PARSE_WORKERS {
            return Err(ConfigError::TooMany {
                what: "parse workers",
                limit: BLOCKING_THREAD_LIMIT,
                value: self.parse_workers,
            });
        }
        if self.writers_per_partition == 0 {
            return Err(ConfigError::Zero("writers per partition"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue capacity"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Zero("store timeout"));
        }
        if self.retry_multiplier == 0 {
            return Err(ConfigError::Zero("retry multiplier"));
        }
        if !(self.error_threshold > 0.0 && self.error_threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.error_threshold));
        }

        self.file_pattern()?;
        if self.partition_table()?.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        Ok(())
    }

    pub fn file_pattern(&self) -> Result<Regex, ConfigError> {
        Ok(Regex::new(&self.pattern)?)
    }

    /// The four device type routes
    pub fn partition_table(&self) -> Result<PartitionTable, ConfigError> {
        PartitionTable::new()
            .with_route("idfa", &self.idfa)?
            .with_route("gaid", &self.gaid)?
            .with_route("adid", &self.adid)?
            .with_route("dvid", &self.dvid)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retries,
            Duration::from_millis(self.retry_delay_ms),
            self.retry_multiplier,
        )
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            parse_workers: self.parse_workers,
            writers_per_partition: self.writers_per_partition,
            queue_capacity: self.queue_capacity,
            error_threshold: self.error_threshold,
            fail_fast: self.fail_fast,
        }
    }

    /// One store client per routed device type
    ///
    /// Dry runs get stores that only log what they would write.
    pub fn store_clients(&self) -> Result<BTreeMap<String, StoreClient>, ConfigError> {
        let table = self.partition_table()?;
        let retry = self.retry_policy();
        let timeout = Duration::from_millis(self.store_timeout_ms);

        Ok(table
            .iter()
            .map(|(dev_type, addr)| {
                let store: Arc<dyn KvStore> = if self.dry {
                    Arc::new(DryRunStore::new(addr))
                } else {
                    Arc::new(MemcacheStore::new(addr, timeout))
                };
                (dev_type.to_string(), StoreClient::new(store, retry))
            })
            .collect())
    }
}
