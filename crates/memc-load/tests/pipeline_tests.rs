//! End-to-end tests for the file pipeline
//!
//! These tests run real gzip files from a temp directory through the full
//! pipeline against in-memory store partitions:
//! - Payload and key of written records
//! - Error rate verdicts
//! - Marking and skipping of processed files
//! - File level failures

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use memc_common::schema::decode_user_apps;
use memc_load::discovery::{discover, DEFAULT_PATTERN};
use memc_load::error::{FileError, StoreError};
use memc_load::pipeline::{Pipeline, PipelineConfig};
use memc_load::retry::RetryPolicy;
use memc_load::stats::Verdict;
use memc_load::store::{KvStore, StoreClient};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SAMPLE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23";

/// In-memory partition; refuses every write when `down` is set
struct MemoryStore {
    addr: String,
    down: bool,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            down: false,
            data: Mutex::new(HashMap::new()),
        })
    }

    fn down(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            down: true,
            data: Mutex::new(HashMap::new()),
        })
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.down {
            return Err(StoreError::Rejected {
                addr: self.addr.clone(),
                response: "SERVER_ERROR unavailable".to_string(),
            });
        }
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn address(&self) -> &str {
        &self.addr
    }
}

struct Fixture {
    dir: TempDir,
    stores: BTreeMap<&'static str, Arc<MemoryStore>>,
}

impl Fixture {
    fn new() -> Self {
        let stores = BTreeMap::from([
            ("idfa", MemoryStore::new("memory:idfa")),
            ("gaid", MemoryStore::new("memory:gaid")),
            ("adid", MemoryStore::new("memory:adid")),
            ("dvid", MemoryStore::new("memory:dvid")),
        ]);
        Self {
            dir: TempDir::new().unwrap(),
            stores,
        }
    }

    fn with_store(mut self, dev_type: &'static str, store: Arc<MemoryStore>) -> Self {
        self.stores.insert(dev_type, store);
        self
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_gz(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.path(name);
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
        for line in lines {
            writeln!(encoder, "{}", line).unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    fn write_raw(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        let clients = self
            .stores
            .iter()
            .map(|(dev_type, store)| {
                let store: Arc<dyn KvStore> = store.clone();
                (dev_type.to_string(), StoreClient::new(store, RetryPolicy::no_retry()))
            })
            .collect();
        Pipeline::new(config, clients)
    }

    fn discover(&self) -> Vec<PathBuf> {
        discover(self.dir.path(), &Regex::new(DEFAULT_PATTERN).unwrap()).unwrap()
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        parse_workers: 4,
        writers_per_partition: 2,
        queue_capacity: 8,
        error_threshold: 0.01,
        fail_fast: false,
    }
}

fn good_lines(dev_type: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}\tdevice{:04}\t10.5\t20.25\t{},{}", dev_type, i, i, i + 1))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

// ============================================================================
// Successful Loads
// ============================================================================

#[tokio::test]
async fn test_sample_line_written_and_file_marked() {
    let fx = Fixture::new();
    let path = fx.write_gz("20170929000000.tsv.gz", &[SAMPLE.to_string()]);

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();

    assert_eq!(outcome.verdict, Verdict::Accept);
    assert_eq!(outcome.result.lines_read, 1);
    assert_eq!(outcome.result.processed, 1);
    assert_eq!(outcome.result.errors, 0);
    assert_eq!(outcome.marked_as, fx.path(".20170929000000.tsv.gz"));
    assert!(!path.exists());

    let payload = fx.stores["idfa"].get("idfa:1rfw452y52g2gq4g").unwrap();
    let apps = decode_user_apps(&payload).unwrap();
    assert_eq!(apps.apps, vec![1423, 43, 567, 3, 7, 23]);
    assert_eq!(apps.lat, Some(55.55));
    assert_eq!(apps.lon, Some(42.42));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_routes_every_device_type_under_back_pressure() {
    let fx = Fixture::new();
    let mut lines = Vec::new();
    for dev_type in ["idfa", "gaid", "adid", "dvid"] {
        lines.extend(good_lines(dev_type, 250));
    }
    let path = fx.write_gz("a.tsv.gz", &lines);

    let tight = PipelineConfig {
        queue_capacity: 1,
        ..config()
    };
    let outcome = fx.pipeline(tight).load_file(&path).await.unwrap();

    assert_eq!(outcome.result.lines_read, 1000);
    assert_eq!(outcome.result.processed, 1000);
    assert_eq!(outcome.result.errors, 0);
    for store in fx.stores.values() {
        assert_eq!(store.len(), 250);
    }
}

#[test]
fn test_more_parse_workers_than_blocking_threads() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(4)
        .enable_all()
        .build()
        .unwrap();

    let fx = Fixture::new();
    let path = fx.write_gz("a.tsv.gz", &good_lines("idfa", 50));
    let pipeline = fx.pipeline(PipelineConfig {
        parse_workers: 8,
        ..config()
    });

    let outcome = runtime
        .block_on(async {
            tokio::time::timeout(Duration::from_secs(10), pipeline.load_file(&path)).await
        })
        .expect("pipeline stalled with a saturated blocking pool")
        .unwrap();

    assert_eq!(outcome.result.processed, 50);
    assert_eq!(fx.stores["idfa"].len(), 50);
}

#[tokio::test]
async fn test_soft_field_errors_are_not_line_errors() {
    let fx = Fixture::new();
    let path = fx.write_gz(
        "a.tsv.gz",
        &["gaid\tabc\tnorth\t42.42\t1423,43,abc,7,23".to_string()],
    );

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();

    assert_eq!((outcome.result.processed, outcome.result.errors), (1, 0));
    let apps = decode_user_apps(&fx.stores["gaid"].get("gaid:abc").unwrap()).unwrap();
    assert_eq!(apps.apps, vec![1423, 43, 7, 23]);
    assert_eq!(apps.lat, Some(0.0));
}

#[tokio::test]
async fn test_blank_lines_are_not_counted() {
    let fx = Fixture::new();
    let path = fx.write_gz(
        "a.tsv.gz",
        &[String::new(), SAMPLE.to_string(), "  ".to_string()],
    );

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();
    assert_eq!(outcome.result.lines_read, 1);
}

// ============================================================================
// Error Rate
// ============================================================================

#[tokio::test]
async fn test_two_percent_errors_rejected_but_marked() {
    let fx = Fixture::new();
    let mut lines = good_lines("idfa", 100);
    lines.push("idfa\tonly-two-fields".to_string());
    lines.push("\tmissing-type\t1\t2\t3".to_string());
    let path = fx.write_gz("a.tsv.gz", &lines);

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();

    assert_eq!(outcome.result.processed, 100);
    assert_eq!(outcome.result.errors, 2);
    assert_eq!(outcome.error_rate, 0.02);
    assert_eq!(outcome.verdict, Verdict::Reject);
    // the verdict is advisory only
    assert!(outcome.marked_as.exists());
}

#[tokio::test]
async fn test_unknown_device_type_counted() {
    let fx = Fixture::new();
    let mut lines = good_lines("idfa", 10);
    lines.push("xxxx\tabc\t1\t2\t3".to_string());
    let path = fx.write_gz("a.tsv.gz", &lines);

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();

    assert_eq!((outcome.result.processed, outcome.result.errors), (10, 1));
    assert_eq!(outcome.verdict, Verdict::Reject);
}

#[tokio::test]
async fn test_failed_partition_writes_counted() {
    let fx = Fixture::new().with_store("gaid", MemoryStore::down("memory:gaid"));
    let mut lines = good_lines("idfa", 5);
    lines.extend(good_lines("gaid", 3));
    let path = fx.write_gz("a.tsv.gz", &lines);

    let outcome = fx.pipeline(config()).load_file(&path).await.unwrap();

    assert_eq!((outcome.result.processed, outcome.result.errors), (5, 3));
    assert_eq!(fx.stores["idfa"].len(), 5);
}

// ============================================================================
// Runs Over Several Files
// ============================================================================

#[tokio::test]
async fn test_run_in_sorted_order_then_nothing_left() {
    let fx = Fixture::new();
    fx.write_gz("20170929000200.tsv.gz", &good_lines("idfa", 3));
    fx.write_gz("20170929000000.tsv.gz", &good_lines("gaid", 2));

    let files = fx.discover();
    let summary = fx.pipeline(config()).run(&files).await;

    let names: Vec<_> = summary.files.iter().map(|f| file_name(&f.result.path)).collect();
    assert_eq!(names, vec!["20170929000000.tsv.gz", "20170929000200.tsv.gz"]);
    assert_eq!(summary.totals.files, 2);
    assert_eq!(summary.totals.processed, 5);
    assert_eq!(summary.totals.accepted, 2);
    assert!(!summary.has_failures());

    // marked files are skipped on the next run
    assert!(fx.discover().is_empty());
}

#[tokio::test]
async fn test_corrupt_file_left_unmarked_and_run_continues() {
    let fx = Fixture::new();
    let corrupt = fx.write_raw("20170929000000.tsv.gz", b"definitely not gzip");
    fx.write_gz("20170929000100.tsv.gz", &good_lines("idfa", 4));

    let files = fx.discover();
    let summary = fx.pipeline(config()).run(&files).await;

    assert!(summary.has_failures());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].path, corrupt);
    assert!(corrupt.exists());

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.totals.accepted, 1);
    assert_eq!(fx.stores["idfa"].len(), 4);
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let fx = Fixture::new();
    fx.write_raw("20170929000000.tsv.gz", b"definitely not gzip");
    let good = fx.write_gz("20170929000100.tsv.gz", &good_lines("idfa", 4));

    let files = fx.discover();
    let strict = PipelineConfig {
        fail_fast: true,
        ..config()
    };
    let summary = fx.pipeline(strict).run(&files).await;

    assert_eq!(summary.totals.files, 1);
    assert_eq!(summary.totals.failed, 1);
    assert!(summary.files.is_empty());
    assert!(good.exists());
}

#[tokio::test]
async fn test_truncated_file_reports_read_error() {
    let fx = Fixture::new();
    let full = fx.write_gz("full.tsv.gz", &good_lines("idfa", 2000));
    let bytes = std::fs::read(&full).unwrap();
    let truncated = fx.write_raw("truncated.tsv.gz", &bytes[..bytes.len() / 2]);

    let err = fx.pipeline(config()).load_file(&truncated).await.unwrap_err();

    assert!(matches!(err, FileError::Read { .. }), "{:?}", err);
    assert!(truncated.exists());
}

#[tokio::test]
async fn test_truncated_file_keeps_partial_counts_in_totals() {
    let fx = Fixture::new();
    let full = fx.write_gz("full.tsv.gz", &good_lines("idfa", 2000));
    let bytes = std::fs::read(&full).unwrap();
    std::fs::remove_file(&full).unwrap();
    fx.write_raw("truncated.tsv.gz", &bytes[..bytes.len() / 2]);

    let files = fx.discover();
    let summary = fx.pipeline(config()).run(&files).await;

    assert_eq!(summary.totals.failed, 1);
    let partial = summary.failed[0].partial.as_ref().unwrap();
    assert!(partial.processed > 0);
    assert_eq!(summary.totals.processed, partial.processed);
    assert_eq!(summary.totals.processed, fx.stores["idfa"].len() as u64);
    assert_eq!(summary.totals.lines_read, partial.lines_read);
}

#[tokio::test]
async fn test_not_gzip_reports_open_error() {
    let fx = Fixture::new();
    let path = fx.write_raw("a.tsv.gz", b"idfa\tabc\t1\t2\t3\n");

    let err = fx.pipeline(config()).load_file(&path).await.unwrap_err();

    assert!(matches!(err, FileError::Open { .. }), "{:?}", err);
    assert!(err.partial_result().is_none());
    assert!(path.exists());
}

#[tokio::test]
async fn test_missing_file_reports_open_error() {
    let fx = Fixture::new();
    let err = fx
        .pipeline(config())
        .load_file(&fx.path("absent.tsv.gz"))
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::Open { .. }));
}

#[tokio::test]
async fn test_summary_serializes() {
    let fx = Fixture::new();
    let path = fx.write_gz("a.tsv.gz", &[SAMPLE.to_string()]);

    let summary = fx.pipeline(config()).run(&[path]).await;
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["totals"]["processed"], 1);
    assert_eq!(json["files"][0]["verdict"], "accept");
    assert_eq!(json["files"][0]["lines_read"], 1);
}
