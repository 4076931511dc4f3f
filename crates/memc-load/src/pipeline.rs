//! File pipeline driver
//!
//! Each file goes through `Opening → Streaming → Draining → Evaluated →
//! Renamed`. Worker pools live for exactly one file: the driver spawns them,
//! streams lines into the raw-line queue and then waits for every worker to
//! hand back its counters before the file is judged.
//!
//! Shutdown is driven by queue closure. Once the streamer drops the line
//! sender, parse workers drain the queue and exit; the last one to exit
//! drops the router, which closes every partition queue and lets the write
//! workers finish.

use flate2::read::MultiGzDecoder;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::discovery::mark_processed;
use crate::encoder::WriteTask;
use crate::error::FileError;
use crate::router::Router;
use crate::stats::{evaluate, Aggregator, FileResult, RunTotals, Verdict, WorkerReport};
use crate::store::StoreClient;
use crate::workers::{parse_worker, write_worker};

/// Sizing and policy knobs for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub parse_workers: usize,
    pub writers_per_partition: usize,
    /// Capacity of the raw-line queue and of every partition queue
    pub queue_capacity: usize,
    pub error_threshold: f64,
    /// Stop the run at the first file that cannot be loaded
    pub fail_fast: bool,
}

/// Where a file is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Opening,
    Streaming,
    Draining,
    Evaluated,
    Renamed,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileStage::Opening => "opening",
            FileStage::Streaming => "streaming",
            FileStage::Draining => "draining",
            FileStage::Evaluated => "evaluated",
            FileStage::Renamed => "renamed",
        };
        f.write_str(name)
    }
}

/// A file that went through the whole pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    #[serde(flatten)]
    pub result: FileResult,
    pub error_rate: f64,
    pub verdict: Verdict,
    /// Path after marking
    pub marked_as: PathBuf,
}

/// A file whose pipeline was cut short
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
    /// Counts of the work done before the file broke off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<FileResult>,
}

/// Everything a run produced, in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub files: Vec<FileOutcome>,
    pub failed: Vec<FailedFile>,
    pub totals: RunTotals,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// What the streamer saw before the input ended or broke
#[derive(Debug, Default)]
struct Streamed {
    lines_read: u64,
    /// Lines that were not valid UTF-8
    invalid: u64,
    error: Option<io::Error>,
}

/// Loads files into the store partitions
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    partitions: BTreeMap<String, StoreClient>,
}

impl Pipeline {
    /// `partitions` maps each routable device type to its store client
    pub fn new(config: PipelineConfig, partitions: BTreeMap<String, StoreClient>) -> Self {
        Self { config, partitions }
    }

    /// Load `files` one after another, in the given order
    pub async fn run(&self, files: &[PathBuf]) -> RunSummary {
        let mut summary = RunSummary::default();

        for path in files {
            match self.load_file(path).await {
                Ok(outcome) => {
                    summary.totals.record(&outcome.result, outcome.verdict);
                    summary.files.push(outcome);
                },
                Err(err) => {
                    error!(file = %path.display(), error = %err, "File load aborted");
                    let partial = err.partial_result().cloned();
                    summary.totals.record_failure(partial.as_ref());
                    summary.failed.push(FailedFile {
                        path: path.clone(),
                        error: err.to_string(),
                        partial,
                    });

                    if self.config.fail_fast {
                        warn!(
                            remaining = files.len() - summary.totals.files as usize,
                            "Stopping run after failed file"
                        );
                        break;
                    }
                },
            }
        }

        summary
    }

    /// Run one file through the full pipeline
    ///
    /// On error the file is left unmarked. Workers are always drained first,
    /// so nothing from this file is still in flight when this returns.
    pub async fn load_file(&self, path: &Path) -> Result<FileOutcome, FileError> {
        info!(file = %path.display(), "Processing");
        debug!(file = %path.display(), stage = %FileStage::Opening);

        let file = File::open(path).map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(MultiGzDecoder::new(file));
        // The gzip header is only parsed on first read
        reader.fill_buf().map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let (line_tx, line_rx) = flume::bounded::<String>(self.config.queue_capacity);
        let (router, write_handles) = self.spawn_writers();

        // The streamer must hold a blocking thread before the parse workers
        // can fill the pool, or nobody would ever close the line queue
        debug!(file = %path.display(), stage = %FileStage::Streaming);
        let streamer = tokio::task::spawn_blocking(move || stream_lines(reader, line_tx));

        let parse_handles: Vec<JoinHandle<WorkerReport>> = (0..self.config.parse_workers)
            .map(|id| {
                let lines = line_rx.clone();
                let router = Arc::clone(&router);
                tokio::task::spawn_blocking(move || parse_worker(id, lines, router))
            })
            .collect();
        // Only workers may keep the queues open
        drop(line_rx);
        drop(router);

        let streamed = streamer.await;

        debug!(file = %path.display(), stage = %FileStage::Draining);
        let mut aggregator = Aggregator::new();
        let mut panics = Vec::new();
        for joined in join_all(parse_handles).await {
            merge_joined(joined, &mut aggregator, &mut panics);
        }
        for joined in join_all(write_handles).await {
            merge_joined(joined, &mut aggregator, &mut panics);
        }

        let streamed = streamed.map_err(|err| FileError::WorkerPanicked {
            path: path.to_path_buf(),
            message: format!("line reader: {}", err),
        })?;
        if let Some(message) = panics.into_iter().next() {
            return Err(FileError::WorkerPanicked {
                path: path.to_path_buf(),
                message,
            });
        }

        let (parse_reports, write_reports) = aggregator.reports();
        debug!(
            file = %path.display(),
            parse_reports,
            write_reports,
            "All workers reported"
        );

        aggregator.reject_lines(streamed.invalid);
        let result = aggregator.finish(path.to_path_buf(), streamed.lines_read);

        if let Some(source) = streamed.error {
            warn!(
                file = %path.display(),
                lines_read = result.lines_read,
                processed = result.processed,
                errors = result.errors,
                "Input ended early, file left unmarked"
            );
            return Err(FileError::Read {
                path: path.to_path_buf(),
                partial: result,
                source,
            });
        }

        debug!(file = %path.display(), stage = %FileStage::Evaluated);
        let error_rate = result.error_rate();
        let verdict = evaluate(&result, self.config.error_threshold);
        match verdict {
            Verdict::Accept => info!(
                file = %path.display(),
                lines_read = result.lines_read,
                processed = result.processed,
                errors = result.errors,
                "Acceptable error rate ({}). Successful load",
                error_rate
            ),
            Verdict::Reject => error!(
                file = %path.display(),
                lines_read = result.lines_read,
                processed = result.processed,
                errors = result.errors,
                "High error rate ({} >= {}). Failed load",
                error_rate,
                self.config.error_threshold
            ),
        }

        let marked_as = mark_processed(path).map_err(|source| FileError::Rename {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(file = %marked_as.display(), stage = %FileStage::Renamed);

        Ok(FileOutcome {
            result,
            error_rate,
            verdict,
            marked_as,
        })
    }

    /// One bounded queue and writer pool per partition
    fn spawn_writers(&self) -> (Arc<Router>, Vec<JoinHandle<WorkerReport>>) {
        let mut queues = BTreeMap::new();
        let mut handles = Vec::new();

        for (dev_type, client) in &self.partitions {
            let (tx, rx) = flume::bounded::<WriteTask>(self.config.queue_capacity);
            for _ in 0..self.config.writers_per_partition {
                let id = handles.len();
                handles.push(tokio::spawn(write_worker(id, rx.clone(), client.clone())));
            }
            queues.insert(dev_type.clone(), tx);
        }

        (Arc::new(Router::new(queues)), handles)
    }
}

fn merge_joined(
    joined: Result<WorkerReport, JoinError>,
    aggregator: &mut Aggregator,
    panics: &mut Vec<String>,
) {
    match joined {
        Ok(report) => aggregator.merge(report),
        Err(err) => panics.push(err.to_string()),
    }
}

/// Push every non-blank line onto the raw-line queue, blocking when it is full
fn stream_lines<R: BufRead>(mut reader: R, lines: flume::Sender<String>) -> Streamed {
    let mut streamed = Streamed::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {},
            Err(err) => {
                streamed.error = Some(err);
                break;
            },
        }

        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        streamed.lines_read += 1;

        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => line,
            Err(_) => {
                streamed.invalid += 1;
                warn!(line_no = streamed.lines_read, "Line is not valid UTF-8");
                continue;
            },
        };

        if lines.send(line).is_err() {
            // Every parse worker is gone; the driver reports why
            break;
        }
    }

    streamed
}
