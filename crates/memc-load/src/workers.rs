//! Parse and write worker loops
//!
//! Both loops run until their input queue is closed and drained, then
//! return their counters as a [`WorkerReport`]. Per-record failures never
//! leave the worker; they are logged and counted.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::encoder::{encode, WriteTask};
use crate::record::parse_line;
use crate::router::{RouteError, Router};
use crate::stats::{Counters, WorkerKind, WorkerReport};
use crate::store::StoreClient;

/// Parse raw lines and forward encoded tasks to their partition queue
///
/// Blocking: runs on a dedicated thread and applies back-pressure by
/// blocking on full partition queues.
pub fn parse_worker(
    id: usize,
    lines: flume::Receiver<String>,
    router: Arc<Router>,
) -> WorkerReport {
    let mut counters = Counters::default();

    // recv() fails only once every sender is gone and the queue is empty
    while let Ok(line) = lines.recv() {
        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                counters.errors += 1;
                warn!(worker = id, error = %err, line = %line, "Rejected line");
                continue;
            },
        };

        for warning in &parsed.warnings {
            warn!(worker = id, line = %line, "{}", warning);
        }

        let task = match encode(&parsed.record) {
            Ok(task) => task,
            Err(err) => {
                counters.errors += 1;
                warn!(worker = id, error = %err, "Cannot encode record");
                continue;
            },
        };

        match router.route(parsed.record.dev_type(), task) {
            Ok(()) => {},
            Err(err @ RouteError::Unknown(_)) => {
                counters.errors += 1;
                warn!(worker = id, error = %err, "Unroutable record");
            },
            Err(err @ RouteError::Closed(_)) => {
                counters.errors += 1;
                warn!(worker = id, error = %err, "Dropping record, partition writers are gone");
            },
        }
    }

    debug!(worker = id, errors = counters.errors, "Parse worker finished");
    WorkerReport {
        kind: WorkerKind::Parse,
        counters,
    }
}

/// Commit tasks from one partition queue to the store
pub async fn write_worker(
    id: usize,
    tasks: flume::Receiver<WriteTask>,
    client: StoreClient,
) -> WorkerReport {
    let mut counters = Counters::default();

    while let Ok(task) = tasks.recv_async().await {
        match client.write(task.key(), task.payload()).await {
            Ok(_) => counters.processed += 1,
            Err(_) => counters.errors += 1,
        }
    }

    debug!(
        worker = id,
        addr = %client.address(),
        processed = counters.processed,
        errors = counters.errors,
        "Write worker finished"
    );
    WorkerReport {
        kind: WorkerKind::Write,
        counters,
    }
}
