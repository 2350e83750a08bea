//! Job progress reporting
//!
//! Batch runtimes kill tasks that look stalled, and a force-merge or
//! snapshot upload can legitimately run for many minutes without producing
//! output. Workers report liveness through [`Reporter::keep_alive`] during
//! long engine operations and account for time and document outcomes through
//! named counters.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Counters a worker reports to the surrounding job framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCounter {
    TimeSpentIndexingMs,
    TimeSpentFlushingMs,
    TimeSpentMergingMs,
    TimeSpentSnapshottingMs,
    TimeSpentTransportingSnapshotMs,
    IndexDocCreated,
    IndexDocNotCreated,
    IndexingDocFail,
}

impl JobCounter {
    /// Wire name of the counter as it appears in job output.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCounter::TimeSpentIndexingMs => "TIME_SPENT_INDEXING_MS",
            JobCounter::TimeSpentFlushingMs => "TIME_SPENT_FLUSHING_MS",
            JobCounter::TimeSpentMergingMs => "TIME_SPENT_MERGING_MS",
            JobCounter::TimeSpentSnapshottingMs => "TIME_SPENT_SNAPSHOTTING_MS",
            JobCounter::TimeSpentTransportingSnapshotMs => {
                "TIME_SPENT_TRANSPORTING_SNAPSHOT_MS"
            }
            JobCounter::IndexDocCreated => "INDEX_DOC_CREATED",
            JobCounter::IndexDocNotCreated => "INDEX_DOC_NOT_CREATED",
            JobCounter::IndexingDocFail => "INDEXING_DOC_FAIL",
        }
    }
}

impl std::fmt::Display for JobCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for worker progress, implemented by the surrounding job framework.
pub trait Reporter: Debug + Send + Sync {
    /// Add `amount` to a named counter.
    fn incr(&self, counter: JobCounter, amount: u64);

    /// Signal liveness without advancing any counter.
    fn keep_alive(&self);
}

/// Reporter that discards everything. For callers running outside a managed
/// job framework.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn incr(&self, _counter: JobCounter, _amount: u64) {}

    fn keep_alive(&self) {}
}

/// In-memory reporter for tests and single-process runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    inner: Arc<Mutex<MemoryReporterInner>>,
}

#[derive(Debug, Default)]
struct MemoryReporterInner {
    counters: HashMap<JobCounter, u64>,
    keep_alives: u64,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, counter: JobCounter) -> u64 {
        self.inner.lock().counters.get(&counter).copied().unwrap_or(0)
    }

    pub fn keep_alives(&self) -> u64 {
        self.inner.lock().keep_alives
    }
}

impl Reporter for MemoryReporter {
    fn incr(&self, counter: JobCounter, amount: u64) {
        *self.inner.lock().counters.entry(counter).or_insert(0) += amount;
    }

    fn keep_alive(&self) {
        self.inner.lock().keep_alives += 1;
    }
}
