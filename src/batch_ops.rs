//! src/batch_ops.rs
//! Parallel file decryption: fixed-size rayon pool, one deadline, per-file results
//!
//! Bag-level problems (a locked session) abort before any work starts. After
//! that every file succeeds or fails on its own; nothing is retried.

use crate::backup::BackupSource;
use crate::builders::BatchConfig;
use crate::error::BackupError;
use crate::session::{FileDecryptor, Session};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One file to decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub file_id: String,
    pub declared_size: Option<u64>,
    pub destination: PathBuf,
}

impl FileJob {
    pub fn new(
        file_id: impl Into<String>,
        declared_size: Option<u64>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            declared_size,
            destination: destination.into(),
        }
    }
}

/// Result of one [`FileJob`]: bytes written, or why it failed.
#[derive(Debug)]
pub struct FileOutcome {
    pub job: FileJob,
    pub result: Result<u64, BackupError>,
}

/// Per-file outcomes in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

const PENDING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Commit state of one job, shared by its worker and the collector.
///
/// Exactly one side wins: the worker claims the rename of its destination, or
/// the collector abandons the job at the deadline.
#[derive(Debug, Default)]
struct JobSlot(AtomicU8);

impl JobSlot {
    fn claim_commit(&self) -> Result<(), BackupError> {
        self.0
            .compare_exchange(PENDING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BackupError::Timeout)
    }

    /// `false` when the worker already claimed its commit.
    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == ABANDONED
    }
}

/// Decrypt every job on a pool of `config.workers()` threads.
///
/// Waits at most `config.timeout()` for the whole batch. Jobs that have not
/// reported by then are [`BackupError::Timeout`] and never write their
/// destination: a job still running is left to finish on its own, but its
/// output is discarded instead of renamed into place. A job that had already
/// claimed its rename when the deadline hit is waited for and reported as it
/// ended.
pub fn decrypt_batch<S>(
    session: &Session,
    source: Arc<S>,
    jobs: Vec<FileJob>,
    config: &BatchConfig,
) -> Result<BatchReport, BackupError>
where
    S: BackupSource + Send + Sync + 'static,
{
    let decryptor = session.decryptor()?;
    if jobs.is_empty() {
        return Ok(BatchReport::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers())
        .thread_name(|i| format!("mbdecrypt-worker-{i}"))
        .build()
        .map_err(|e| BackupError::Io(io::Error::other(e.to_string())))?;

    let deadline = Instant::now() + config.timeout();
    let (tx, rx) = mpsc::channel();
    let slots: Vec<Arc<JobSlot>> = jobs.iter().map(|_| Arc::default()).collect();

    for (index, job) in jobs.iter().enumerate() {
        let tx = tx.clone();
        let source = Arc::clone(&source);
        let slot = Arc::clone(&slots[index]);
        let decryptor: FileDecryptor = decryptor.clone();
        let job = job.clone();
        pool.spawn(move || {
            let result = if slot.is_abandoned() || Instant::now() >= deadline {
                Err(BackupError::Timeout)
            } else {
                decryptor.decrypt_to_file_guarded(
                    &*source,
                    &job.file_id,
                    job.declared_size,
                    &job.destination,
                    || slot.claim_commit(),
                )
            };
            // receiver is gone once the deadline passed
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let mut results: Vec<Option<Result<u64, BackupError>>> =
        std::iter::repeat_with(|| None).take(jobs.len()).collect();
    let mut pending = jobs.len();
    while pending > 0 {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        match rx.recv_timeout(remaining) {
            Ok((index, result)) => {
                results[index] = Some(result);
                pending -= 1;
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }

    if pending > 0 {
        while let Ok((index, result)) = rx.try_recv() {
            results[index] = Some(result);
        }
        let committing: Vec<usize> = (0..jobs.len())
            .filter(|&i| results[i].is_none() && !slots[i].abandon())
            .collect();
        // these are past their commit point; wait for the rename to settle
        while committing.iter().any(|&i| results[i].is_none()) {
            let Ok((index, result)) = rx.recv() else {
                break;
            };
            if !slots[index].is_abandoned() {
                results[index] = Some(result);
            }
        }
    }

    let outcomes: Vec<FileOutcome> = jobs
        .into_iter()
        .zip(results)
        .map(|(job, result)| FileOutcome {
            result: result.unwrap_or(Err(BackupError::Timeout)),
            job,
        })
        .collect();

    for outcome in &outcomes {
        if let Err(err) = &outcome.result {
            warn!(file_id = %outcome.job.file_id, error = %err, "file failed");
        }
    }
    let report = BatchReport { outcomes };
    info!(
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        "batch done"
    );
    Ok(report)
}
