//! In-flight scan registry

use crate::error::ScanError;
use crate::repository::StoredScan;
use crate::types::ScanProgress;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Outcome of one scan, shared by every waiter.
pub type ScanCompletion = Result<Arc<StoredScan>, ScanError>;

pub type CompletionFuture = Shared<BoxFuture<'static, ScanCompletion>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only progress history of one scan. Cloning shares the log.
#[derive(Clone, Default)]
pub struct ProgressLog {
    entries: Arc<Mutex<Vec<ScanProgress>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, progress: ScanProgress) {
        lock(&self.entries).push(progress);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries from `index` on, in order.
    pub fn since(&self, index: usize) -> Vec<ScanProgress> {
        let entries = lock(&self.entries);
        entries.get(index..).map(<[_]>::to_vec).unwrap_or_default()
    }
}

/// Registry entry for one running scan.
#[derive(Clone)]
pub struct ActiveScan {
    pub cancel: CancellationToken,
    pub progress: ProgressLog,
    pub completion: CompletionFuture,
}

/// Table of running scans keyed by scan id.
///
/// `delete` on a missing id is not an error; a stop request and the
/// progress stream may both try to remove the same entry.
pub trait ScanStore: Send + Sync {
    fn get(&self, scan_id: &str) -> Option<ActiveScan>;
    fn set(&self, scan_id: &str, scan: ActiveScan);
    /// Returns whether an entry was removed.
    fn delete(&self, scan_id: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryScanStore {
    scans: Mutex<HashMap<String, ActiveScan>>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanStore for InMemoryScanStore {
    fn get(&self, scan_id: &str) -> Option<ActiveScan> {
        lock(&self.scans).get(scan_id).cloned()
    }

    fn set(&self, scan_id: &str, scan: ActiveScan) {
        lock(&self.scans).insert(scan_id.to_string(), scan);
    }

    fn delete(&self, scan_id: &str) -> bool {
        lock(&self.scans).remove(scan_id).is_some()
    }
}
