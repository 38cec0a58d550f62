//! Run generations per file
//!
//! Every submission for a file starts a new run with a strictly larger
//! generation. Only the latest run of a file is current; older runs stop at
//! their next stage boundary and are rejected by the index if they reach it.

use codeindex_core::FileId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct FileRuns {
    latest: DashMap<FileId, u64>,
    next: AtomicU64,
}

impl FileRuns {
    /// Generations start at the current time in microseconds so they keep
    /// increasing across restarts of the process
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::with_seed(seed_from(since_epoch))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            latest: DashMap::new(),
            next: AtomicU64::new(seed.max(1)),
        }
    }

    /// Start a run for `file_id`, superseding any run in flight
    pub fn begin(&self, file_id: &FileId) -> u64 {
        // Allocate under the entry lock so the latest generation always wins
        let mut slot = self.latest.entry(file_id.clone()).or_insert(0);
        let generation = self.next.fetch_add(1, Ordering::SeqCst);
        *slot = generation;
        generation
    }

    pub fn is_current(&self, file_id: &FileId, generation: u64) -> bool {
        self.latest
            .get(file_id)
            .is_some_and(|latest| *latest == generation)
    }

    /// Forget `file_id` once its latest run has ended
    ///
    /// A newer run started in the meantime keeps the entry.
    pub fn finish(&self, file_id: &FileId, generation: u64) {
        self.latest
            .remove_if(file_id, |_, latest| *latest == generation);
    }

    /// Number of files with a run in flight
    pub fn in_flight(&self) -> usize {
        self.latest.len()
    }
}

/// Microseconds since the epoch, saturating well below `u64::MAX` so the
/// counter has room to grow
fn seed_from(since_epoch: Duration) -> u64 {
    u64::try_from(since_epoch.as_micros())
        .unwrap_or(u64::MAX)
        .min(u64::MAX / 2)
}

impl Default for FileRuns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_supersedes_old() {
        let runs = FileRuns::with_seed(10);
        let file = FileId::new("a.py");

        let first = runs.begin(&file);
        assert!(runs.is_current(&file, first));

        let second = runs.begin(&file);
        assert!(second > first);
        assert!(!runs.is_current(&file, first));
        assert!(runs.is_current(&file, second));
    }

    #[test]
    fn test_finished_files_are_forgotten() {
        let runs = FileRuns::with_seed(1);
        let file = FileId::new("a.py");

        let first = runs.begin(&file);
        let second = runs.begin(&file);

        runs.finish(&file, first);
        assert_eq!(runs.in_flight(), 1);
        assert!(runs.is_current(&file, second));

        runs.finish(&file, second);
        assert_eq!(runs.in_flight(), 0);
        assert!(!runs.is_current(&file, second));

        let third = runs.begin(&file);
        assert!(third > second);
        assert!(runs.is_current(&file, third));
    }

    #[test]
    fn test_seed_saturates_instead_of_truncating() {
        assert_eq!(seed_from(Duration::from_micros(1_700_000)), 1_700_000);
        assert_eq!(seed_from(Duration::MAX), u64::MAX / 2);

        let runs = FileRuns::with_seed(seed_from(Duration::MAX));
        let file = FileId::new("a.py");
        let first = runs.begin(&file);
        assert!(runs.begin(&file) > first);
    }

    #[test]
    fn test_files_are_independent() {
        let runs = FileRuns::with_seed(1);
        let a = runs.begin(&FileId::new("a.py"));
        let b = runs.begin(&FileId::new("b.py"));

        assert!(runs.is_current(&FileId::new("a.py"), a));
        assert!(runs.is_current(&FileId::new("b.py"), b));
        assert!(!runs.is_current(&FileId::new("c.py"), a));
    }
}
