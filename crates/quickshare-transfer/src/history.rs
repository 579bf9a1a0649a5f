use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use quickshare_types::HistoryRecord;

/// Sink the transfer engine appends to after each completed file.
pub trait HistoryRecorder: Send + Sync {
    fn record(&self, record: HistoryRecord);
}

/// In-memory transfer history, newest first.
#[derive(Clone, Default)]
pub struct History {
    records: Arc<Mutex<VecDeque<HistoryRecord>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot, newest first.
    pub fn list(&self) -> Vec<HistoryRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryRecord>> {
        // A panic while holding the lock cannot leave a half-written record.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryRecorder for History {
    fn record(&self, record: HistoryRecord) {
        self.lock().push_front(record);
    }
}
