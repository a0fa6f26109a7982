use crate::cluster::LogPosition;
use crate::epoch::EpochRecord;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// EpochStore is the durable home of this node's epoch chain. Appends must be durable before
/// `append()` returns `Ok`, because a leader serves writes under the new term right after.
pub trait EpochStore: Send + 'static {
    /// Every record ever appended, in append order.
    fn read_all(&self) -> io::Result<Vec<EpochRecord>>;

    fn append(&mut self, record: &EpochRecord) -> io::Result<()>;

    /// Removes every record whose epoch starts at or past `position`.
    fn truncate_from(&mut self, position: LogPosition) -> io::Result<()>;
}

// Not actually durable. Useful for embedding in tests and for nodes whose log layer persists the
// epoch records itself.
pub struct InMemoryEpochStore {
    records: Vec<EpochRecord>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEpochStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<EpochRecord>) -> Self {
        InMemoryEpochStore {
            records,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle that makes subsequent appends fail, to simulate a broken disk.
    pub fn failure_switch(&self) -> EpochStoreFailureSwitch {
        EpochStoreFailureSwitch {
            failing: self.failing.clone(),
        }
    }
}

impl Default for InMemoryEpochStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochStore for InMemoryEpochStore {
    fn read_all(&self) -> io::Result<Vec<EpochRecord>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &EpochRecord) -> io::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::Other, "epoch store write failure"));
        }

        self.records.push(record.clone());
        Ok(())
    }

    fn truncate_from(&mut self, position: LogPosition) -> io::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::Other, "epoch store write failure"));
        }

        self.records.retain(|r| r.epoch_position < position);
        Ok(())
    }
}

#[derive(Clone)]
pub struct EpochStoreFailureSwitch {
    failing: Arc<AtomicBool>,
}

impl EpochStoreFailureSwitch {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}
