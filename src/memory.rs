use crate::record::{JobId, JobRecord};
use crate::store::{JobStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::{Arc, Mutex};

/// In-memory [`JobStore`] for tests and single-process hosts that do not
/// need durability across restarts.
///
/// Cheap to clone; clones share the same records. The lock is only held
/// for the duration of a single operation, never across an await point.
#[derive(Debug, Default, Clone)]
pub struct MemoryJobStore {
    records: Arc<Mutex<Vec<JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a stored record, for inspection.
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.records
            .lock()
            .expect("job store lock poisoned")
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    /// Number of records currently held, abandoned ones included.
    pub fn len(&self) -> usize {
        self.records.lock().expect("job store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("job store lock poisoned")
            .push(record);
        Ok(())
    }

    async fn fetch_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let records = self.records.lock().expect("job store lock poisoned");
        let mut due: Vec<JobRecord> = records
            .iter()
            .filter(|record| record.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|record| (Reverse(record.priority), record.next_try_time));
        due.truncate(limit);
        Ok(due)
    }

    async fn update(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("job store lock poisoned");
        match records.iter_mut().find(|stored| stored.id == record.id) {
            Some(stored) => {
                *stored = record;
                Ok(())
            }
            None => Err(StoreError::JobNotFound(record.id)),
        }
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("job store lock poisoned");
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            Err(StoreError::JobNotFound(id))
        } else {
            Ok(())
        }
    }
}
