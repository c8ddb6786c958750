//! Durable sink for per-window aggregate counts.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::RelayError;
use crate::types::{ArchiveRecord, EventKind};

/// Append-only store of `ArchiveRecord`s.
///
/// Writes are at-least-once: a record retried after a failed write may be
/// stored twice.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Durably append one record.
    async fn record(&self, record: &ArchiveRecord) -> Result<(), RelayError>;

    /// Read back stored records, oldest first, optionally for one kind only.
    async fn records(&self, kind: Option<&EventKind>) -> Result<Vec<ArchiveRecord>, RelayError>;
}

/// In-memory archive for tests and ephemeral relays.
#[derive(Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<ArchiveRecord>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of `times` over every record of `kind`.
    pub fn total_for(&self, kind: &EventKind) -> u64 {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.kind == kind)
            .map(|r| r.times)
            .sum()
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn record(&self, record: &ArchiveRecord) -> Result<(), RelayError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn records(&self, kind: Option<&EventKind>) -> Result<Vec<ArchiveRecord>, RelayError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| kind.map_or(true, |k| &r.kind == k))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn records_filter_by_kind() {
        let archive = MemoryArchive::new();
        let now = Utc::now();
        archive.record(&ArchiveRecord::new("Refund".into(), 2, now)).await.unwrap();
        archive.record(&ArchiveRecord::new("Transfer".into(), 5, now)).await.unwrap();
        archive.record(&ArchiveRecord::new("Refund".into(), 1, now)).await.unwrap();

        assert_eq!(archive.len(), 3);
        let refunds = archive.records(Some(&"Refund".into())).await.unwrap();
        assert_eq!(refunds.len(), 2);
        assert_eq!(archive.total_for(&"Refund".into()), 3);
        assert_eq!(archive.records(None).await.unwrap().len(), 3);
    }
}
