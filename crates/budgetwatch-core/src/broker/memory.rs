//! In-process partitioned append log

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use super::{partition_for, Broker, FetchedRecord, RecordMetadata};
use crate::error::{Error, Result};

struct StoredRecord {
    key: String,
    payload: Vec<u8>,
}

/// In-memory broker: one topic, a fixed set of partitions, per-group
/// committed offsets. Fetches block on a notifier until data arrives, which
/// mirrors a long-polling subscriber.
pub struct MemoryBroker {
    topic: String,
    partitions: Vec<RwLock<Vec<StoredRecord>>>,
    committed: Mutex<HashMap<(String, u32), u64>>,
    data_ready: Notify,
    inject_failures: AtomicU32,
}

impl MemoryBroker {
    /// Create a broker hosting `topic` with `partitions` partitions
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        let partitions = partitions.max(1);
        Self {
            topic: topic.into(),
            partitions: (0..partitions).map(|_| RwLock::new(Vec::new())).collect(),
            committed: Mutex::new(HashMap::new()),
            data_ready: Notify::new(),
            inject_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` produce calls fail with a transport error.
    /// Used to exercise publisher retry behavior.
    pub fn inject_produce_failures(&self, count: u32) {
        self.inject_failures.store(count, Ordering::SeqCst);
    }

    /// Committed offset for a group in a partition (zero if never committed)
    pub fn committed_offset(&self, group: &str, partition: u32) -> u64 {
        self.committed
            .lock()
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Number of records stored in a partition
    pub fn partition_len(&self, partition: u32) -> usize {
        self.partitions
            .get(partition as usize)
            .map_or(0, |log| log.read().len())
    }

    /// Everything stored in a partition, regardless of committed offsets
    pub fn records(&self, partition: u32) -> Vec<FetchedRecord> {
        self.partitions
            .get(partition as usize)
            .map_or_else(Vec::new, |log| {
                log.read()
                    .iter()
                    .enumerate()
                    .map(|(offset, record)| FetchedRecord {
                        partition,
                        offset: offset as u64,
                        key: record.key.clone(),
                        payload: record.payload.clone(),
                    })
                    .collect()
            })
    }

    fn check_topic(&self, topic: &str) -> Result<()> {
        if topic != self.topic {
            return Err(Error::broker(format!("unknown topic: {topic}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<RecordMetadata> {
        self.check_topic(topic)?;

        if self
            .inject_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::broker("injected transport failure"));
        }

        let partition = partition_for(key, self.partition_count());
        let offset = {
            let mut log = self.partitions[partition as usize].write();
            log.push(StoredRecord {
                key: key.to_string(),
                payload,
            });
            (log.len() - 1) as u64
        };

        self.data_ready.notify_waiters();
        Ok(RecordMetadata { partition, offset })
    }

    async fn fetch(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
        max_records: usize,
    ) -> Result<Vec<FetchedRecord>> {
        self.check_topic(topic)?;
        if partition >= self.partition_count() {
            return Err(Error::broker(format!("unknown partition: {partition}")));
        }

        loop {
            // Register as a waiter before checking the log, so a produce
            // racing this check still wakes us.
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let start = self.committed_offset(group, partition);
            let records: Vec<FetchedRecord> = {
                let log = self.partitions[partition as usize].read();
                log.iter()
                    .enumerate()
                    .skip(start as usize)
                    .take(max_records)
                    .map(|(offset, record)| FetchedRecord {
                        partition,
                        offset: offset as u64,
                        key: record.key.clone(),
                        payload: record.payload.clone(),
                    })
                    .collect()
            };

            if !records.is_empty() {
                return Ok(records);
            }

            notified.await;
        }
    }

    async fn commit(&self, topic: &str, group: &str, partition: u32, offset: u64) -> Result<()> {
        self.check_topic(topic)?;

        let mut committed = self.committed.lock();
        let entry = committed.entry((group.to_string(), partition)).or_insert(0);
        *entry = (*entry).max(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn produce_routes_by_key_and_assigns_offsets() {
        let broker = MemoryBroker::new("budget-alerts", 3);

        let first = broker
            .produce("budget-alerts", "user-1", b"a".to_vec())
            .await
            .unwrap();
        let second = broker
            .produce("budget-alerts", "user-1", b"b".to_vec())
            .await
            .unwrap();

        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset + 1);
    }

    #[tokio::test]
    async fn fetch_resumes_from_committed_offset() {
        let broker = MemoryBroker::new("budget-alerts", 1);
        for payload in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
            broker.produce("budget-alerts", "u", payload).await.unwrap();
        }

        let batch = broker.fetch("budget-alerts", "g", 0, 10).await.unwrap();
        assert_eq!(batch.len(), 3);

        broker.commit("budget-alerts", "g", 0, 2).await.unwrap();
        let batch = broker.fetch("budget-alerts", "g", 0, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, b"c");
    }

    #[tokio::test]
    async fn uncommitted_records_are_redelivered() {
        let broker = MemoryBroker::new("budget-alerts", 1);
        broker
            .produce("budget-alerts", "u", b"a".to_vec())
            .await
            .unwrap();

        let first = broker.fetch("budget-alerts", "g", 0, 10).await.unwrap();
        let again = broker.fetch("budget-alerts", "g", 0, 10).await.unwrap();
        assert_eq!(first[0].offset, again[0].offset);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let broker = MemoryBroker::new("budget-alerts", 1);
        broker.inject_produce_failures(2);

        tokio_test::assert_err!(broker.produce("budget-alerts", "u", b"a".to_vec()).await);
        tokio_test::assert_err!(broker.produce("budget-alerts", "u", b"a".to_vec()).await);
        tokio_test::assert_ok!(broker.produce("budget-alerts", "u", b"a".to_vec()).await);
    }

    #[tokio::test]
    async fn rejects_unknown_topic() {
        let broker = MemoryBroker::new("budget-alerts", 1);
        assert!(broker.produce("other", "u", b"a".to_vec()).await.is_err());
    }
}
