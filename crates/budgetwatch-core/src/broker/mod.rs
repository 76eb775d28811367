//! Client-side abstraction over the external partitioned broker
//!
//! The broker itself (a partitioned, replicated append log) is an external
//! system. This module expresses the client contract the pipeline needs:
//! acknowledged, key-partitioned produces and per-group offset-tracked
//! fetches. `MemoryBroker` is the in-process implementation used by tests
//! and the `simulate` command.

mod memory;

pub use memory::MemoryBroker;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;

/// Metadata returned once the broker has fully acknowledged a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Partition the record was routed to
    pub partition: u32,
    /// Offset of the record within its partition
    pub offset: u64,
}

/// A record delivered from a partition
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    /// Partition the record came from
    pub partition: u32,
    /// Offset of the record within its partition
    pub offset: u64,
    /// Partition/routing key
    pub key: String,
    /// Serialized record value
    pub payload: Vec<u8>,
}

/// Broker client contract
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Number of partitions in the topic
    fn partition_count(&self) -> u32;

    /// Append a record, routed by `key`. Resolves only after the broker has
    /// fully acknowledged the write; retried sends must not create duplicate
    /// records (idempotent producer semantics).
    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<RecordMetadata>;

    /// Fetch records in one partition starting at the group's committed
    /// offset, blocking until at least one record is available.
    async fn fetch(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
        max_records: usize,
    ) -> Result<Vec<FetchedRecord>>;

    /// Commit the group's read position in a partition. Records below
    /// `offset` will not be redelivered to this group.
    async fn commit(&self, topic: &str, group: &str, partition: u32, offset: u64) -> Result<()>;
}

/// Stable key-to-partition routing shared by broker implementations.
///
/// All records for one key land in one partition, which is what scopes the
/// per-user ordering guarantee.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions.max(1))) as u32
}
