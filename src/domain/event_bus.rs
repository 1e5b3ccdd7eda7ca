//! Topic-based event transport for change events.
//!
//! [`EventBus`] is the contract the pipeline relies on: keyed publish,
//! per-key ordering through partitions, independent consumer groups and
//! at-least-once delivery (a record is redelivered until its group commits
//! past it). [`InMemoryEventBus`] implements it as a partitioned,
//! append-only log with per-group committed offsets, in the spirit of a
//! Kafka topic living inside the process.
//!
//! The in-process log is not durable. History rows are persisted, so an
//! event published but not yet consumed when the process stops is lost,
//! and the next analysis of that variant sees no change to re-emit.

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use super::ChangeEvent;
use crate::error::PipelineError;

/// A record read from one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Partition the record lives in.
    pub partition: usize,
    /// Position of the record within its partition.
    pub offset: u64,
    /// Partition key the record was published with.
    pub key: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

/// Publishing side of the transport.
#[async_trait]
pub trait EventBus: Send + Sync + fmt::Debug {
    /// Appends `payload` to the partition selected by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if the record could not be
    /// stored.
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<(), PipelineError>;

    /// Number of partitions of the topic.
    fn partitions(&self) -> usize;

    /// Opens a consumer on one partition for `group`, starting at the
    /// group's committed offset.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] if the partition does not
    /// exist.
    fn consumer(
        &self,
        group: &str,
        partition: usize,
    ) -> Result<Box<dyn EventConsumer>, PipelineError>;
}

/// Consuming side of one partition for one group.
#[async_trait]
pub trait EventConsumer: Send + fmt::Debug {
    /// Waits for the next record after the current position.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if the transport is gone.
    async fn poll(&mut self) -> Result<BusRecord, PipelineError>;

    /// Commits everything polled so far. Uncommitted records are delivered
    /// again to the next consumer of the same group and partition.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if the commit was not stored.
    async fn commit(&mut self) -> Result<(), PipelineError>;
}

/// Encodes `event` and publishes it under its product key.
///
/// # Errors
///
/// Returns [`PipelineError`] if encoding or publishing fails.
pub async fn publish_change(bus: &dyn EventBus, event: &ChangeEvent) -> Result<(), PipelineError> {
    bus.publish(&event.partition_key(), event.encode()?).await
}

/// Retained records of one partition. `base` is the offset of the first
/// record in `records`.
#[derive(Debug, Default)]
struct PartitionLog {
    base: u64,
    records: VecDeque<BusRecord>,
}

impl PartitionLog {
    fn end(&self) -> u64 {
        self.base + self.records.len() as u64
    }

    /// Drops every record below `offset`.
    fn trim_to(&mut self, offset: u64) -> usize {
        let mut dropped = 0;
        while self.base < offset && self.records.pop_front().is_some() {
            self.base += 1;
            dropped += 1;
        }
        dropped
    }
}

#[derive(Debug)]
struct Partition {
    log: RwLock<PartitionLog>,
    /// End offset of the log, watched by waiting consumers.
    len_tx: watch::Sender<u64>,
}

#[derive(Debug)]
struct LogInner {
    partitions: Vec<Partition>,
    committed: RwLock<HashMap<(String, usize), u64>>,
}

/// In-process partitioned log.
///
/// Once every group that has committed on a partition is past a record, the
/// record is dropped. Offsets keep counting from where they were. A group
/// that has never committed starts at the oldest retained record.
///
/// Nothing survives a restart: records published but not yet consumed are
/// lost with the process.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    inner: Arc<LogInner>,
}

impl InMemoryEventBus {
    /// Creates a bus with `partitions` partitions (at least one).
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        let partitions = (0..partitions.max(1))
            .map(|_| {
                let (len_tx, _) = watch::channel(0);
                Partition {
                    log: RwLock::new(PartitionLog::default()),
                    len_tx,
                }
            })
            .collect();
        Self {
            inner: Arc::new(LogInner {
                partitions,
                committed: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Partition a key maps to.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let count = self.inner.partitions.len() as u64;
        usize::try_from(hasher.finish() % count).unwrap_or(0)
    }

    /// Total number of retained records across all partitions.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for partition in &self.inner.partitions {
            total += partition.log.read().await.records.len();
        }
        total
    }

    /// Returns `true` if no record is retained.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Committed offset of `group` on `partition` (0 if never committed).
    pub async fn committed(&self, group: &str, partition: usize) -> u64 {
        self.inner
            .committed
            .read()
            .await
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<(), PipelineError> {
        let index = self.partition_for(key);
        let partition = self
            .inner
            .partitions
            .get(index)
            .ok_or_else(|| PipelineError::Internal(format!("partition {index} missing")))?;

        let mut log = partition.log.write().await;
        let offset = log.end();
        log.records.push_back(BusRecord {
            partition: index,
            offset,
            key: key.to_string(),
            payload,
        });
        partition.len_tx.send_replace(offset + 1);
        drop(log);

        tracing::trace!(key, partition = index, offset, "record published");
        Ok(())
    }

    fn partitions(&self) -> usize {
        self.inner.partitions.len()
    }

    fn consumer(
        &self,
        group: &str,
        partition: usize,
    ) -> Result<Box<dyn EventConsumer>, PipelineError> {
        let len_rx = self
            .inner
            .partitions
            .get(partition)
            .map(|p| p.len_tx.subscribe())
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "partition {partition} out of range (0..{})",
                    self.inner.partitions.len()
                ))
            })?;

        Ok(Box::new(LogConsumer {
            inner: Arc::clone(&self.inner),
            group: group.to_string(),
            partition,
            position: None,
            len_rx,
        }))
    }
}

/// Consumer of one partition of an [`InMemoryEventBus`].
#[derive(Debug)]
struct LogConsumer {
    inner: Arc<LogInner>,
    group: String,
    partition: usize,
    /// Next offset to read; resolved from the committed offset on first poll.
    position: Option<u64>,
    len_rx: watch::Receiver<u64>,
}

#[async_trait]
impl EventConsumer for LogConsumer {
    async fn poll(&mut self) -> Result<BusRecord, PipelineError> {
        let mut position = match self.position {
            Some(position) => position,
            None => {
                let committed = self
                    .inner
                    .committed
                    .read()
                    .await
                    .get(&(self.group.clone(), self.partition))
                    .copied()
                    .unwrap_or(0);
                self.position = Some(committed);
                committed
            }
        };

        loop {
            let len = *self.len_rx.borrow_and_update();
            if position < len {
                let partition = self.inner.partitions.get(self.partition).ok_or_else(|| {
                    PipelineError::Internal(format!("partition {} missing", self.partition))
                })?;
                let log = partition.log.read().await;
                if position < log.base {
                    tracing::debug!(
                        group = %self.group,
                        partition = self.partition,
                        from = position,
                        to = log.base,
                        "skipping records no longer retained"
                    );
                    position = log.base;
                    self.position = Some(position);
                }
                if position < log.end() {
                    let record = usize::try_from(position - log.base)
                        .ok()
                        .and_then(|i| log.records.get(i))
                        .cloned()
                        .ok_or_else(|| {
                            PipelineError::Internal(format!(
                                "offset {position} missing in partition {}",
                                self.partition
                            ))
                        })?;
                    self.position = Some(position + 1);
                    return Ok(record);
                }
            }
            if self.len_rx.changed().await.is_err() {
                return Err(PipelineError::TransientIo("event bus closed".to_string()));
            }
        }
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        let Some(position) = self.position else {
            return Ok(());
        };

        let low_water = {
            let mut committed = self.inner.committed.write().await;
            committed.insert((self.group.clone(), self.partition), position);
            committed
                .iter()
                .filter(|((_, partition), _)| *partition == self.partition)
                .map(|(_, offset)| *offset)
                .min()
                .unwrap_or(0)
        };

        if let Some(partition) = self.inner.partitions.get(self.partition) {
            let dropped = partition.log.write().await.trim_to(low_water);
            if dropped > 0 {
                tracing::trace!(partition = self.partition, dropped, low_water, "log trimmed");
            }
        }
        Ok(())
    }
}
