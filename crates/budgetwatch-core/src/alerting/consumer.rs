//! At-least-once consumption of alert events
//!
//! One worker task per partition; within a partition records are processed
//! strictly sequentially, which preserves per-user ordering. The read
//! position is committed only after the dispatcher has finished with a
//! record, never before. Redeliveries are expected and suppressed by a
//! per-partition dedup cache keyed on `event_id`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, FetchedRecord};
use crate::config::{BrokerConfig, ConsumerConfig};
use crate::models::AlertEvent;

use super::dedup::DedupCache;
use super::dispatcher::NotificationDispatcher;

/// Consumes alert events and hands them to the dispatcher
pub struct EventConsumer {
    broker: Arc<dyn Broker>,
    dispatcher: Arc<NotificationDispatcher>,
    topic: String,
    group: String,
    config: ConsumerConfig,
}

impl EventConsumer {
    /// Create a consumer for the configured topic and group
    pub fn new(
        broker: Arc<dyn Broker>,
        dispatcher: Arc<NotificationDispatcher>,
        broker_config: &BrokerConfig,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            broker,
            dispatcher,
            topic: broker_config.topic.clone(),
            group: broker_config.group_id.clone(),
            config,
        }
    }

    /// Spawn one worker per partition. Workers block on the broker between
    /// deliveries and run until aborted; parallelism is bounded by the
    /// partition count.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.broker.partition_count())
            .map(|partition| {
                let consumer = Arc::clone(self);
                tokio::spawn(async move { consumer.run_partition(partition).await })
            })
            .collect()
    }

    async fn run_partition(&self, partition: u32) {
        info!(
            topic = %self.topic,
            group = %self.group,
            partition,
            "Consumer worker started"
        );

        // Owned by this worker alone; never shared across partitions.
        let mut dedup = DedupCache::new(self.config.dedup_capacity, self.config.dedup_ttl);

        loop {
            let records = match self
                .broker
                .fetch(
                    &self.topic,
                    &self.group,
                    partition,
                    self.config.fetch_max_records,
                )
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    error!(partition, error = %e, "Fetch failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            for record in records {
                self.handle_record(&mut dedup, record).await;
            }
        }
    }

    /// Process one record end to end, committing the read position only
    /// after handling completes.
    async fn handle_record(&self, dedup: &mut DedupCache, record: FetchedRecord) {
        let next_offset = record.offset + 1;

        match serde_json::from_slice::<AlertEvent>(&record.payload) {
            Ok(event) => {
                if dedup.insert(event.event_id) {
                    self.process(&event).await;
                } else {
                    debug!(
                        event_id = %event.event_id,
                        partition = record.partition,
                        offset = record.offset,
                        "Duplicate delivery suppressed"
                    );
                    metrics::counter!("budgetwatch_duplicates_suppressed_total").increment(1);
                }
            }
            Err(e) => {
                // A record that cannot be deserialized will never succeed;
                // commit past it rather than redeliver forever.
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Skipping undecodable record"
                );
                metrics::counter!("budgetwatch_poison_records_total").increment(1);
            }
        }

        if let Err(e) = self
            .broker
            .commit(&self.topic, &self.group, record.partition, next_offset)
            .await
        {
            error!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }

    async fn process(&self, event: &AlertEvent) {
        info!(
            event_id = %event.event_id,
            user_id = %event.user_id,
            budget_id = %event.budget_id,
            threshold = ?event.threshold,
            "Received budget alert event"
        );

        let results = self.dispatcher.dispatch(event).await;

        debug!(
            event_id = %event.event_id,
            attempted = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            "Alert event handled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::channels::{ChannelError, NotificationChannel};
    use crate::broker::MemoryBroker;
    use crate::models::ThresholdLevel;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    struct RecordingChannel {
        sends: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, user_id: &str, _: &str, _: &str) -> Result<(), ChannelError> {
            self.sends.lock().push(user_id.to_string());
            Ok(())
        }
    }

    fn sample_event(user_id: &str) -> AlertEvent {
        AlertEvent {
            event_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            budget_id: "budget-1".to_string(),
            budget_name: "Groceries".to_string(),
            category: "food".to_string(),
            budget_limit: 1000.0,
            current_spending: 800.0,
            threshold: ThresholdLevel::Warning,
            alert_message: "WARNING: You've used 80% of your budget.".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn test_setup() -> (
        Arc<MemoryBroker>,
        Arc<EventConsumer>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let broker = Arc::new(MemoryBroker::new("budget-alerts", 1));
        let sends = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(NotificationDispatcher::new(vec![Box::new(
            RecordingChannel {
                sends: sends.clone(),
            },
        )]));
        let consumer = Arc::new(EventConsumer::new(
            broker.clone() as Arc<dyn Broker>,
            dispatcher,
            &BrokerConfig {
                partitions: 1,
                ..BrokerConfig::default()
            },
            ConsumerConfig::default(),
        ));
        (broker, consumer, sends)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition should hold within the timeout");
    }

    #[tokio::test]
    async fn commits_only_after_dispatch() {
        let (broker, consumer, sends) = test_setup();
        let payload = serde_json::to_vec(&sample_event("user-1")).unwrap();
        broker
            .produce("budget-alerts", "user-1", payload)
            .await
            .unwrap();

        assert_eq!(broker.committed_offset("notification-service-group", 0), 0);

        let handles = consumer.start();
        wait_for(|| sends.lock().len() == 1).await;
        wait_for(|| broker.committed_offset("notification-service-group", 0) == 1).await;

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn redelivered_event_id_produces_no_extra_sends() {
        let (broker, consumer, sends) = test_setup();
        let payload = serde_json::to_vec(&sample_event("user-1")).unwrap();

        // The same logical event stored twice simulates broker redelivery
        // of a committed-but-unacked record.
        broker
            .produce("budget-alerts", "user-1", payload.clone())
            .await
            .unwrap();
        broker
            .produce("budget-alerts", "user-1", payload)
            .await
            .unwrap();

        let handles = consumer.start();
        wait_for(|| broker.committed_offset("notification-service-group", 0) == 2).await;

        assert_eq!(sends.lock().len(), 1);
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn poison_record_is_skipped_and_committed_past() {
        let (broker, consumer, sends) = test_setup();
        broker
            .produce("budget-alerts", "user-1", b"not json".to_vec())
            .await
            .unwrap();
        let payload = serde_json::to_vec(&sample_event("user-1")).unwrap();
        broker
            .produce("budget-alerts", "user-1", payload)
            .await
            .unwrap();

        let handles = consumer.start();
        wait_for(|| broker.committed_offset("notification-service-group", 0) == 2).await;

        assert_eq!(sends.lock().len(), 1);
        for handle in handles {
            handle.abort();
        }
    }
}
