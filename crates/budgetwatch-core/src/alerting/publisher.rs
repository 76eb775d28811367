//! Alert event publication through a bounded outbox
//!
//! `publish` assigns the event identity (id + timestamp) exactly once and
//! hands the event to a bounded in-process outbox; the caller is never
//! blocked on broker IO. A background drain task produces outbox entries to
//! the broker keyed by `user_id`, with a bounded retry count and jittered
//! exponential backoff for transient transport failures. After retries are
//! exhausted the event is dropped and logged; that loss is counted, not
//! hidden.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::models::{AlertDecision, AlertEvent, Budget};

/// Publishes alert events to the broker via a bounded outbox
pub struct EventPublisher {
    outbox_tx: mpsc::Sender<AlertEvent>,
    outbox_rx: Mutex<Option<mpsc::Receiver<AlertEvent>>>,
    broker: Arc<dyn Broker>,
    topic: String,
    config: PublisherConfig,
    /// Last timestamp handed out per recently active user, so per-user
    /// timestamps never go backwards even if the wall clock does
    timestamps: Mutex<TimestampClamp>,
}

impl EventPublisher {
    /// Create a new publisher targeting `topic` on the given broker
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, config: PublisherConfig) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(config.outbox_capacity);
        let timestamps = Mutex::new(TimestampClamp::new(
            config.timestamp_cache_capacity,
            config.timestamp_cache_ttl,
        ));

        Self {
            outbox_tx,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            broker,
            topic: topic.into(),
            config,
            timestamps,
        }
    }

    /// Build the event for a fired decision and enqueue it.
    ///
    /// `event_id` and `timestamp` are assigned here, exactly once per logical
    /// alert. Returns the assigned event id. A full outbox is backpressure
    /// and reported as an error rather than silently dropping the event.
    pub fn publish(
        &self,
        decision: &AlertDecision,
        budget: &Budget,
        current_spending: f64,
    ) -> Result<Uuid> {
        // Timestamp assignment and enqueue happen under one lock: two
        // concurrent publishes for the same user must land in the outbox in
        // timestamp order.
        let mut timestamps = self.timestamps.lock();
        let event = AlertEvent {
            event_id: Uuid::new_v4(),
            user_id: budget.user_id.clone(),
            budget_id: budget.id.clone(),
            budget_name: budget.name.clone(),
            category: budget.category.clone(),
            budget_limit: budget.limit,
            current_spending,
            threshold: decision.level,
            alert_message: decision.message.clone(),
            timestamp: timestamps.next(&budget.user_id),
        };

        let event_id = event.event_id;
        self.publish_event(event)?;
        Ok(event_id)
    }

    /// Enqueue an already-built event. The event is immutable from here on.
    pub fn publish_event(&self, event: AlertEvent) -> Result<()> {
        self.outbox_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => {
                metrics::counter!("budgetwatch_outbox_rejected_total").increment(1);
                Error::Outbox(format!("outbox full, rejecting event {}", event.event_id))
            }
            mpsc::error::TrySendError::Closed(_) => Error::Outbox("outbox closed".to_string()),
        })
    }

    /// Start the outbox drain loop. Drains until the publisher is dropped.
    pub async fn start(&self) {
        let mut outbox_rx = {
            let mut guard = self.outbox_rx.lock();
            match guard.take() {
                Some(rx) => rx,
                None => {
                    error!("Publisher drain task already started");
                    return;
                }
            }
        };

        info!(
            topic = %self.topic,
            capacity = self.config.outbox_capacity,
            max_retries = self.config.max_retries,
            "Outbox drain task started"
        );

        while let Some(event) = outbox_rx.recv().await {
            self.send_with_retry(event).await;
        }

        info!("Outbox drain task stopped");
    }

    async fn send_with_retry(&self, event: AlertEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "Failed to serialize alert event");
                return;
            }
        };

        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            match self
                .broker
                .produce(&self.topic, &event.user_id, payload.clone())
                .await
            {
                Ok(meta) => {
                    info!(
                        event_id = %event.event_id,
                        user_id = %event.user_id,
                        partition = meta.partition,
                        offset = meta.offset,
                        "Published alert event"
                    );
                    metrics::counter!("budgetwatch_events_published_total").increment(1);
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        event_id = %event.event_id,
                        attempt,
                        error = %e,
                        "Transient publish failure, retrying"
                    );
                    metrics::counter!("budgetwatch_publish_retries_total").increment(1);
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                }
                Err(e) => {
                    error!(
                        event_id = %event.event_id,
                        attempts = max_attempts,
                        error = %e,
                        "Dropping alert event after exhausting retries"
                    );
                    metrics::counter!("budgetwatch_events_dropped_total").increment(1);
                    return;
                }
            }
        }
    }

    fn backoff_for(&self, attempt: u32) -> std::time::Duration {
        let base = self.config.retry_backoff * 2u32.saturating_pow(attempt - 1);
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
        base + std::time::Duration::from_millis(jitter)
    }
}

/// Bounded map of the last timestamp handed out per user.
///
/// Idle users are evicted by age, oldest-activity-first by capacity, so the
/// map stays bounded no matter how many distinct users publish over the
/// process lifetime. A user seen again after eviction simply restarts from
/// the wall clock.
struct TimestampClamp {
    capacity: usize,
    ttl: chrono::Duration,
    last: HashMap<String, DateTime<Utc>>,
}

impl TimestampClamp {
    fn new(capacity: usize, ttl: std::time::Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            last: HashMap::new(),
        }
    }

    /// Hand out a creation timestamp that never decreases within one user
    fn next(&mut self, user_id: &str) -> DateTime<Utc> {
        self.next_at(user_id, Utc::now())
    }

    fn next_at(&mut self, user_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(entry) = self.last.get_mut(user_id) {
            if now > *entry {
                *entry = now;
            } else {
                debug!(user_id, "Clock did not advance, reusing last timestamp");
            }
            return *entry;
        }

        self.evict(now);
        self.last.insert(user_id.to_string(), now);
        now
    }

    /// Make room for one new user: drop expired entries, then the least
    /// recently active ones while still at capacity.
    fn evict(&mut self, now: DateTime<Utc>) {
        if self.last.len() < self.capacity {
            return;
        }

        let ttl = self.ttl;
        self.last
            .retain(|_, ts| ts.checked_add_signed(ttl).map_or(true, |deadline| deadline > now));

        while self.last.len() >= self.capacity {
            let stalest = self
                .last
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(user, _)| user.clone());
            match stalest {
                Some(user) => {
                    self.last.remove(&user);
                }
                None => break,
            }
        }
    }
}
