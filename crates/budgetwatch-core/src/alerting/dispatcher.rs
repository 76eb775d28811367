//! Fan-out dispatch of alert events to notification channels
//!
//! Every configured channel is attempted exactly once per event, channels
//! run concurrently, and one channel's failure never prevents the others.
//! There is no whole-event failure state; failures exist per channel only,
//! so partial delivery is never thrown away.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use crate::models::{AlertEvent, NotificationRecord};

use super::channels::NotificationChannel;

/// Title used for every budget alert notification
const ALERT_TITLE: &str = "Budget Alert";

/// Outcome of one channel attempt for one event
#[derive(Debug, Clone)]
pub struct ChannelResult {
    /// Channel name
    pub channel: String,
    /// Whether the send succeeded
    pub success: bool,
    /// Error message if it failed
    pub error: Option<String>,
    /// When the attempt was made
    pub sent_at: DateTime<Utc>,
}

impl From<ChannelResult> for NotificationRecord {
    fn from(result: ChannelResult) -> Self {
        NotificationRecord {
            channel: result.channel,
            sent_at: result.sent_at,
            success: result.success,
            error: result.error,
        }
    }
}

/// Fans one alert event out to all configured channels
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over a fixed channel set
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Number of configured channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Attempt every channel once for this event and return the per-channel
    /// outcomes. The event counts as handled once this returns, regardless
    /// of individual outcomes.
    pub async fn dispatch(&self, event: &AlertEvent) -> Vec<ChannelResult> {
        let body = notification_body(event);

        let attempts = self
            .channels
            .iter()
            .map(|channel| attempt(channel.as_ref(), event, &body));
        let results = join_all(attempts).await;

        let failures = results.iter().filter(|r| !r.success).count();
        info!(
            event_id = %event.event_id,
            user_id = %event.user_id,
            channels = results.len(),
            failures,
            "Dispatched alert event"
        );

        results
    }
}

async fn attempt(
    channel: &dyn NotificationChannel,
    event: &AlertEvent,
    body: &str,
) -> ChannelResult {
    let sent_at = Utc::now();
    let name = channel.name().to_string();

    let outcome = channel.send(&event.user_id, ALERT_TITLE, body).await;

    match &outcome {
        Ok(()) => {
            metrics::counter!("budgetwatch_dispatch_success_total", "channel" => name.clone())
                .increment(1);
        }
        Err(e) => {
            warn!(
                event_id = %event.event_id,
                channel = %name,
                error = %e,
                "Notification channel failed"
            );
            metrics::counter!("budgetwatch_dispatch_failure_total", "channel" => name.clone())
                .increment(1);
        }
    }

    ChannelResult {
        channel: name,
        success: outcome.is_ok(),
        error: outcome.err().map(|e| e.to_string()),
        sent_at,
    }
}

/// Notification body rendered from an alert event
fn notification_body(event: &AlertEvent) -> String {
    format!(
        "{} - Budget: {}, Category: {}, Current Spending: {:.2}, Limit: {:.2}",
        event.alert_message,
        event.budget_name,
        event.category,
        event.current_spending,
        event.budget_limit
    )
}
