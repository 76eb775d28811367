//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Threshold level that triggers an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// 80% of the budget used
    Warning,
    /// 95% of the budget used
    Critical,
}

impl ThresholdLevel {
    /// The fraction of the budget at which this level fires
    pub fn ratio(self) -> f64 {
        match self {
            Self::Warning => 0.80,
            Self::Critical => 0.95,
        }
    }
}

/// Outcome of evaluating a budget against current spending
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    /// Threshold level that was crossed
    pub level: ThresholdLevel,

    /// Fraction of the budget used, rounded to two decimal places
    pub percentage_used: f64,

    /// Human-readable rendering of the breach
    pub message: String,
}

/// A budget as supplied by the out-of-scope CRUD layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Budget identifier
    pub id: String,

    /// Owner of the budget
    pub user_id: String,

    /// Human-readable name
    pub name: String,

    /// Spending category this budget covers
    pub category: String,

    /// Spending limit for the period
    pub limit: f64,
}

/// The immutable record describing one threshold breach.
///
/// Created once by the evaluator, published through the broker keyed by
/// `user_id`, and never mutated afterwards. `event_id` is the consumer-side
/// deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Globally unique identifier, assigned once at creation
    pub event_id: Uuid,

    /// Partition/routing key; per-user ordering is scoped to this field
    pub user_id: String,

    /// The budget that triggered the alert
    pub budget_id: String,

    /// Human-readable budget name
    pub budget_name: String,

    /// Spending category of the budget
    pub category: String,

    /// The configured spending limit
    pub budget_limit: f64,

    /// Spending at evaluation time
    pub current_spending: f64,

    /// The threshold level that was crossed
    pub threshold: ThresholdLevel,

    /// Human-readable alert message
    pub alert_message: String,

    /// Creation time, assigned once; non-decreasing per `user_id`
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    /// Percentage of the budget used, zero when the limit is not positive
    pub fn percentage_used(&self) -> f64 {
        if self.budget_limit <= 0.0 {
            return 0.0;
        }
        self.current_spending / self.budget_limit * 100.0
    }
}

/// Record of a notification attempt on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Channel name
    pub channel: String,

    /// When the attempt was made
    pub sent_at: DateTime<Utc>,

    /// Whether it succeeded
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(limit: f64, spending: f64) -> AlertEvent {
        AlertEvent {
            event_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            budget_id: "budget-1".to_string(),
            budget_name: "Groceries".to_string(),
            category: "food".to_string(),
            budget_limit: limit,
            current_spending: spending,
            threshold: ThresholdLevel::Warning,
            alert_message: "WARNING: You've used 80% of your budget.".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn percentage_used_guards_non_positive_limit() {
        assert_eq!(sample_event(0.0, 100.0).percentage_used(), 0.0);
        assert_eq!(sample_event(-50.0, 100.0).percentage_used(), 0.0);
        assert!((sample_event(1000.0, 800.0).percentage_used() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn event_json_tolerates_unknown_fields() {
        let mut value = serde_json::to_value(sample_event(1000.0, 800.0)).unwrap();
        value["some_future_field"] = serde_json::json!("ignored");
        let event: AlertEvent = serde_json::from_value(value).unwrap();
        assert_eq!(event.user_id, "user-1");
    }
}
