//! Inbound collaborator surface for the alerting pipeline
//!
//! The out-of-scope budget CRUD layer calls `evaluate_and_publish` whenever
//! spending changes. Spending state itself is reached through the injected
//! `SpendingLookup`, never through shared mutable globals.

use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Budget;

use super::evaluator::ThresholdEvaluator;
use super::publisher::EventPublisher;

/// Read access to current spending, owned by the caller
#[async_trait::async_trait]
pub trait SpendingLookup: Send + Sync {
    /// Current spending for a user/category/period, `None` if untracked
    async fn get(&self, user_id: &str, category: &str, period: &str) -> Option<f64>;
}

/// Entry point invoked on every spending update
pub struct AlertService {
    publisher: EventPublisher,
}

impl AlertService {
    /// Create the service around a publisher
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }

    /// Evaluate a budget against current spending and publish an alert if a
    /// threshold is crossed. Returns the published event id, if any.
    pub fn evaluate_and_publish(
        &self,
        budget: &Budget,
        current_spending: f64,
    ) -> Result<Option<Uuid>> {
        let Some(decision) = ThresholdEvaluator::evaluate(budget.limit, current_spending) else {
            return Ok(None);
        };

        let event_id = self
            .publisher
            .publish(&decision, budget, current_spending)?;

        info!(
            budget_id = %budget.id,
            user_id = %budget.user_id,
            threshold = ?decision.level,
            event_id = %event_id,
            "Budget alert queued"
        );

        Ok(Some(event_id))
    }

    /// Fetch spending through the injected lookup and evaluate. Untracked
    /// spending counts as zero.
    pub async fn check_budget(
        &self,
        budget: &Budget,
        period: &str,
        lookup: &dyn SpendingLookup,
    ) -> Result<Option<Uuid>> {
        let spending = lookup
            .get(&budget.user_id, &budget.category, period)
            .await
            .unwrap_or(0.0);
        self.evaluate_and_publish(budget, spending)
    }

    /// The publisher behind this service, e.g. to start its drain task
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::config::PublisherConfig;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixedLookup(HashMap<(String, String), f64>);

    #[async_trait::async_trait]
    impl SpendingLookup for FixedLookup {
        async fn get(&self, user_id: &str, category: &str, _period: &str) -> Option<f64> {
            self.0
                .get(&(user_id.to_string(), category.to_string()))
                .copied()
        }
    }

    fn sample_budget(limit: f64) -> Budget {
        Budget {
            id: "budget-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Groceries".to_string(),
            category: "food".to_string(),
            limit,
        }
    }

    fn service() -> AlertService {
        let broker = Arc::new(MemoryBroker::new("budget-alerts", 3));
        AlertService::new(EventPublisher::new(
            broker,
            "budget-alerts",
            PublisherConfig::default(),
        ))
    }

    #[tokio::test]
    async fn quiet_spending_publishes_nothing() {
        let service = service();
        let result = service
            .evaluate_and_publish(&sample_budget(1000.0), 500.0)
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn breach_returns_event_id() {
        let service = service();
        let result = service
            .evaluate_and_publish(&sample_budget(1000.0), 950.0)
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn non_positive_limit_is_silent_and_not_an_error() {
        let service = service();
        let result = service
            .evaluate_and_publish(&sample_budget(0.0), 100.0)
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn check_budget_reads_spending_through_lookup() {
        let service = service();
        let mut spending = HashMap::new();
        spending.insert(("user-1".to_string(), "food".to_string()), 850.0);
        let lookup = FixedLookup(spending);

        let result = service
            .check_budget(&sample_budget(1000.0), "2026-08", &lookup)
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn untracked_spending_counts_as_zero() {
        let service = service();
        let lookup = FixedLookup(HashMap::new());

        let result = service
            .check_budget(&sample_budget(1000.0), "2026-08", &lookup)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
