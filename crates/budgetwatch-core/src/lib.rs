//! # budgetwatch
//!
//! Event-driven budget threshold alerting pipeline.
//!
//! Budgetwatch detects when a user's spending crosses configured thresholds
//! (80% WARNING, 95% CRITICAL) and propagates an alert to downstream
//! notification channels through a partitioned broker.
//!
//! ## Architecture
//!
//! - **Evaluator**: pure threshold decision per spending update
//! - **Publisher**: bounded outbox draining to the broker, keyed by user
//! - **Consumer**: per-partition workers, at-least-once with event-id dedup
//! - **Dispatcher**: concurrent fan-out to isolated notification channels
//!
//! Budget CRUD, persistence, and HTTP surfaces are external collaborators:
//! they call [`alerting::AlertService::evaluate_and_publish`] on spending
//! changes and implement [`alerting::NotificationChannel`] for transports.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alerting;
pub mod broker;
pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{
        AlertService, EventConsumer, EventPublisher, NotificationChannel,
        NotificationDispatcher, ThresholdEvaluator,
    };
    pub use crate::broker::{Broker, MemoryBroker};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
