//! The alerting pipeline
//!
//! Threshold evaluation, outbox-backed publication, at-least-once
//! consumption with dedup, and fan-out notification dispatch.

mod channels;
mod consumer;
mod dedup;
mod dispatcher;
mod evaluator;
mod publisher;
mod service;

pub use channels::{
    channels_from_config, ChannelError, EmailChannel, InAppChannel, NotificationChannel,
    PushChannel,
};
pub use consumer::EventConsumer;
pub use dedup::DedupCache;
pub use dispatcher::{ChannelResult, NotificationDispatcher};
pub use evaluator::ThresholdEvaluator;
pub use publisher::EventPublisher;
pub use service::{AlertService, SpendingLookup};
