//! Data models for budgetwatch

mod alert;

pub use alert::*;
