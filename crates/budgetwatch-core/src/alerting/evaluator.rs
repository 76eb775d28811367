//! Budget threshold evaluation

use tracing::warn;

use crate::models::{AlertDecision, ThresholdLevel};

/// Pure decision function: given a budget limit and current spending, decides
/// whether no alert, a WARNING alert, or a CRITICAL alert should fire.
///
/// CRITICAL is checked first; at most one level ever fires per call.
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    /// Evaluate spending against a budget limit.
    ///
    /// A non-positive limit is a normal state for newly created budgets, not
    /// an error: it is logged and produces no decision.
    pub fn evaluate(limit: f64, spending: f64) -> Option<AlertDecision> {
        if limit <= 0.0 {
            warn!(limit, "Budget limit is zero or negative, skipping evaluation");
            return None;
        }

        let percentage_used = round_half_up(spending / limit, 2);

        let level = if percentage_used >= ThresholdLevel::Critical.ratio() {
            ThresholdLevel::Critical
        } else if percentage_used >= ThresholdLevel::Warning.ratio() {
            ThresholdLevel::Warning
        } else {
            return None;
        };

        Some(AlertDecision {
            level,
            percentage_used,
            message: format_message(level, percentage_used),
        })
    }
}

fn format_message(level: ThresholdLevel, percentage_used: f64) -> String {
    let pct = (percentage_used * 100.0).round() as i64;
    match level {
        ThresholdLevel::Critical => format!(
            "CRITICAL: Budget limit almost reached! You've used {pct}% of your budget."
        ),
        ThresholdLevel::Warning => format!("WARNING: You've used {pct}% of your budget."),
    }
}

fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
