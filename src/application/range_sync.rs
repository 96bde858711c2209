// Time-window synchronizer - keeps sibling charts on the same visible range
use crate::application::chart_registry::ChartRegistry;
use crate::application::reconciler::ChartMutation;
use crate::domain::chart::{RangeTrigger, TimeRange};
use thiserror::Error;

/// Range-change notification raised by a chart
#[derive(Debug, Clone, PartialEq)]
pub struct RangeChange {
    pub range: Option<TimeRange>,
    pub origin: String,
    /// Set on notifications raised by a synchronized update; these are never
    /// propagated again.
    pub synchronized: bool,
}

impl RangeChange {
    pub fn user(origin: String, range: Option<TimeRange>) -> Self {
        Self {
            range,
            origin,
            synchronized: false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("range minimum {min} is after maximum {max}")]
    Inverted { min: i64, max: i64 },
}

/// Apply a range change to the origin chart and mirror it onto every other
/// Ready chart. Returns one mutation per sibling that changed; the origin
/// already shows the range and gets none.
pub fn synchronize(registry: &mut ChartRegistry, change: &RangeChange) -> Result<Vec<ChartMutation>, RangeError> {
    if let Some(range) = change.range {
        if range.min > range.max {
            return Err(RangeError::Inverted {
                min: range.min,
                max: range.max,
            });
        }
    }

    if change.synchronized {
        return Ok(Vec::new());
    }

    let propagated = match registry.ready_mut(&change.origin) {
        Some(origin) => origin.set_visible_range(change.range, RangeTrigger::User),
        None => {
            tracing::debug!(origin = %change.origin, "Range change from a chart that is not ready");
            return Ok(Vec::new());
        }
    };

    let Some(range) = propagated else {
        return Ok(Vec::new());
    };

    let mut mutations = Vec::new();
    for sibling in registry.ready_charts_mut() {
        if sibling.thermostat_id == change.origin {
            continue;
        }
        // sync-triggered changes never come back as notifications
        let echo = sibling.set_visible_range(range, RangeTrigger::Sync);
        debug_assert!(echo.is_none());
        mutations.push(ChartMutation::RangeChanged {
            chart_id: sibling.thermostat_id.clone(),
            range,
        });
    }

    tracing::debug!(
        origin = %change.origin,
        siblings = mutations.len(),
        "Synchronized visible range"
    );
    Ok(mutations)
}
