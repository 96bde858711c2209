// Repository trait for historical telemetry access
use crate::domain::location::Location;
use crate::domain::sample::ThermostatSample;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

/// Closed time window, in epoch milliseconds, requested from the query API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl TimeWindow {
    pub fn new(from_ms: i64, to_ms: i64) -> Self {
        Self { from_ms, to_ms }
    }

    /// Window covering the last `hours`, ending `end_lag_secs` before `now`
    /// so the newest minute is left to the live channel. `None` when either
    /// bound falls outside the representable date range.
    pub fn trailing(now: DateTime<Utc>, hours: u32, end_lag_secs: u64) -> Option<Self> {
        let lag = i64::try_from(end_lag_secs).ok().and_then(TimeDelta::try_seconds)?;
        let span = TimeDelta::try_hours(i64::from(hours))?;
        let to = now.checked_sub_signed(lag)?;
        let from = now.checked_sub_signed(span)?;
        Some(Self::new(from.timestamp_millis(), to.timestamp_millis()))
    }
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// All locations with their thermostats, thermostat samples and weather
    /// samples inside the window
    async fn fetch_locations(&self, window: TimeWindow) -> anyhow::Result<Vec<Location>>;

    /// Samples for a single thermostat inside the window
    async fn fetch_thermostat_samples(
        &self,
        thermostat_id: &str,
        window: TimeWindow,
    ) -> anyhow::Result<Vec<ThermostatSample>>;
}
