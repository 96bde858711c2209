// Chart view domain models
//
// A ChartView is the per-thermostat projection the front end draws: four
// series plus a summary panel. Live points are appended in arrival order.
use super::events::ThermostatUpdate;
use super::location::Thermostat;
use super::sample::{RunState, ThermostatSample, WeatherSample};
use serde::Serialize;

/// Cadence the publisher is expected to follow. Runtime minutes are counted
/// as one minute per running sample, which only holds at this cadence.
pub const ASSUMED_SAMPLE_INTERVAL_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "(i64, f64)")]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

impl From<TimeSeriesPoint> for (i64, f64) {
    fn from(point: TimeSeriesPoint) -> Self {
        (point.time_ms, point.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesKind {
    Indoor,
    Target,
    Outdoor,
    RunState,
}

impl SeriesKind {
    pub fn display_name(self) -> &'static str {
        match self {
            SeriesKind::Indoor => "Temperature",
            SeriesKind::Target => "Target Temperature",
            SeriesKind::Outdoor => "Outside Temperature",
            SeriesKind::RunState => "Runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub kind: SeriesKind,
    pub name: &'static str,
    pub points: Vec<TimeSeriesPoint>,
}

impl Series {
    pub fn new(kind: SeriesKind, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            kind,
            name: kind.display_name(),
            points,
        }
    }

    pub fn last_time_ms(&self) -> Option<i64> {
        self.points.last().map(|p| p.time_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl TimeRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

/// Side panel values shown next to the chart.
///
/// Temperatures are the raw sample values; the panel shows them rounded to
/// one decimal, which is left to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub indoor_temp: Option<f64>,
    pub target_temp: Option<f64>,
    pub runtime_mins: u64,
    pub last_update_ms: Option<i64>,
    pub running: Option<bool>,
}

impl ChartSummary {
    fn from_samples(samples: &[ThermostatSample]) -> Self {
        let latest = samples.last();
        Self {
            indoor_temp: latest.map(|s| s.current_temp),
            target_temp: latest.map(|s| s.target_temp),
            runtime_mins: samples.iter().filter(|s| s.run_state.is_running()).count() as u64,
            last_update_ms: latest.map(|s| s.time_ms),
            running: latest.map(|s| s.run_state.is_running()),
        }
    }
}

/// Who asked for a visible range change. Only user gestures are propagated
/// to sibling charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeTrigger {
    User,
    Sync,
}

/// Points appended to one chart by a single event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendedPoint {
    pub series: SeriesKind,
    pub point: TimeSeriesPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
    pub thermostat_id: String,
    pub thermostat_name: String,
    pub location_id: String,
    pub title: String,
    pub indoor: Series,
    pub target: Series,
    pub outdoor: Series,
    pub run_state: Series,
    pub summary: ChartSummary,
    pub visible_range: Option<TimeRange>,
}

impl ChartView {
    /// Build the initial view from historical samples. Pure: the same history
    /// always yields the same view.
    pub fn from_history(thermostat: &Thermostat, weather: &[WeatherSample]) -> Self {
        let samples = &thermostat.samples;
        let indoor = samples
            .iter()
            .map(|s| TimeSeriesPoint::new(s.time_ms, s.current_temp))
            .collect();
        let target = samples
            .iter()
            .map(|s| TimeSeriesPoint::new(s.time_ms, s.target_temp))
            .collect();
        let run_state = samples
            .iter()
            .map(|s| TimeSeriesPoint::new(s.time_ms, s.run_state.as_value()))
            .collect();
        let outdoor = weather
            .iter()
            .map(|s| TimeSeriesPoint::new(s.time_ms, s.current_temp))
            .collect();

        let summary = ChartSummary::from_samples(samples);
        let title = format_title(&thermostat.name, summary.running);

        Self {
            thermostat_id: thermostat.id.clone(),
            thermostat_name: thermostat.name.clone(),
            location_id: thermostat.location_id.clone(),
            title,
            indoor: Series::new(SeriesKind::Indoor, indoor),
            target: Series::new(SeriesKind::Target, target),
            outdoor: Series::new(SeriesKind::Outdoor, outdoor),
            run_state: Series::new(SeriesKind::RunState, run_state),
            summary,
            visible_range: None,
        }
    }

    pub fn series(&self, kind: SeriesKind) -> &Series {
        match kind {
            SeriesKind::Indoor => &self.indoor,
            SeriesKind::Target => &self.target,
            SeriesKind::Outdoor => &self.outdoor,
            SeriesKind::RunState => &self.run_state,
        }
    }

    fn series_mut(&mut self, kind: SeriesKind) -> &mut Series {
        match kind {
            SeriesKind::Indoor => &mut self.indoor,
            SeriesKind::Target => &mut self.target,
            SeriesKind::Outdoor => &mut self.outdoor,
            SeriesKind::RunState => &mut self.run_state,
        }
    }

    /// Weather samples currently plotted, used when the chart is re-seeded
    pub fn weather_samples(&self) -> Vec<WeatherSample> {
        self.outdoor
            .points
            .iter()
            .map(|p| WeatherSample::new(p.time_ms, p.value))
            .collect()
    }

    /// Thermostat samples currently plotted, rebuilt from the three
    /// thermostat series which always grow together
    pub fn thermostat_samples(&self) -> Vec<ThermostatSample> {
        self.indoor
            .points
            .iter()
            .zip(&self.target.points)
            .zip(&self.run_state.points)
            .map(|((indoor, target), state)| {
                let run_state = if state.value > 0.0 { RunState::Running } else { RunState::Idle };
                ThermostatSample::new(indoor.time_ms, indoor.value, target.value, run_state)
            })
            .collect()
    }

    /// Apply a thermostat update. Updates for other thermostats are ignored
    /// and return `None`.
    pub fn apply_thermostat_update(&mut self, update: &ThermostatUpdate) -> Option<Vec<AppendedPoint>> {
        if update.thermostat_id != self.thermostat_id {
            return None;
        }

        let sample = &update.sample;
        let previous_ms = self.summary.last_update_ms;
        // gaps that overflow i64 are not worth a cadence warning
        let gap = previous_ms.and_then(|previous_ms| sample.time_ms.checked_sub(previous_ms));
        let drift = gap.and_then(|gap| gap.checked_sub(ASSUMED_SAMPLE_INTERVAL_MS));
        if sample.run_state.is_running()
            && drift.is_some_and(|drift| drift.unsigned_abs() > ASSUMED_SAMPLE_INTERVAL_MS.unsigned_abs() / 2)
        {
            tracing::warn!(
                thermostat_id = %self.thermostat_id,
                gap_ms = ?gap,
                "Sample gap differs from the one-minute cadence, runtime minutes are approximate"
            );
        }

        let appended = vec![
            self.append(SeriesKind::Indoor, TimeSeriesPoint::new(sample.time_ms, sample.current_temp)),
            self.append(SeriesKind::Target, TimeSeriesPoint::new(sample.time_ms, sample.target_temp)),
            self.append(
                SeriesKind::RunState,
                TimeSeriesPoint::new(sample.time_ms, sample.run_state.as_value()),
            ),
        ];

        self.summary.indoor_temp = Some(sample.current_temp);
        self.summary.target_temp = Some(sample.target_temp);
        self.summary.last_update_ms = Some(sample.time_ms);
        self.summary.running = Some(sample.run_state.is_running());
        if sample.run_state == RunState::Running {
            self.summary.runtime_mins += 1;
        }
        self.title = format_title(&self.thermostat_name, self.summary.running);

        Some(appended)
    }

    pub fn apply_weather_sample(&mut self, sample: &WeatherSample) -> AppendedPoint {
        self.append(SeriesKind::Outdoor, TimeSeriesPoint::new(sample.time_ms, sample.current_temp))
    }

    /// Append a point as-is, even when it does not extend the series in time
    /// (duplicate or out-of-order delivery).
    fn append(&mut self, kind: SeriesKind, point: TimeSeriesPoint) -> AppendedPoint {
        let in_order = self.series(kind).last_time_ms().is_none_or(|last| point.time_ms > last);
        self.series_mut(kind).points.push(point);
        if !in_order {
            tracing::warn!(
                thermostat_id = %self.thermostat_id,
                series = ?kind,
                time_ms = point.time_ms,
                "Appended point does not extend the series in time"
            );
        }
        AppendedPoint { series: kind, point }
    }

    /// Set the visible window. A user-triggered change returns the range so it
    /// can be propagated; a synchronized change returns `None`.
    pub fn set_visible_range(&mut self, range: Option<TimeRange>, trigger: RangeTrigger) -> Option<Option<TimeRange>> {
        self.visible_range = range;
        match trigger {
            RangeTrigger::User => Some(range),
            RangeTrigger::Sync => None,
        }
    }
}

fn format_title(name: &str, running: Option<bool>) -> String {
    match running {
        Some(true) => format!("{} (Running)", name),
        Some(false) => format!("{} (Idle)", name),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermostat(samples: Vec<ThermostatSample>) -> Thermostat {
        Thermostat::new("A".to_string(), "Upstairs".to_string(), "loc-1".to_string(), samples)
    }

    fn update(id: &str, time_ms: i64, current: f64, run_state: RunState) -> ThermostatUpdate {
        ThermostatUpdate {
            thermostat_id: id.to_string(),
            sample: ThermostatSample::new(time_ms, current, 72.0, run_state),
        }
    }

    #[test]
    fn test_from_history_builds_series_and_summary() {
        let tstat = thermostat(vec![
            ThermostatSample::new(1, 69.0, 72.0, RunState::Running),
            ThermostatSample::new(2, 70.0, 72.0, RunState::Running),
            ThermostatSample::new(3, 70.5, 71.0, RunState::Idle),
        ]);
        let weather = vec![WeatherSample::new(1, 40.0)];

        let view = ChartView::from_history(&tstat, &weather);

        assert_eq!(view.indoor.points.len(), 3);
        assert_eq!(view.target.points[2], TimeSeriesPoint::new(3, 71.0));
        assert_eq!(view.run_state.points[0], TimeSeriesPoint::new(1, 1.0));
        assert_eq!(view.outdoor.points, vec![TimeSeriesPoint::new(1, 40.0)]);
        assert_eq!(view.summary.indoor_temp, Some(70.5));
        assert_eq!(view.summary.runtime_mins, 2);
        assert_eq!(view.summary.last_update_ms, Some(3));
        assert_eq!(view.title, "Upstairs (Idle)");
        assert_eq!(view.visible_range, None);
    }

    #[test]
    fn test_from_history_is_idempotent() {
        let tstat = thermostat(vec![ThermostatSample::new(1, 69.0, 72.0, RunState::Idle)]);
        let weather = vec![WeatherSample::new(1, 40.0)];

        assert_eq!(
            ChartView::from_history(&tstat, &weather),
            ChartView::from_history(&tstat, &weather)
        );
    }

    #[test]
    fn test_empty_history() {
        let view = ChartView::from_history(&thermostat(vec![]), &[]);
        assert_eq!(view.title, "Upstairs");
        assert_eq!(view.summary.indoor_temp, None);
        assert_eq!(view.summary.runtime_mins, 0);
        assert!(view.indoor.points.is_empty());
        assert!(view.target.points.is_empty());
        assert!(view.outdoor.points.is_empty());
        assert!(view.run_state.points.is_empty());
    }

    #[test]
    fn test_live_update_scenario() {
        let t0 = 1_700_000_000_000;
        let t1 = t0 + ASSUMED_SAMPLE_INTERVAL_MS;
        let mut view = ChartView::from_history(
            &thermostat(vec![ThermostatSample::new(t0, 70.0, 72.0, RunState::Idle)]),
            &[],
        );

        let appended = view.apply_thermostat_update(&update("A", t1, 71.0, RunState::Running)).unwrap();

        assert_eq!(appended.len(), 3);
        assert_eq!(
            view.indoor.points,
            vec![TimeSeriesPoint::new(t0, 70.0), TimeSeriesPoint::new(t1, 71.0)]
        );
        assert_eq!(view.title, "Upstairs (Running)");
        assert_eq!(view.summary.runtime_mins, 1);
        assert_eq!(view.summary.indoor_temp, Some(71.0));
        assert_eq!(view.summary.last_update_ms, Some(t1));
    }

    #[test]
    fn test_update_for_other_thermostat_is_ignored() {
        let mut view = ChartView::from_history(&thermostat(vec![]), &[]);
        let before = view.clone();

        assert!(view.apply_thermostat_update(&update("B", 10, 71.0, RunState::Running)).is_none());
        assert_eq!(view, before);
    }

    #[test]
    fn test_out_of_order_points_are_appended_as_is() {
        let mut view = ChartView::from_history(
            &thermostat(vec![ThermostatSample::new(100, 70.0, 72.0, RunState::Idle)]),
            &[],
        );

        view.apply_thermostat_update(&update("A", 50, 69.0, RunState::Idle)).unwrap();
        view.apply_thermostat_update(&update("A", 50, 69.0, RunState::Idle)).unwrap();

        let times: Vec<i64> = view.indoor.points.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![100, 50, 50]);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow_cadence_check() {
        let mut view = ChartView::from_history(
            &thermostat(vec![ThermostatSample::new(1_700_000_000_000, 70.0, 72.0, RunState::Idle)]),
            &[],
        );

        view.apply_thermostat_update(&update("A", i64::MIN, 69.0, RunState::Running)).unwrap();
        view.apply_thermostat_update(&update("A", i64::MAX, 69.5, RunState::Running)).unwrap();

        assert_eq!(view.indoor.points.len(), 3);
        assert_eq!(view.summary.last_update_ms, Some(i64::MAX));
        assert_eq!(view.summary.runtime_mins, 2);
    }

    #[test]
    fn test_thermostat_samples_follow_plotted_series() {
        let mut view = ChartView::from_history(
            &thermostat(vec![ThermostatSample::new(0, 70.0, 72.0, RunState::Idle)]),
            &[WeatherSample::new(0, 40.0)],
        );
        view.apply_thermostat_update(&update("A", 60_000, 71.0, RunState::Running)).unwrap();

        assert_eq!(
            view.thermostat_samples(),
            vec![
                ThermostatSample::new(0, 70.0, 72.0, RunState::Idle),
                ThermostatSample::new(60_000, 71.0, 72.0, RunState::Running),
            ]
        );
    }

    #[test]
    fn test_weather_sample_appends_outdoor_only() {
        let mut view = ChartView::from_history(&thermostat(vec![]), &[]);
        let appended = view.apply_weather_sample(&WeatherSample::new(5, 38.5));

        assert_eq!(appended.series, SeriesKind::Outdoor);
        assert_eq!(view.outdoor.points, vec![TimeSeriesPoint::new(5, 38.5)]);
        assert!(view.indoor.points.is_empty());
    }

    #[test]
    fn test_sync_trigger_does_not_propagate() {
        let mut view = ChartView::from_history(&thermostat(vec![]), &[]);
        let range = Some(TimeRange::new(1, 2));

        assert_eq!(view.set_visible_range(range, RangeTrigger::User), Some(range));
        assert_eq!(view.set_visible_range(None, RangeTrigger::Sync), None);
        assert_eq!(view.visible_range, None);
    }

    #[test]
    fn test_summary_serializes_raw_temperatures() {
        let view = ChartView::from_history(
            &thermostat(vec![ThermostatSample::new(1, 70.46, 72.04, RunState::Idle)]),
            &[],
        );

        let json = serde_json::to_value(&view.summary).unwrap();
        assert_eq!(json["indoorTemp"], 70.46);
        assert_eq!(json["targetTemp"], 72.04);
    }

    #[test]
    fn test_point_serializes_as_pair() {
        let json = serde_json::to_string(&TimeSeriesPoint::new(10, 70.5)).unwrap();
        assert_eq!(json, "[10,70.5]");
    }
}
