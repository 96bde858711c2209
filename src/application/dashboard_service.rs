// Dashboard service - Page lifecycle, live reconciliation and range sync
use crate::application::chart_registry::{ChartRegistry, ChartState, ChartStatus};
use crate::application::history_repository::{HistoryRepository, TimeWindow};
use crate::application::live_updates::LiveUpdateSource;
use crate::application::range_sync::{synchronize, RangeChange, RangeError};
use crate::application::reconciler::{reconcile, ChartMutation};
use crate::domain::chart::ChartView;
use crate::domain::events::LiveUpdateEvent;
use crate::domain::location::{Location, Thermostat};
use crate::domain::sample::{ThermostatSample, WeatherSample};
use crate::infrastructure::config::HistorySettings;
use anyhow::Context;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PageStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
struct ThermostatEntry {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
struct LocationGroup {
    id: String,
    description: String,
    thermostats: Vec<ThermostatEntry>,
    weather_samples: Vec<WeatherSample>,
}

#[derive(Debug)]
struct PageState {
    status: PageStatus,
    error: Option<String>,
    groups: Vec<LocationGroup>,
    charts: ChartRegistry,
    /// Live events received while a chart reload is in flight, by chart id
    reloads: HashMap<String, Vec<LiveUpdateEvent>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub id: String,
    pub status: ChartStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub view: Option<ChartView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub id: String,
    pub description: String,
    pub heading: String,
    pub charts: Vec<ChartSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub locations: Vec<LocationSnapshot>,
}

#[derive(Clone)]
pub struct DashboardService {
    repository: Arc<dyn HistoryRepository>,
    settings: HistorySettings,
    page: Arc<RwLock<PageState>>,
    mutations: broadcast::Sender<ChartMutation>,
}

impl DashboardService {
    pub fn new(repository: Arc<dyn HistoryRepository>, settings: HistorySettings, stream_buffer: usize) -> Self {
        let (mutations, _) = broadcast::channel(stream_buffer.max(1));
        Self {
            repository,
            settings,
            page: Arc::new(RwLock::new(PageState {
                status: PageStatus::Loading,
                error: None,
                groups: Vec::new(),
                charts: ChartRegistry::new(),
                reloads: HashMap::new(),
            })),
            mutations,
        }
    }

    /// Two-phase start: load history, then apply live events in arrival order
    /// until the source ends.
    pub async fn run(self, source: Arc<dyn LiveUpdateSource>, buffer: usize) {
        if let Err(e) = self.load_history().await {
            tracing::error!("Initial history load failed: {:#}", e);
        }

        let (tx, mut rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            if let Err(e) = source.run(tx).await {
                tracing::error!("Live update source stopped: {:#}", e);
            }
        });

        while let Some(event) = rx.recv().await {
            self.apply_event(&event).await;
        }
        tracing::info!("Live update stream closed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChartMutation> {
        self.mutations.subscribe()
    }

    fn window(&self) -> anyhow::Result<TimeWindow> {
        TimeWindow::trailing(chrono::Utc::now(), self.settings.window_hours, self.settings.end_lag_secs).with_context(|| {
            format!(
                "History window of {} hours ending {}s ago is out of range",
                self.settings.window_hours, self.settings.end_lag_secs
            )
        })
    }

    fn publish(&self, mutations: Vec<ChartMutation>) {
        for mutation in mutations {
            tracing::trace!(chart_id = mutation.chart_id(), "Publishing mutation");
            // no subscribers is fine
            let _ = self.mutations.send(mutation);
        }
    }

    /// Fetch the whole page history and (re)seed every chart from it.
    pub async fn load_history(&self) -> anyhow::Result<()> {
        let loading = {
            let mut page = self.page.write().await;
            page.status = PageStatus::Loading;
            let ids = page.charts.ids();
            for id in &ids {
                page.charts.mount(id);
            }
            status_mutations(&ids, ChartStatus::Loading)
        };
        self.publish(loading);

        let fetched = match self.window() {
            Ok(window) => {
                tracing::info!(from_ms = window.from_ms, to_ms = window.to_ms, "Loading dashboard history");
                self.repository.fetch_locations(window).await
            }
            Err(e) => Err(e),
        };

        match fetched {
            Ok(locations) => {
                let ready = {
                    let mut page = self.page.write().await;
                    seed_page(&mut page, locations)
                };
                tracing::info!(charts = ready.len(), "Dashboard history loaded");
                self.publish(status_mutations(&ready, ChartStatus::Ready));
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!("An error occurred retrieving dashboard history: {}", message);
                let failed = {
                    let mut page = self.page.write().await;
                    page.status = PageStatus::Error;
                    page.error = Some(message.clone());
                    let ids = page.charts.ids();
                    for id in &ids {
                        page.charts.on_history_failed(id, message.clone());
                    }
                    ids
                };
                self.publish(status_mutations(&failed, ChartStatus::Error));
                Err(e)
            }
        }
    }

    /// Refetch one chart's history. Returns `None` for an unknown chart.
    ///
    /// Live points the fetch does not cover are carried over: plotted samples
    /// newer than the fetched history, and events that arrive while the fetch
    /// is in flight.
    pub async fn reload_chart(&self, chart_id: &str) -> Option<ChartStatus> {
        let (thermostat, weather, live_samples) = {
            let mut page = self.page.write().await;
            let entry = page.groups.iter().find_map(|group| {
                group.thermostats.iter().find(|t| t.id == chart_id).map(|t| {
                    (
                        Thermostat::new(t.id.clone(), t.name.clone(), group.id.clone(), Vec::new()),
                        group.weather_samples.clone(),
                    )
                })
            })?;
            let stale = page.charts.state(chart_id)?.view();
            // keep live outdoor points gathered since the page loaded
            let weather = stale.map(|v| v.weather_samples()).unwrap_or(entry.1);
            let live_samples = stale.map(|v| v.thermostat_samples()).unwrap_or_default();
            page.charts.mount(chart_id);
            page.reloads.entry(chart_id.to_string()).or_default();
            (entry.0, weather, live_samples)
        };
        self.publish(status_mutations(&[chart_id.to_string()], ChartStatus::Loading));

        let outcome = match self.window() {
            Ok(window) => self
                .repository
                .fetch_thermostat_samples(chart_id, window)
                .await
                .map(|samples| (samples, window)),
            Err(e) => Err(e),
        };

        let status = {
            let mut page = self.page.write().await;
            let buffered = page.reloads.remove(chart_id).unwrap_or_default();
            let previous_range = page.charts.state(chart_id)?.view().and_then(|v| v.visible_range);
            match outcome {
                Ok((samples, window)) => {
                    let samples = with_live_tail(samples, live_samples, window);
                    let thermostat = Thermostat { samples, ..thermostat };
                    let mut view = ChartView::from_history(&thermostat, &weather);
                    view.visible_range = previous_range;
                    let replayed = replay_buffered(&mut view, &buffered);
                    page.charts.on_history_loaded(chart_id, view);
                    tracing::info!(chart_id, replayed, "Chart history reloaded");
                    ChartStatus::Ready
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::error!(chart_id, "An error occurred reloading chart history: {}", message);
                    page.charts.on_history_failed(chart_id, message);
                    ChartStatus::Error
                }
            }
        };
        self.publish(status_mutations(&[chart_id.to_string()], status));
        Some(status)
    }

    /// Reconcile one live event and publish the resulting mutations.
    pub async fn apply_event(&self, event: &LiveUpdateEvent) -> usize {
        let mutations = {
            let mut page = self.page.write().await;
            for (chart_id, buffered) in page.reloads.iter_mut() {
                let concerns_chart = match event {
                    LiveUpdateEvent::Thermostat(update) => update.thermostat_id == *chart_id,
                    LiveUpdateEvent::Weather(_) => true,
                };
                if concerns_chart {
                    buffered.push(event.clone());
                }
            }
            reconcile(&mut page.charts, event)
        };
        tracing::debug!(time_ms = event.time_ms(), charts = mutations.len(), "Applied live update");
        let count = mutations.len();
        self.publish(mutations);
        count
    }

    pub async fn change_range(&self, change: &RangeChange) -> Result<Vec<ChartMutation>, RangeError> {
        let mutations = {
            let mut page = self.page.write().await;
            synchronize(&mut page.charts, change)?
        };
        self.publish(mutations.clone());
        Ok(mutations)
    }

    pub async fn chart(&self, chart_id: &str) -> Option<ChartSnapshot> {
        let page = self.page.read().await;
        page.charts.state(chart_id).map(|state| chart_snapshot(chart_id, state))
    }

    pub async fn snapshot(&self) -> PageSnapshot {
        let page = self.page.read().await;
        let locations = page
            .groups
            .iter()
            .map(|group| LocationSnapshot {
                id: group.id.clone(),
                description: group.description.clone(),
                heading: format!("Past {} hours at {}", self.settings.window_hours, group.description),
                charts: group
                    .thermostats
                    .iter()
                    .filter_map(|t| page.charts.state(&t.id).map(|state| chart_snapshot(&t.id, state)))
                    .collect(),
            })
            .collect();

        PageSnapshot {
            status: page.status,
            error: page.error.clone(),
            locations,
        }
    }
}

/// Replace page content with freshly fetched locations. Returns the ids of the
/// charts that are now Ready.
fn seed_page(page: &mut PageState, locations: Vec<Location>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ready = Vec::new();
    let mut groups = Vec::with_capacity(locations.len());

    for location in locations {
        for thermostat in &location.thermostats {
            if !seen.insert(thermostat.id.clone()) {
                tracing::warn!(thermostat_id = %thermostat.id, "Thermostat listed twice, keeping the first");
                continue;
            }
            let previous_range = page
                .charts
                .state(&thermostat.id)
                .and_then(|s| s.view())
                .and_then(|v| v.visible_range);
            page.charts.mount(&thermostat.id);

            let mut view = ChartView::from_history(thermostat, &location.weather_samples);
            view.visible_range = previous_range;
            page.charts.on_history_loaded(&thermostat.id, view);
            ready.push(thermostat.id.clone());
        }

        groups.push(LocationGroup {
            id: location.id,
            description: location.description,
            thermostats: location
                .thermostats
                .into_iter()
                .map(|t| ThermostatEntry { id: t.id, name: t.name })
                .collect(),
            weather_samples: location.weather_samples,
        });
    }

    for id in page.charts.ids() {
        if !seen.contains(&id) {
            tracing::info!(chart_id = %id, "Thermostat no longer listed, unmounting chart");
            page.charts.unmount(&id);
        }
    }

    page.groups = groups;
    page.status = PageStatus::Ready;
    page.error = None;
    ready
}

/// Append plotted samples newer than what the fetch returned, or newer than
/// the window end when the fetch came back empty.
fn with_live_tail(
    mut fetched: Vec<ThermostatSample>,
    live: Vec<ThermostatSample>,
    window: TimeWindow,
) -> Vec<ThermostatSample> {
    let covered_until = fetched.last().map_or(window.to_ms, |s| s.time_ms);
    fetched.extend(live.into_iter().filter(|s| s.time_ms > covered_until));
    fetched
}

/// Apply events buffered during a reload to the rebuilt view. Thermostat
/// samples already present in the view are skipped.
fn replay_buffered(view: &mut ChartView, events: &[LiveUpdateEvent]) -> usize {
    let mut replayed = 0;
    for event in events {
        match event {
            LiveUpdateEvent::Thermostat(update) => {
                if view
                    .summary
                    .last_update_ms
                    .is_some_and(|last| update.sample.time_ms <= last)
                {
                    continue;
                }
                if view.apply_thermostat_update(update).is_some() {
                    replayed += 1;
                }
            }
            LiveUpdateEvent::Weather(update) => {
                view.apply_weather_sample(&update.sample);
                replayed += 1;
            }
        }
    }
    replayed
}

fn chart_snapshot(id: &str, state: &ChartState) -> ChartSnapshot {
    ChartSnapshot {
        id: id.to_string(),
        status: state.status(),
        error: match state {
            ChartState::Error { message, .. } => Some(message.clone()),
            _ => None,
        },
        view: state.view().cloned(),
    }
}

fn status_mutations(ids: &[String], status: ChartStatus) -> Vec<ChartMutation> {
    ids.iter()
        .map(|id| ChartMutation::StatusChanged {
            chart_id: id.clone(),
            status,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chart::TimeRange;
    use crate::domain::events::{ThermostatUpdate, WeatherUpdate};
    use crate::domain::sample::{RunState, ThermostatSample};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeRepository {
        locations: Mutex<Option<Vec<Location>>>,
        samples: Mutex<Option<Vec<ThermostatSample>>>,
    }

    impl FakeRepository {
        fn new(locations: Option<Vec<Location>>) -> Self {
            Self {
                locations: Mutex::new(locations),
                samples: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HistoryRepository for FakeRepository {
        async fn fetch_locations(&self, _window: TimeWindow) -> anyhow::Result<Vec<Location>> {
            self.locations
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("query API unreachable"))
        }

        async fn fetch_thermostat_samples(
            &self,
            _thermostat_id: &str,
            _window: TimeWindow,
        ) -> anyhow::Result<Vec<ThermostatSample>> {
            self.samples
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("query API unreachable"))
        }
    }

    fn location() -> Location {
        let tstats = ["A", "B"]
            .iter()
            .map(|id| {
                Thermostat::new(
                    id.to_string(),
                    format!("Thermostat {}", id),
                    "loc-1".to_string(),
                    vec![ThermostatSample::new(0, 70.0, 72.0, RunState::Idle)],
                )
            })
            .collect();
        Location::new(
            "loc-1".to_string(),
            "Home".to_string(),
            tstats,
            vec![WeatherSample::new(0, 35.0)],
        )
    }

    fn service(repository: FakeRepository) -> DashboardService {
        DashboardService::new(
            Arc::new(repository),
            HistorySettings {
                window_hours: 72,
                end_lag_secs: 60,
            },
            16,
        )
    }

    #[tokio::test]
    async fn test_load_history_seeds_page() {
        let service = service(FakeRepository::new(Some(vec![location()])));
        service.load_history().await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.status, PageStatus::Ready);
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].heading, "Past 72 hours at Home");
        let charts = &snapshot.locations[0].charts;
        assert_eq!(charts.len(), 2);
        assert!(charts.iter().all(|c| c.status == ChartStatus::Ready));
        assert_eq!(charts[0].view.as_ref().unwrap().outdoor.points.len(), 1);
    }

    #[tokio::test]
    async fn test_replaying_history_does_not_duplicate() {
        let service = service(FakeRepository::new(Some(vec![location()])));
        service.load_history().await.unwrap();
        let first = service.chart("A").await.unwrap().view;

        service.load_history().await.unwrap();
        let second = service.chart("A").await.unwrap().view;

        assert_eq!(first, second);
        assert_eq!(second.unwrap().indoor.points.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_history_marks_page_error() {
        let service = service(FakeRepository::new(None));

        assert!(service.load_history().await.is_err());
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.status, PageStatus::Error);
        assert!(snapshot.error.unwrap().contains("unreachable"));
        assert!(snapshot.locations.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_stale_charts() {
        let repository = FakeRepository::new(Some(vec![location()]));
        let service = service(repository);
        service.load_history().await.unwrap();

        let status = service.reload_chart("A").await;
        assert_eq!(status, Some(ChartStatus::Error));
        let chart = service.chart("A").await.unwrap();
        assert_eq!(chart.status, ChartStatus::Error);
        assert!(chart.view.is_some());

        assert_eq!(service.reload_chart("nope").await, None);
    }

    #[tokio::test]
    async fn test_reload_keeps_live_weather_and_range() {
        let repository = FakeRepository::new(Some(vec![location()]));
        *repository.samples.lock().unwrap() = Some(vec![
            ThermostatSample::new(0, 70.0, 72.0, RunState::Idle),
            ThermostatSample::new(60_000, 70.5, 72.0, RunState::Running),
        ]);
        let service = service(repository);
        service.load_history().await.unwrap();
        service
            .apply_event(&LiveUpdateEvent::Weather(WeatherUpdate {
                sample: WeatherSample::new(60_000, 34.0),
            }))
            .await;
        service
            .change_range(&RangeChange::user("B".to_string(), Some(TimeRange::new(0, 10))))
            .await
            .unwrap();

        assert_eq!(service.reload_chart("A").await, Some(ChartStatus::Ready));

        let view = service.chart("A").await.unwrap().view.unwrap();
        assert_eq!(view.indoor.points.len(), 2);
        assert_eq!(view.outdoor.points.len(), 2);
        assert_eq!(view.summary.runtime_mins, 1);
        assert_eq!(view.visible_range, Some(TimeRange::new(0, 10)));
    }

    /// Holds `fetch_thermostat_samples` until released
    struct GatedRepository {
        inner: FakeRepository,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl HistoryRepository for GatedRepository {
        async fn fetch_locations(&self, window: TimeWindow) -> anyhow::Result<Vec<Location>> {
            self.inner.fetch_locations(window).await
        }

        async fn fetch_thermostat_samples(
            &self,
            thermostat_id: &str,
            window: TimeWindow,
        ) -> anyhow::Result<Vec<ThermostatSample>> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.fetch_thermostat_samples(thermostat_id, window).await
        }
    }

    #[tokio::test]
    async fn test_events_during_reload_reach_the_rebuilt_chart() {
        let inner = FakeRepository::new(Some(vec![location()]));
        *inner.samples.lock().unwrap() = Some(vec![
            ThermostatSample::new(0, 70.0, 72.0, RunState::Idle),
            ThermostatSample::new(60_000, 70.5, 72.0, RunState::Idle),
        ]);
        let repository = Arc::new(GatedRepository {
            inner,
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let service = DashboardService::new(
            repository.clone(),
            HistorySettings {
                window_hours: 72,
                end_lag_secs: 60,
            },
            16,
        );
        service.load_history().await.unwrap();

        let reload = tokio::spawn({
            let service = service.clone();
            async move { service.reload_chart("A").await }
        });
        repository.entered.notified().await;
        assert_eq!(service.chart("A").await.unwrap().status, ChartStatus::Loading);

        service
            .apply_event(&LiveUpdateEvent::Weather(WeatherUpdate {
                sample: WeatherSample::new(90_000, 34.0),
            }))
            .await;
        service
            .apply_event(&LiveUpdateEvent::Thermostat(ThermostatUpdate {
                thermostat_id: "A".to_string(),
                sample: ThermostatSample::new(120_000, 71.0, 72.0, RunState::Running),
            }))
            .await;
        // already part of the fetched history
        service
            .apply_event(&LiveUpdateEvent::Thermostat(ThermostatUpdate {
                thermostat_id: "A".to_string(),
                sample: ThermostatSample::new(60_000, 70.5, 72.0, RunState::Idle),
            }))
            .await;
        repository.release.notify_one();

        assert_eq!(reload.await.unwrap(), Some(ChartStatus::Ready));
        let a = service.chart("A").await.unwrap().view.unwrap();
        let b = service.chart("B").await.unwrap().view.unwrap();
        assert_eq!(a.outdoor.points, b.outdoor.points);
        let times: Vec<i64> = a.indoor.points.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![0, 60_000, 120_000]);
        assert_eq!(a.title, "Thermostat A (Running)");
        assert_eq!(a.summary.runtime_mins, 1);
    }

    #[tokio::test]
    async fn test_reload_keeps_live_points_newer_than_fetched_history() {
        let repository = FakeRepository::new(Some(vec![location()]));
        *repository.samples.lock().unwrap() = Some(vec![
            ThermostatSample::new(0, 70.0, 72.0, RunState::Idle),
            ThermostatSample::new(60_000, 70.5, 72.0, RunState::Idle),
        ]);
        let service = service(repository);
        service.load_history().await.unwrap();
        for time_ms in [60_000, 120_000] {
            service
                .apply_event(&LiveUpdateEvent::Thermostat(ThermostatUpdate {
                    thermostat_id: "A".to_string(),
                    sample: ThermostatSample::new(time_ms, 70.5, 72.0, RunState::Running),
                }))
                .await;
        }

        assert_eq!(service.reload_chart("A").await, Some(ChartStatus::Ready));

        let view = service.chart("A").await.unwrap().view.unwrap();
        let times: Vec<i64> = view.indoor.points.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![0, 60_000, 120_000]);
        assert_eq!(view.summary.running, Some(true));
    }

    #[tokio::test]
    async fn test_out_of_range_window_fails_the_load() {
        let service = DashboardService::new(
            Arc::new(FakeRepository::new(Some(vec![location()]))),
            HistorySettings {
                window_hours: u32::MAX,
                end_lag_secs: 60,
            },
            16,
        );

        assert!(service.load_history().await.is_err());
        assert_eq!(service.snapshot().await.status, PageStatus::Error);
    }

    #[tokio::test]
    async fn test_events_are_published_to_subscribers() {
        let service = service(FakeRepository::new(Some(vec![location()])));
        service.load_history().await.unwrap();
        let mut rx = service.subscribe();

        let applied = service
            .apply_event(&LiveUpdateEvent::Thermostat(ThermostatUpdate {
                thermostat_id: "B".to_string(),
                sample: ThermostatSample::new(60_000, 71.0, 72.0, RunState::Running),
            }))
            .await;

        assert_eq!(applied, 1);
        match rx.recv().await.unwrap() {
            ChartMutation::PointsAppended { chart_id, title, .. } => {
                assert_eq!(chart_id, "B");
                assert_eq!(title, "Thermostat B (Running)");
            }
            other => panic!("unexpected mutation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_loads_history_before_live_events() {
        struct OneShot;

        #[async_trait]
        impl LiveUpdateSource for OneShot {
            async fn run(&self, tx: mpsc::Sender<LiveUpdateEvent>) -> anyhow::Result<()> {
                tx.send(LiveUpdateEvent::Thermostat(ThermostatUpdate {
                    thermostat_id: "A".to_string(),
                    sample: ThermostatSample::new(60_000, 71.0, 72.0, RunState::Idle),
                }))
                .await?;
                Ok(())
            }
        }

        let service = service(FakeRepository::new(Some(vec![location()])));
        service.clone().run(Arc::new(OneShot), 4).await;

        let view = service.chart("A").await.unwrap().view.unwrap();
        assert_eq!(view.indoor.points.len(), 2);
    }
}
