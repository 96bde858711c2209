// Live chart reconciler - turns push-channel events into chart mutations
use crate::application::chart_registry::{ChartRegistry, ChartStatus};
use crate::domain::chart::{AppendedPoint, ChartSummary, TimeRange};
use crate::domain::events::LiveUpdateEvent;
use serde::Serialize;

/// One incremental redraw of one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChartMutation {
    #[serde(rename_all = "camelCase")]
    PointsAppended {
        chart_id: String,
        points: Vec<AppendedPoint>,
        title: String,
        summary: ChartSummary,
    },
    #[serde(rename_all = "camelCase")]
    RangeChanged {
        chart_id: String,
        range: Option<TimeRange>,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        chart_id: String,
        status: ChartStatus,
    },
}

impl ChartMutation {
    pub fn chart_id(&self) -> &str {
        match self {
            ChartMutation::PointsAppended { chart_id, .. }
            | ChartMutation::RangeChanged { chart_id, .. }
            | ChartMutation::StatusChanged { chart_id, .. } => chart_id,
        }
    }
}

/// Apply one event to every Ready chart of the page.
///
/// Thermostat updates reach at most the chart bound to that thermostat;
/// weather updates reach every Ready chart. Each affected chart yields
/// exactly one mutation.
pub fn reconcile(registry: &mut ChartRegistry, event: &LiveUpdateEvent) -> Vec<ChartMutation> {
    match event {
        LiveUpdateEvent::Thermostat(update) => {
            let Some(view) = registry.ready_mut(&update.thermostat_id) else {
                tracing::debug!(
                    thermostat_id = %update.thermostat_id,
                    "No ready chart for thermostat update"
                );
                return Vec::new();
            };

            match view.apply_thermostat_update(update) {
                Some(points) => vec![ChartMutation::PointsAppended {
                    chart_id: view.thermostat_id.clone(),
                    points,
                    title: view.title.clone(),
                    summary: view.summary.clone(),
                }],
                None => Vec::new(),
            }
        }
        LiveUpdateEvent::Weather(update) => registry
            .ready_charts_mut()
            .map(|view| {
                let point = view.apply_weather_sample(&update.sample);
                ChartMutation::PointsAppended {
                    chart_id: view.thermostat_id.clone(),
                    points: vec![point],
                    title: view.title.clone(),
                    summary: view.summary.clone(),
                }
            })
            .collect(),
    }
}
