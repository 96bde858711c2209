// Page-level chart registry and per-chart lifecycle
use crate::domain::chart::ChartView;
use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle of one chart: `Loading -> Ready | Error`.
///
/// Loading and Error keep the last view around so a reload or a failed fetch
/// shows stale data instead of an empty chart.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartState {
    Loading { stale: Option<ChartView> },
    Ready(ChartView),
    Error { message: String, stale: Option<ChartView> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartStatus {
    Loading,
    Ready,
    Error,
}

impl ChartState {
    pub fn status(&self) -> ChartStatus {
        match self {
            ChartState::Loading { .. } => ChartStatus::Loading,
            ChartState::Ready(_) => ChartStatus::Ready,
            ChartState::Error { .. } => ChartStatus::Error,
        }
    }

    /// The view to display, stale or not
    pub fn view(&self) -> Option<&ChartView> {
        match self {
            ChartState::Ready(view) => Some(view),
            ChartState::Loading { stale } | ChartState::Error { stale, .. } => stale.as_ref(),
        }
    }

    fn take_view(self) -> Option<ChartView> {
        match self {
            ChartState::Ready(view) => Some(view),
            ChartState::Loading { stale } | ChartState::Error { stale, .. } => stale,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChartRegistry {
    order: Vec<String>,
    charts: HashMap<String, ChartState>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chart in Loading state. Mounting an existing chart moves it
    /// back to Loading while keeping its current view as stale data.
    pub fn mount(&mut self, id: &str) {
        match self.charts.remove(id) {
            Some(state) => {
                self.charts.insert(id.to_string(), ChartState::Loading { stale: state.take_view() });
            }
            None => {
                self.order.push(id.to_string());
                self.charts.insert(id.to_string(), ChartState::Loading { stale: None });
            }
        }
    }

    pub fn unmount(&mut self, id: &str) -> Option<ChartState> {
        self.order.retain(|existing| existing != id);
        self.charts.remove(id)
    }

    /// Loading -> Ready. The freshly built view replaces whatever was there.
    /// Returns false when the chart is not mounted.
    pub fn on_history_loaded(&mut self, id: &str, view: ChartView) -> bool {
        match self.charts.get_mut(id) {
            Some(state) => {
                *state = ChartState::Ready(view);
                true
            }
            None => false,
        }
    }

    /// Loading -> Error, keeping the stale view if any.
    pub fn on_history_failed(&mut self, id: &str, message: String) -> bool {
        match self.charts.remove(id) {
            Some(state) => {
                let stale = state.take_view();
                self.charts.insert(id.to_string(), ChartState::Error { message, stale });
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: &str) -> Option<&ChartState> {
        self.charts.get(id)
    }

    /// Handle to a Ready chart; None for missing, loading or failed charts
    pub fn ready_mut(&mut self, id: &str) -> Option<&mut ChartView> {
        match self.charts.get_mut(id) {
            Some(ChartState::Ready(view)) => Some(view),
            _ => None,
        }
    }

    /// All Ready charts in mount order
    pub fn ready_charts_mut(&mut self) -> impl Iterator<Item = &mut ChartView> {
        let mut ready: Vec<(usize, &mut ChartView)> = self
            .charts
            .iter_mut()
            .filter_map(|(id, state)| match state {
                ChartState::Ready(view) => {
                    let position = self.order.iter().position(|o| o == id).unwrap_or(usize::MAX);
                    Some((position, view))
                }
                _ => None,
            })
            .collect();
        ready.sort_by_key(|(position, _)| *position);
        ready.into_iter().map(|(_, view)| view)
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }
}
