// GraphQL query API repository implementation
use crate::application::history_repository::{HistoryRepository, TimeWindow};
use crate::domain::location::{Location, Thermostat};
use crate::domain::sample::{deserialize_epoch_ms, RunState, ThermostatSample, WeatherSample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const LOCATION_DETAILS_QUERY: &str = r#"query locationDetails($fromTimeMs: String, $toTimeMs: String) {
  locations {
    id
    description
    weatherSamples(fromTimeMs: $fromTimeMs, toTimeMs: $toTimeMs) {
      currentTemp
      timeMs
    }
    thermostats {
      id
      name
      samples(fromTimeMs: $fromTimeMs, toTimeMs: $toTimeMs) {
        currentTemp
        override
        targetTemp
        tstate
        timeMs
      }
    }
  }
}"#;

#[derive(Debug, Clone)]
pub struct GraphQLRepository {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQLRequest<'a> {
    query: &'a str,
    operation_name: &'a str,
    variables: WindowVariables,
}

/// The schema declares both bounds as `String`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowVariables {
    from_time_ms: String,
    to_time_ms: String,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    #[serde(default)]
    data: Option<LocationsData>,
    #[serde(default)]
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LocationsData {
    #[serde(default)]
    locations: Vec<LocationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationNode {
    id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    weather_samples: Vec<WeatherNode>,
    #[serde(default)]
    thermostats: Vec<ThermostatNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherNode {
    current_temp: f64,
    #[serde(deserialize_with = "deserialize_epoch_ms")]
    time_ms: i64,
}

#[derive(Debug, Deserialize)]
struct ThermostatNode {
    id: String,
    name: String,
    #[serde(default)]
    samples: Vec<SampleNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleNode {
    current_temp: f64,
    #[serde(default, rename = "override")]
    override_flag: Option<f64>,
    target_temp: f64,
    tstate: i64,
    #[serde(deserialize_with = "deserialize_epoch_ms")]
    time_ms: i64,
}

impl GraphQLRepository {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    async fn execute_query(&self, window: TimeWindow) -> Result<Vec<LocationNode>> {
        let request = GraphQLRequest {
            query: LOCATION_DETAILS_QUERY,
            operation_name: "locationDetails",
            variables: WindowVariables {
                from_time_ms: window.from_ms.to_string(),
                to_time_ms: window.to_ms.to_string(),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to query API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Query API request failed with status {}: {}", status, body);
        }

        let body = response
            .json::<GraphQLResponse>()
            .await
            .context("Failed to parse query API response")?;

        into_locations(body)
    }
}

fn into_locations(response: GraphQLResponse) -> Result<Vec<LocationNode>> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        anyhow::bail!("Query API returned errors: {}", messages.join("; "));
    }

    response
        .data
        .map(|d| d.locations)
        .context("Query API response has no data")
}

fn to_samples(thermostat_id: &str, nodes: Vec<SampleNode>) -> Vec<ThermostatSample> {
    nodes
        .into_iter()
        .filter_map(|node| match RunState::try_from(node.tstate) {
            Ok(run_state) => Some(ThermostatSample {
                time_ms: node.time_ms,
                current_temp: node.current_temp,
                target_temp: node.target_temp,
                run_state,
                override_flag: node.override_flag,
            }),
            Err(tstate) => {
                tracing::warn!(thermostat_id, time_ms = node.time_ms, tstate, "Skipping sample with unknown tstate");
                None
            }
        })
        .collect()
}

fn to_location(node: LocationNode) -> Location {
    let thermostats = node
        .thermostats
        .into_iter()
        .map(|t| {
            let samples = to_samples(&t.id, t.samples);
            Thermostat::new(t.id, t.name, node.id.clone(), samples)
        })
        .collect();
    let weather = node
        .weather_samples
        .into_iter()
        .map(|w| WeatherSample::new(w.time_ms, w.current_temp))
        .collect();

    Location::new(node.id, node.description, thermostats, weather)
}

#[async_trait]
impl HistoryRepository for GraphQLRepository {
    async fn fetch_locations(&self, window: TimeWindow) -> Result<Vec<Location>> {
        let nodes = self.execute_query(window).await?;
        let locations: Vec<Location> = nodes.into_iter().map(to_location).collect();

        tracing::debug!(
            locations = locations.len(),
            thermostats = locations.iter().map(|l| l.thermostats.len()).sum::<usize>(),
            "Fetched location details"
        );
        Ok(locations)
    }

    async fn fetch_thermostat_samples(&self, thermostat_id: &str, window: TimeWindow) -> Result<Vec<ThermostatSample>> {
        // The schema only exposes samples nested under locations
        let nodes = self.execute_query(window).await?;
        nodes
            .into_iter()
            .flat_map(|l| l.thermostats)
            .find(|t| t.id == thermostat_id)
            .map(|t| to_samples(thermostat_id, t.samples))
            .with_context(|| format!("Thermostat {} not found in query API response", thermostat_id))
    }
}
