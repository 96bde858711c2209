// Live update events delivered over the push channel
use super::sample::{deserialize_epoch_ms, RunState, ThermostatSample, WeatherSample};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatUpdate {
    pub thermostat_id: String,
    pub sample: ThermostatSample,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherUpdate {
    pub sample: WeatherSample,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdateEvent {
    Thermostat(ThermostatUpdate),
    Weather(WeatherUpdate),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown tstate {0}")]
    UnknownRunState(i64),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SamplePayload {
    #[serde(deserialize_with = "deserialize_epoch_ms")]
    time_ms: i64,
    current_temp: f64,
    target_temp: f64,
    tstate: i64,
}

/// Thermostat updates arrive either with a nested `sample` object or, from
/// older publishers, with the sample fields inlined next to `thermostatId`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ThermostatPayload {
    #[serde(rename_all = "camelCase")]
    Nested {
        thermostat_id: String,
        sample: SamplePayload,
    },
    #[serde(rename_all = "camelCase")]
    Flat {
        thermostat_id: String,
        #[serde(deserialize_with = "deserialize_epoch_ms")]
        time: i64,
        current_temp: f64,
        target_temp: f64,
        tstate: i64,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherPayload {
    #[serde(alias = "timeMs", deserialize_with = "deserialize_epoch_ms")]
    time: i64,
    current_temp: f64,
}

impl LiveUpdateEvent {
    /// Decode a `tstat-updates` message body
    pub fn from_thermostat_payload(body: &[u8]) -> Result<Self, EventError> {
        let (thermostat_id, sample) = match serde_json::from_slice::<ThermostatPayload>(body)? {
            ThermostatPayload::Nested {
                thermostat_id,
                sample,
            } => (thermostat_id, sample),
            ThermostatPayload::Flat {
                thermostat_id,
                time,
                current_temp,
                target_temp,
                tstate,
            } => (
                thermostat_id,
                SamplePayload {
                    time_ms: time,
                    current_temp,
                    target_temp,
                    tstate,
                },
            ),
        };

        let run_state = RunState::try_from(sample.tstate).map_err(EventError::UnknownRunState)?;

        Ok(LiveUpdateEvent::Thermostat(ThermostatUpdate {
            thermostat_id,
            sample: ThermostatSample::new(
                sample.time_ms,
                sample.current_temp,
                sample.target_temp,
                run_state,
            ),
        }))
    }

    /// Decode a `weather-updates` message body
    pub fn from_weather_payload(body: &[u8]) -> Result<Self, EventError> {
        let payload: WeatherPayload = serde_json::from_slice(body)?;
        Ok(LiveUpdateEvent::Weather(WeatherUpdate {
            sample: WeatherSample::new(payload.time, payload.current_temp),
        }))
    }

    pub fn time_ms(&self) -> i64 {
        match self {
            LiveUpdateEvent::Thermostat(update) => update.sample.time_ms,
            LiveUpdateEvent::Weather(update) => update.sample.time_ms,
        }
    }
}
