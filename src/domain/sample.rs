// Telemetry sample domain models
use serde::{Deserialize, Deserializer, Serialize};

/// Thermostat run-state flag as reported by `tstate`: 0 idle, 1 running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == RunState::Running
    }

    /// Numeric value plotted on the runtime series
    pub fn as_value(self) -> f64 {
        match self {
            RunState::Idle => 0.0,
            RunState::Running => 1.0,
        }
    }
}

impl TryFrom<i64> for RunState {
    type Error = i64;

    fn try_from(tstate: i64) -> Result<Self, Self::Error> {
        match tstate {
            0 => Ok(RunState::Idle),
            1 => Ok(RunState::Running),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatSample {
    pub time_ms: i64,
    pub current_temp: f64,
    pub target_temp: f64,
    pub run_state: RunState,
    #[serde(rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_flag: Option<f64>,
}

impl ThermostatSample {
    pub fn new(time_ms: i64, current_temp: f64, target_temp: f64, run_state: RunState) -> Self {
        Self {
            time_ms,
            current_temp,
            target_temp,
            run_state,
            override_flag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSample {
    pub time_ms: i64,
    pub current_temp: f64,
}

impl WeatherSample {
    pub fn new(time_ms: i64, current_temp: f64) -> Self {
        Self {
            time_ms,
            current_temp,
        }
    }
}

/// Accept epoch milliseconds either as a JSON number or as a numeric string.
///
/// The query API declares its time arguments as `String`, and some servers echo
/// `timeMs` back in the same form.
pub fn deserialize_epoch_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EpochMs {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match EpochMs::deserialize(deserializer)? {
        EpochMs::Int(ms) => Ok(ms),
        EpochMs::Float(ms) if ms.is_finite() => Ok(ms as i64),
        EpochMs::Float(ms) => Err(serde::de::Error::custom(format!(
            "invalid epoch milliseconds: {}",
            ms
        ))),
        EpochMs::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid epoch milliseconds: {:?}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Stamped {
        #[serde(deserialize_with = "deserialize_epoch_ms")]
        time: i64,
    }

    #[test]
    fn test_run_state_from_tstate() {
        assert_eq!(RunState::try_from(0), Ok(RunState::Idle));
        assert_eq!(RunState::try_from(1), Ok(RunState::Running));
        assert_eq!(RunState::try_from(2), Err(2));
        assert_eq!(RunState::Running.as_value(), 1.0);
        assert!(!RunState::Idle.is_running());
    }

    #[test]
    fn test_epoch_ms_accepts_numbers_and_strings() {
        let from_int: Stamped = serde_json::from_str(r#"{"time": 1700000000000}"#).unwrap();
        assert_eq!(from_int.time, 1_700_000_000_000);

        let from_float: Stamped = serde_json::from_str(r#"{"time": 1700000000000.0}"#).unwrap();
        assert_eq!(from_float.time, 1_700_000_000_000);

        let from_text: Stamped = serde_json::from_str(r#"{"time": "1700000000000"}"#).unwrap();
        assert_eq!(from_text.time, 1_700_000_000_000);

        assert!(serde_json::from_str::<Stamped>(r#"{"time": "yesterday"}"#).is_err());
    }

    #[test]
    fn test_sample_serializes_override_only_when_present() {
        let mut sample = ThermostatSample::new(1, 70.0, 72.0, RunState::Idle);
        let json = serde_json::to_value(&sample).unwrap();
        assert!(json.get("override").is_none());
        assert_eq!(json["runState"], "idle");

        sample.override_flag = Some(1.0);
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["override"], 1.0);
    }
}
