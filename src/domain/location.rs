// Location and thermostat domain models
use super::sample::{ThermostatSample, WeatherSample};

#[derive(Debug, Clone, PartialEq)]
pub struct Thermostat {
    pub id: String,
    pub name: String,
    pub location_id: String,
    pub samples: Vec<ThermostatSample>,
}

impl Thermostat {
    pub fn new(id: String, name: String, location_id: String, samples: Vec<ThermostatSample>) -> Self {
        Self {
            id,
            name,
            location_id,
            samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: String,
    pub description: String,
    pub thermostats: Vec<Thermostat>,
    pub weather_samples: Vec<WeatherSample>,
}

impl Location {
    pub fn new(
        id: String,
        description: String,
        thermostats: Vec<Thermostat>,
        weather_samples: Vec<WeatherSample>,
    ) -> Self {
        Self {
            id,
            description,
            thermostats,
            weather_samples,
        }
    }
}
