use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub api: ApiSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub push: PushSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub graphql_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_end_lag_secs")]
    pub end_lag_secs: u64,
}

/// Longest history window the dashboard will request
pub const MAX_WINDOW_HOURS: u32 = 24 * 366;

impl HistorySettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_hours == 0 || self.window_hours > MAX_WINDOW_HOURS {
            anyhow::bail!(
                "history.window_hours must be between 1 and {}, got {}",
                MAX_WINDOW_HOURS,
                self.window_hours
            );
        }
        if self.end_lag_secs >= u64::from(self.window_hours) * 3600 {
            anyhow::bail!(
                "history.end_lag_secs ({}) must be shorter than the {} hour window",
                self.end_lag_secs,
                self.window_hours
            );
        }
        Ok(())
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            end_lag_secs: default_end_lag_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushSettings {
    /// Raw-WebSocket STOMP endpoint of the backend
    #[serde(default = "default_push_url")]
    pub url: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub passcode: Option<String>,
    #[serde(default)]
    pub virtual_host: Option<String>,
    #[serde(default = "default_thermostat_topic")]
    pub thermostat_topic: String,
    #[serde(default = "default_weather_topic")]
    pub weather_topic: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            login: None,
            passcode: None,
            virtual_host: None,
            thermostat_topic: default_thermostat_topic(),
            weather_topic: default_weather_topic(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    /// Buffered mutations per stream client before it starts lagging
    #[serde(default = "default_stream_buffer")]
    pub buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: default_stream_buffer(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_window_hours() -> u32 {
    72
}

fn default_end_lag_secs() -> u64 {
    60
}

fn default_push_url() -> String {
    "ws://localhost:8081/websocket/websocket".to_string()
}

fn default_thermostat_topic() -> String {
    "/topic/tstat-updates".to_string()
}

fn default_weather_topic() -> String {
    "/topic/weather-updates".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_stream_buffer() -> usize {
    256
}

/// Load `config/dashboard.*`, overridable with `THERMONITOR__SECTION__KEY`
/// environment variables.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .add_source(config::Environment::with_prefix("THERMONITOR").separator("__"))
        .build()?;

    let config: DashboardConfig = settings.try_deserialize()?;
    config.history.validate()?;
    Ok(config)
}
