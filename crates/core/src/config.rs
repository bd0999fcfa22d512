use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LEADFLOW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Tuning for the per-campaign scheduler and delay policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    /// How often each campaign worker wakes to scan for eligible prospects.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Connection-request delay window, in seconds.
    #[serde(default = "default_connection_delay_min_secs")]
    pub connection_delay_min_secs: u64,
    #[serde(default = "default_connection_delay_max_secs")]
    pub connection_delay_max_secs: u64,
    /// Follow-up baseline and jitter, in hours.
    #[serde(default = "default_followup_baseline_hours")]
    pub followup_baseline_hours: u64,
    #[serde(default = "default_followup_jitter_hours")]
    pub followup_jitter_hours: u64,
    /// Daily action cap applied to campaigns that don't set their own.
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit: u32,
    /// Fixed RNG seed for reproducible scheduling. Unset means entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_tick_interval_ms() -> u64 {
    5000
}
fn default_connection_delay_min_secs() -> u64 {
    45
}
fn default_connection_delay_max_secs() -> u64 {
    240
}
fn default_followup_baseline_hours() -> u64 {
    72
}
fn default_followup_jitter_hours() -> u64 {
    10
}
fn default_daily_limit() -> u32 {
    25
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            connection_delay_min_secs: default_connection_delay_min_secs(),
            connection_delay_max_secs: default_connection_delay_max_secs(),
            followup_baseline_hours: default_followup_baseline_hours(),
            followup_jitter_hours: default_followup_jitter_hours(),
            default_daily_limit: default_daily_limit(),
            rng_seed: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            automation: AutomationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LEADFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
