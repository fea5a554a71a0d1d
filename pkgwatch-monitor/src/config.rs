use pkgwatch_common::{PageKind, ServerStyle};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Http,
    File,
}

/// Where `.data.json` is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Root the page's data path is resolved against (http)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Root the page's data path is resolved against (file)
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub server_style: ServerStyle,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default)]
    pub kind: PageKind,

    #[serde(default)]
    pub mastername: Option<String>,

    /// Build name, or `latest`
    #[serde(default)]
    pub build: Option<String>,

    /// Element id the page jumps to after the first load
    #[serde(default)]
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Delay between retries while the data is not there yet
    #[serde(default = "default_first_load_interval_secs")]
    pub first_load_interval_secs: u64,

    #[serde(default = "default_max_load_attempts")]
    pub max_load_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Samples needed before a trailing rate is shown
    #[serde(default = "default_first_period_secs")]
    pub first_period_secs: u64,

    /// Window the trailing rate covers once warmed up
    #[serde(default = "default_target_period_secs")]
    pub target_period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Pixel width of the column holding the bar and its label
    #[serde(default = "default_column_width")]
    pub column_width: u32,

    /// Also write `progress.png` next to the page
    #[serde(default)]
    pub png: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub page: PageConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub rate: RateConfig,

    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_output_dir() -> String {
    "public".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_path() -> String {
    ".".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_update_interval_secs() -> u64 {
    8
}

fn default_first_load_interval_secs() -> u64 {
    2
}

fn default_max_load_attempts() -> u32 {
    8
}

fn default_first_period_secs() -> u64 {
    120
}

fn default_target_period_secs() -> u64 {
    600
}

fn default_column_width() -> u32 {
    356
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            base_url: default_base_url(),
            path: default_path(),
            server_style: ServerStyle::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            first_load_interval_secs: default_first_load_interval_secs(),
            max_load_attempts: default_max_load_attempts(),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            first_period_secs: default_first_period_secs(),
            target_period_secs: default_target_period_secs(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            column_width: default_column_width(),
            png: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            output_dir: default_output_dir(),
            source: SourceConfig::default(),
            page: PageConfig::default(),
            poll: PollConfig::default(),
            rate: RateConfig::default(),
            progress: ProgressConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: MonitorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
        Ok(config)
    }
}

pub static CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

pub fn read_config(path: &str) -> anyhow::Result<()> {
    let config = MonitorConfig::from_file(path)?;
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Configuration already loaded"))?;
    Ok(())
}
