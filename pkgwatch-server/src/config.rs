use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port to bind the server to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to bind to all interfaces (0.0.0.0) or just localhost
    #[serde(default = "default_bind_all")]
    pub bind_all: bool,

    /// Directory the monitor writes its pages to, served at `/`
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Producer's data directory (`.data.json` and build logs), served at `/data`
    #[serde(default)]
    pub data_directory: Option<String>,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_all() -> bool {
    false
}

fn default_output_directory() -> String {
    "public".to_string()
}

fn default_enable_cors() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_all: default_bind_all(),
            output_directory: default_output_directory(),
            data_directory: None,
            enable_cors: default_enable_cors(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    pub fn bind_address(&self) -> SocketAddr {
        let ip = if self.bind_all {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        SocketAddr::new(ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_honours_bind_all() {
        let config: Config = toml::from_str("port = 9000").unwrap();
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:9000");
        let config: Config = toml::from_str("port = 9000\nbind_all = true").unwrap();
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.output_directory, "public");
        assert!(config.data_directory.is_none());
        assert!(config.enable_cors);
    }
}
