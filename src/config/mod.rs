//! Configuration management for rtc-signaling

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Peer connection options
    #[serde(default)]
    pub rtc: RtcConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix of the relay endpoint, peers connect to `{path}/{peer_id}`
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Options applied to every peer connection a factory creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RtcConfig {
    /// ICE servers
    #[serde(default)]
    pub ice_servers: Vec<IceServerConfig>,

    /// Data channels created on each connection before it offers
    #[serde(default)]
    pub data_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.validate_server()?;
        self.validate_rtc()
    }

    /// Validate the `[server]` section
    pub fn validate_server(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.port == 0 {
            return Err("Server port must be non-zero".into());
        }

        if !self.server.path.starts_with('/') {
            return Err("Server path must start with '/'".into());
        }

        Ok(())
    }

    /// Validate the `[rtc]` section
    pub fn validate_rtc(&self) -> Result<(), Box<dyn std::error::Error>> {
        for server in &self.rtc.ice_servers {
            if server.urls.is_empty() {
                return Err("ICE server entries need at least one URL".into());
            }
            for url in &server.urls {
                let scheme = url.split(':').next().unwrap_or_default();
                if !matches!(scheme, "stun" | "stuns" | "turn" | "turns") {
                    return Err(format!("Unsupported ICE server URL: {}", url).into());
                }
                if scheme.starts_with("turn") && (server.username.is_none() || server.credential.is_none()) {
                    return Err(format!("TURN server {} needs username and credential", url).into());
                }
            }
        }

        if self.rtc.data_channels.iter().any(|label| label.is_empty()) {
            return Err("Data channel labels must be non-empty".into());
        }

        Ok(())
    }
}


fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8010
}

fn default_path() -> String {
    "/signal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
