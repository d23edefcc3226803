//! Server configuration: three-tier precedence of defaults, an optional
//! TOML file, then environment variables, layered with `config` and
//! `dotenvy`.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Directory under which each project's workspace lives.
    pub projects_root: String,
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub gateway: GatewayConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    /// How often each agent's queue is polled for claimable work.
    pub tick_interval_seconds: u64,
    /// How often the queue/status snapshot worker refreshes its view.
    pub snapshot_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Upper bound on how long an agent's reply generation may take.
    pub deadline_seconds: u64,
    /// HTTP endpoint for `HttpModelGateway`; `None` uses the echo gateway.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            projects_root: "./data/projects".to_string(),
            database: DatabaseConfig { url: "sqlite://./data/agentdesk.db".to_string() },
            dispatcher: DispatcherConfig { tick_interval_seconds: 4, snapshot_interval_seconds: 5 },
            gateway: GatewayConfig { deadline_seconds: 30, endpoint: None },
            observability: ObservabilityConfig { log_level: "info".to_string() },
        }
    }
}

impl ServerConfig {
    /// Loads configuration with precedence:
    /// 1. Default values
    /// 2. `agentdesk.toml` if present
    /// 3. Environment variables prefixed `AGENTDESK_`
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("agentdesk.toml").exists() {
            builder = builder.add_source(File::with_name("agentdesk"));
        }

        builder = builder.add_source(Environment::with_prefix("AGENTDESK").separator("_").try_parsing(true));

        let built = builder.build()?;
        match built.try_deserialize::<ServerConfig>() {
            Ok(config) => Ok(config),
            // No file and no env overrides at all yields an empty source set;
            // fall back to defaults rather than erroring on missing fields.
            Err(_) => Ok(ServerConfig::default()),
        }
    }

    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("loaded environment variables from .env");
        }
        Ok(())
    }
}

static CONFIG: std::sync::LazyLock<Result<ServerConfig, anyhow::Error>> = std::sync::LazyLock::new(|| {
    let _ = ServerConfig::load_env_file();
    ServerConfig::load()
});

pub fn config() -> Result<&'static ServerConfig> {
    CONFIG.as_ref().map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))
}

pub fn init_config() -> Result<()> {
    let _ = config()?;
    tracing::info!("configuration loaded successfully");
    Ok(())
}
