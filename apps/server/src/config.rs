use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

/// Process settings read from `VANTAGE_*` environment variables (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// SQLite file for the persistent cache tier. `None` runs memory-only.
    pub db_path: Option<String>,
    /// JSON array of HTTP provider definitions.
    pub providers_file: Option<String>,
    pub catalog_file: Option<String>,
    pub engine_config_file: Option<String>,
    /// JSON array replacing the built-in recommendation rules.
    pub rules_file: Option<String>,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub l1_capacity: Option<usize>,
    pub max_global_calls: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: Some("./db/vantage.db".to_string()),
            providers_file: None,
            catalog_file: None,
            engine_config_file: None,
            rules_file: None,
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_millis(30_000),
            l1_capacity: None,
            max_global_calls: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match var("VANTAGE_LISTEN_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid VANTAGE_LISTEN_ADDR '{}'", raw))?,
            None => defaults.listen_addr,
        };
        // An empty value disables the persistent tier.
        let db_path = match std::env::var("VANTAGE_DB_PATH") {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => Some(raw),
            Err(_) => defaults.db_path,
        };
        let cors_allow = var("VANTAGE_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = var("VANTAGE_REQUEST_TIMEOUT_MS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(30_000);

        Ok(Self {
            listen_addr,
            db_path,
            providers_file: var("VANTAGE_PROVIDERS_FILE"),
            catalog_file: var("VANTAGE_CATALOG_FILE"),
            engine_config_file: var("VANTAGE_ENGINE_CONFIG"),
            rules_file: var("VANTAGE_RULES_FILE"),
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            l1_capacity: parse_var("VANTAGE_L1_CAPACITY")?,
            max_global_calls: parse_var("VANTAGE_MAX_GLOBAL_CALLS")?,
        })
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var(name: &str) -> anyhow::Result<Option<usize>> {
    var(name)
        .map(|raw| {
            raw.parse::<usize>()
                .with_context(|| format!("Invalid {} '{}'", name, raw))
        })
        .transpose()
}
