use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use vantage_engine::provider::{load_provider_configs, HttpJsonProvider};
use vantage_engine::scoring::load_rules;
use vantage_engine::{AnalysisEngine, AnalysisProvider, CapabilityCatalog, EngineConfig};
use vantage_storage_sqlite::SqliteCacheStore;

use crate::config::Config;

/// Time left between the engine's deadline and the HTTP timeout, so a
/// best-effort result can still be serialized and sent.
pub const RESPONSE_MARGIN: Duration = Duration::from_millis(500);

pub struct AppState {
    pub engine: AnalysisEngine,
}

impl AppState {
    pub fn new(engine: AnalysisEngine) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("VANTAGE_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Build the single engine instance for this process, with the providers
/// named in the providers file.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let providers = match &config.providers_file {
        Some(path) => load_providers(path)?,
        None => {
            tracing::warn!("VANTAGE_PROVIDERS_FILE not set; every analysis will be rejected");
            Vec::new()
        }
    };
    build_state_with_providers(config, providers).await
}

/// Build the engine around an explicit provider set.
pub async fn build_state_with_providers(
    config: &Config,
    providers: Vec<Arc<dyn AnalysisProvider>>,
) -> anyhow::Result<Arc<AppState>> {
    let mut engine_config = match &config.engine_config_file {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load engine config from {}", path))?,
        None => EngineConfig::default(),
    };
    if let Some(capacity) = config.l1_capacity {
        engine_config.l1_capacity = capacity;
    }
    if let Some(max) = config.max_global_calls {
        engine_config.max_global_calls = max;
    }
    fit_deadline_to_timeout(&mut engine_config, config.request_timeout)?;

    let catalog = match &config.catalog_file {
        Some(path) => CapabilityCatalog::from_json_file(path)
            .with_context(|| format!("Failed to load capability catalog from {}", path))?,
        None => CapabilityCatalog::default(),
    };

    let mut builder = AnalysisEngine::builder()
        .config(engine_config)
        .catalog(catalog)
        .providers(providers);

    if let Some(path) = &config.rules_file {
        let rules = load_rules(path)
            .with_context(|| format!("Failed to load recommendation rules from {}", path))?;
        tracing::info!("Loaded {} recommendation rules from {}", rules.len(), path);
        builder = builder.rules(rules);
    }

    if let Some(db_path) = &config.db_path {
        let store = SqliteCacheStore::open(db_path)
            .with_context(|| format!("Failed to open cache database at {}", db_path))?;
        tracing::info!("Persistent cache tier at {}", db_path);
        builder = builder.persistent_store(Arc::new(store));
    } else {
        tracing::info!("Persistent cache tier disabled");
    }

    let engine = builder.build()?;
    // The sweeper lives as long as the engine's cache.
    let _sweeper = engine.spawn_sweeper();

    Ok(AppState::new(engine))
}

/// Keep the engine's request deadline inside the HTTP request timeout.
pub fn fit_deadline_to_timeout(
    engine_config: &mut EngineConfig,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let budget = request_timeout.saturating_sub(RESPONSE_MARGIN);
    if budget.is_zero() {
        anyhow::bail!(
            "VANTAGE_REQUEST_TIMEOUT_MS must be longer than {} ms",
            RESPONSE_MARGIN.as_millis()
        );
    }
    if engine_config.request_deadline() > budget {
        tracing::warn!(
            "Engine request deadline {} ms lowered to {} ms to fit the HTTP timeout",
            engine_config.request_deadline_ms,
            budget.as_millis()
        );
        engine_config.request_deadline_ms = budget.as_millis() as u64;
    }
    Ok(())
}

fn load_providers(path: &str) -> anyhow::Result<Vec<Arc<dyn AnalysisProvider>>> {
    let configs = load_provider_configs(path)
        .with_context(|| format!("Failed to load providers from {}", path))?;

    let mut providers: Vec<Arc<dyn AnalysisProvider>> = Vec::with_capacity(configs.len());
    for provider_config in configs {
        let name = provider_config.name.clone();
        let provider = HttpJsonProvider::new(provider_config)
            .with_context(|| format!("Failed to build provider '{}'", name))?;
        if !provider.is_available() {
            tracing::warn!("Provider '{}' has no credentials and will be skipped", name);
        }
        providers.push(Arc::new(provider));
    }
    tracing::info!("Loaded {} providers from {}", providers.len(), path);
    Ok(providers)
}
