//! Configuration management for the floor oracle
//!
//! Loads defaults, optional TOML/YAML files and environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the resolver wallet key
pub const RESOLVER_KEY_ENV: &str = "RESOLVER_PRIVATE_KEY";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub oracle: OracleConfig,
    pub sources: SourcesConfig,
    pub chain: ChainConfig,
    pub resolver: ResolverConfig,
    pub indexer: IndexerConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Version tag for logging and CSV
    pub tag: String,
    /// Compute decisions but never submit transactions
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Per-source request timeout in milliseconds
    pub source_timeout_ms: u64,
    /// Extra attempts per source after the first failure
    pub source_retries: usize,
    /// Collections watched by the periodic monitor
    pub watchlist: Vec<String>,
    /// Watchlist monitor interval in seconds
    pub monitor_interval_secs: u64,
}

impl OracleConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub opensea: SourceEndpoint,
    pub reservoir: SourceEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEndpoint {
    pub enabled: bool,
    pub base_url: String,
    /// Name of the env var carrying the API key (optional)
    pub api_key_env: String,
}

impl SourceEndpoint {
    /// API key from the environment, ignoring blank values
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Upper bound on the receipt wait after submission
    pub receipt_timeout_secs: u64,
    pub gas_limit: u64,
}

impl ChainConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Periodic scan interval in seconds
    pub scan_interval_secs: u64,
    /// Markets resolved in parallel during a scan
    pub max_concurrent: usize,
    /// Markets requested from the indexer per scan
    pub scan_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub graphql_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub data_dir: String,
    pub csv_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
}

impl LoggingConfig {
    /// Install the global tracing subscriber; RUST_LOG overrides `level`
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder_with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FLOOR_ORACLE__*)
            .add_source(Environment::with_prefix("FLOOR_ORACLE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Configuration with built-in defaults only
    pub fn defaults() -> Result<Self> {
        let config = Self::builder_with_defaults()?
            .build()
            .context("Failed to build default configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            .set_default("agent.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("agent.dry_run", false)?
            // Oracle defaults
            .set_default("oracle.source_timeout_ms", 10_000)?
            .set_default("oracle.source_retries", 0)?
            .set_default(
                "oracle.watchlist",
                vec![
                    "boredapeyachtclub",
                    "azuki",
                    "doodles-official",
                    "pudgypenguins",
                ],
            )?
            .set_default("oracle.monitor_interval_secs", 1800)?
            // Source defaults
            .set_default("sources.opensea.enabled", true)?
            .set_default("sources.opensea.base_url", "https://api.opensea.io/api/v2")?
            .set_default("sources.opensea.api_key_env", "OPENSEA_API_KEY")?
            .set_default("sources.reservoir.enabled", false)?
            .set_default("sources.reservoir.base_url", "https://api.reservoir.tools")?
            .set_default("sources.reservoir.api_key_env", "RESERVOIR_API_KEY")?
            // Chain defaults (Base Sepolia)
            .set_default("chain.rpc_url", "https://sepolia.base.org")?
            .set_default("chain.chain_id", 84532)?
            .set_default("chain.receipt_timeout_secs", 120)?
            .set_default("chain.gas_limit", 200_000)?
            // Resolver defaults
            .set_default("resolver.scan_interval_secs", 600)?
            .set_default("resolver.max_concurrent", 1)?
            .set_default("resolver.scan_limit", 10)?
            // Indexer defaults
            .set_default("indexer.graphql_url", "http://localhost:8080/v1/graphql")?
            .set_default("indexer.timeout_ms", 10_000)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;
        Ok(builder)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oracle.source_timeout_ms == 0 {
            bail!("oracle.source_timeout_ms must be positive");
        }
        if self.chain.receipt_timeout_secs == 0 {
            bail!("chain.receipt_timeout_secs must be positive");
        }
        if self.resolver.scan_interval_secs == 0 {
            bail!("resolver.scan_interval_secs must be positive");
        }
        if self.oracle.monitor_interval_secs == 0 {
            bail!("oracle.monitor_interval_secs must be positive");
        }
        if self.resolver.max_concurrent == 0 {
            bail!("resolver.max_concurrent must be at least 1");
        }
        if !self.sources.opensea.enabled && !self.sources.reservoir.enabled {
            bail!("At least one price source must be enabled");
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        let mut sources = Vec::new();
        if self.sources.opensea.enabled {
            sources.push("opensea");
        }
        if self.sources.reservoir.enabled {
            sources.push("reservoir");
        }
        format!(
            "agent={} dry_run={} sources={:?} chain_id={} scan={}s receipt_timeout={}s",
            self.agent.tag,
            self.agent.dry_run,
            sources,
            self.chain.chain_id,
            self.resolver.scan_interval_secs,
            self.chain.receipt_timeout_secs
        )
    }

    /// Resolver signing key from the environment, if present and well-formed
    pub fn resolver_key() -> Result<Option<String>> {
        let pk = match std::env::var(RESOLVER_KEY_ENV) {
            Ok(pk) if !pk.trim().is_empty() => pk,
            _ => return Ok(None),
        };
        validate_private_key(&pk)?;
        Ok(Some(pk))
    }
}

fn validate_private_key(pk: &str) -> Result<()> {
    if !pk.starts_with("0x") || pk.len() != 66 {
        bail!(
            "{} must be a hex string with 0x prefix (66 chars total)",
            RESOLVER_KEY_ENV
        );
    }
    Ok(())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
