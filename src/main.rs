//! floor-oracle binary
//!
//! `run` starts the resolution scheduler and the watchlist monitor; the other
//! subcommands answer a single request and print the response as JSON.
//! `analyze` and `portfolio` are advisory and never touch the chain.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use floor_oracle::agent::{PriceRequest, ResolveMarketRequest, ResolverAgent};
use floor_oracle::analyst::{AnalyzeMarketRequest, MarketAnalyst};
use floor_oracle::chain::{EthersMarketGateway, MarketGateway};
use floor_oracle::config::AppConfig;
use floor_oracle::indexer::IndexerClient;
use floor_oracle::oracle::{sources, OracleService};
use floor_oracle::persistence::CsvPersistence;
use floor_oracle::portfolio::{PortfolioAdvisor, PortfolioAnalysisRequest};
use floor_oracle::resolver::ResolutionEngine;
use floor_oracle::scheduler::{ResolutionScheduler, WatchlistMonitor};
use floor_oracle::settlement::SettlementSubmitter;

/// Floor Oracle - NFT floor price consensus and market resolution
#[derive(Parser, Debug)]
#[command(name = "floor-oracle")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the resolution scheduler and watchlist monitor until ctrl-c
    Run,

    /// Fetch the consensus floor price for one collection
    Price {
        /// Collection slug, e.g. "azuki"
        slug: String,
        /// Accept a single-source price without flagging it
        #[arg(long)]
        no_consensus: bool,
    },

    /// Attempt to resolve one market now
    Resolve {
        /// Market contract address
        market: String,
    },

    /// Read crowd sentiment for a market and project its floor
    Analyze {
        /// Market contract address
        market: String,
        /// Collection slug the market tracks
        slug: String,
        /// Skip the price projection
        #[arg(long)]
        no_prediction: bool,
    },

    /// Score a trader's positions and suggest adjustments
    Portfolio {
        /// Trader wallet address
        user: String,
        /// Only report totals and the risk score
        #[arg(long)]
        no_recommendations: bool,
    },

    /// Print the effective configuration digest
    Config,
}

struct Components {
    oracle: Arc<OracleService>,
    engine: Arc<ResolutionEngine>,
    persistence: Option<Arc<CsvPersistence>>,
}

fn build(config: &AppConfig) -> Result<Components> {
    let persistence = if config.persistence.csv_enabled {
        let persistence = CsvPersistence::new(&config.persistence.data_dir)
            .context("Failed to open CSV persistence")?
            .with_tag(&config.agent.tag);
        Some(Arc::new(persistence))
    } else {
        None
    };

    let oracle = build_oracle(config);

    let key = AppConfig::resolver_key()?;
    if key.is_none() && !config.agent.dry_run {
        warn!("No resolver key configured; markets can be read but not resolved");
    }
    let gateway: Arc<dyn MarketGateway> =
        Arc::new(EthersMarketGateway::connect(&config.chain, key.as_deref())?);

    let submitter = SettlementSubmitter::new(gateway.clone(), config.chain.receipt_timeout());
    let mut engine = ResolutionEngine::new(oracle.clone(), gateway, submitter, config.agent.dry_run);
    if let Some(persistence) = &persistence {
        engine = engine.with_persistence(persistence.clone());
    }

    Ok(Components {
        oracle,
        engine: Arc::new(engine),
        persistence,
    })
}

fn build_oracle(config: &AppConfig) -> Arc<OracleService> {
    let price_sources = sources::from_config(&config.sources, &config.oracle);
    Arc::new(OracleService::from_config(price_sources, &config.oracle))
}

fn price_request(slug: String, no_consensus: bool) -> PriceRequest {
    PriceRequest {
        collection_slug: slug,
        require_consensus: !no_consensus,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let components = build(&config)?;
    let directory = Arc::new(IndexerClient::new(&config.indexer)?);

    let scheduler = ResolutionScheduler::new(components.engine.clone(), directory, &config.resolver);
    let mut monitor = WatchlistMonitor::new(components.oracle.clone(), &config.oracle);
    if let Some(persistence) = &components.persistence {
        monitor = monitor.with_persistence(persistence.clone());
    }

    info!("🚀 Floor oracle running");
    tokio::join!(
        scheduler.run(shutdown_signal()),
        monitor.run(shutdown_signal())
    );
    info!("Floor oracle stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    config.logging.init();
    info!(config = %config, "Configuration loaded");

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Price { slug, no_consensus } => {
            let components = build(&config)?;
            let request = price_request(slug, no_consensus);
            let response = components
                .oracle
                .handle_price_request(&request)
                .await
                .with_context(|| format!("No price data for {}", request.collection_slug))?;
            print_json(&response)?;
        }
        Commands::Resolve { market } => {
            let components = build(&config)?;
            let agent = ResolverAgent::new(components.engine);
            let response = agent
                .handle_resolve_request(&ResolveMarketRequest { market_id: market })
                .await;
            print_json(&response)?;
        }
        Commands::Analyze {
            market,
            slug,
            no_prediction,
        } => {
            let feed = Arc::new(IndexerClient::new(&config.indexer)?);
            let analyst = MarketAnalyst::new(build_oracle(&config), feed);
            let response = analyst
                .handle_analysis_request(&AnalyzeMarketRequest {
                    market_id: market,
                    collection_slug: slug,
                    include_prediction: !no_prediction,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Portfolio {
            user,
            no_recommendations,
        } => {
            let advisor = PortfolioAdvisor::new(Arc::new(IndexerClient::new(&config.indexer)?));
            let response = advisor
                .handle_analysis_request(&PortfolioAnalysisRequest {
                    user_address: user,
                    include_recommendations: !no_recommendations,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Config => println!("{}", config.digest()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_price(args: &[&str]) -> PriceRequest {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Price { slug, no_consensus } => price_request(slug, no_consensus),
            other => panic!("expected price command, got {:?}", other),
        }
    }

    #[test]
    fn test_price_requires_consensus_by_default() {
        let request = parse_price(&["floor-oracle", "price", "azuki"]);
        assert_eq!(request.collection_slug, "azuki");
        assert!(request.require_consensus);
    }

    #[test]
    fn test_no_consensus_flag() {
        let request = parse_price(&["floor-oracle", "price", "azuki", "--no-consensus"]);
        assert!(!request.require_consensus);
    }

    #[test]
    fn test_advisory_commands_parse() {
        let cli = Cli::try_parse_from(["floor-oracle", "analyze", "0xaa", "azuki"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Analyze { ref slug, no_prediction: false, .. } if slug == "azuki"
        ));

        let cli =
            Cli::try_parse_from(["floor-oracle", "portfolio", "0xb0b", "--no-recommendations"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Portfolio { no_recommendations: true, .. }
        ));
    }
}
