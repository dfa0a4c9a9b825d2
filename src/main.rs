//! consensus-predictor - multi-model consensus price-direction predictions
//!
//! Fetches market data for an on-chain token, asks several language models
//! for a directional call, and reduces their answers to a majority-vote
//! consensus with a BUY/SELL/HOLD recommendation. Serves the pipeline over
//! HTTP, or runs a single prediction from the command line.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, config, no usable predictions, etc.)

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod market;
mod models;
mod report;
mod resilience;
mod server;
mod service;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use agent::{ModelFanout, OpenAiProvider, ProviderConfig};
use market::{BirdeyeClient, BirdeyeConfig};
use resilience::{ResilienceConfig, ResilienceContext};
use service::{PredictRequest, PredictionService, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("consensus-predictor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.predict.clone() {
        Some(address) => run_once(&args, address).await,
        None => run_server(&args).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .consensus.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   API keys are read from BIRDEYE_API_KEY and OPENAI_API_KEY.");
    Ok(())
}

/// Initialize logging based on verbosity settings; `RUST_LOG` takes precedence.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => {
                info!("Loaded default config from {}", CONFIG_FILE);
                config
            }
            Ok(None) => {
                debug!("No config file found, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!("Failed to load config: {:#}", e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    Ok(config)
}

/// Wire the connector, provider and resilience layer into a service.
fn build_service(config: &Config) -> Arc<PredictionService> {
    let resilience = Arc::new(ResilienceContext::new(ResilienceConfig::from(
        &config.resilience,
    )));

    let market = Arc::new(BirdeyeClient::new(
        BirdeyeConfig::from(&config.market),
        Arc::clone(&resilience),
    ));

    let provider = Arc::new(OpenAiProvider::new(ProviderConfig::from(&config.models)));
    let fanout = ModelFanout::new(provider, Arc::clone(&resilience));

    Arc::new(PredictionService::new(
        market,
        fanout,
        resilience,
        ServiceConfig::from(config),
    ))
}

async fn run_server(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let sweep = match config.server.cache_sweep_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let service = build_service(&config);
    server::serve(addr, service, sweep).await
}

/// Run a single prediction and print or save the report.
async fn run_once(args: &Args, address: String) -> Result<()> {
    let config = load_config(args)?;
    let service = build_service(&config);

    eprintln!(
        "🔬 Querying {} model(s) about {} ({})...",
        config.models.ids.len(),
        address,
        args.timeframe.name()
    );

    let outcome = service
        .predict(PredictRequest {
            token_address: address,
            timeframe: args.timeframe,
            refresh: args.refresh,
            detailed: args.detailed,
        })
        .await
        .context("Prediction failed")?;
    let report = outcome.report;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("\n📊 Consensus: {}", report.consensus.reasoning);
            eprintln!(
                "   Recommendation: {} ({} risk)",
                report.recommendation.action, report.recommendation.risk
            );
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(())
}
