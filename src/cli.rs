//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::market::validate_address;
use crate::models::Timeframe;

/// consensus-predictor - multi-model price-direction predictions
///
/// Queries several language models about a token's market data and
/// combines their answers into one majority-vote consensus with a
/// BUY/SELL/HOLD recommendation. Runs as an HTTP service by default.
///
/// Examples:
///   consensus-predictor --port 8080
///   consensus-predictor --predict So11111111111111111111111111111111111111112
///   consensus-predictor --predict <ADDRESS> --timeframe 4h --detailed --format json
///   consensus-predictor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Run one prediction for this token address and exit
    ///
    /// Without this flag the HTTP server is started.
    #[arg(short, long, value_name = "ADDRESS")]
    pub predict: Option<String>,

    /// Prediction horizon for --predict (1h, 4h, 24h, 7d)
    #[arg(short, long, default_value = "24h", value_name = "TIMEFRAME")]
    pub timeframe: Timeframe,

    /// Ask models for risk factors and technical-indicator commentary
    #[arg(long)]
    pub detailed: bool,

    /// Ignore any cached prediction
    #[arg(long)]
    pub refresh: bool,

    /// Output format for --predict (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the --predict report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long, value_name = "HOST", env = "CONSENSUS_HOST")]
    pub host: Option<String>,

    /// Port for the HTTP server
    #[arg(long, value_name = "PORT", env = "CONSENSUS_PORT")]
    pub port: Option<u16>,

    /// Market-data API key
    #[arg(long, value_name = "KEY", env = "BIRDEYE_API_KEY", hide_env_values = true)]
    pub market_api_key: Option<String>,

    /// Market-data API base URL
    #[arg(long, value_name = "URL")]
    pub market_url: Option<String>,

    /// Language-model API key
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, value_name = "URL", env = "LLM_BASE_URL")]
    pub llm_url: Option<String>,

    /// Models to query (comma-separated)
    ///
    /// Example: --models gpt-4o,gpt-4o-mini
    #[arg(short, long, value_name = "IDS", value_delimiter = ',')]
    pub models: Option<Vec<String>>,

    /// Temperature for model replies (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Per-call timeout in seconds for model requests
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .consensus.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .consensus.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref address) = self.predict {
            validate_address(address).map_err(|e| e.to_string())?;
        } else if self.output.is_some() {
            return Err("--output only applies together with --predict".to_string());
        }

        for url in [&self.market_url, &self.llm_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if let Some(ref models) = self.models {
            if models.iter().all(|m| m.trim().is_empty()) {
                return Err("--models must name at least one model".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
