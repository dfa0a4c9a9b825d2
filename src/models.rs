//! Data models for the consensus predictor.
//!
//! This module contains the core data structures shared by the market
//! connector, the model fan-out, the aggregator and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Predicted price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Sideways,
}

impl Direction {
    /// Normalise a free-form direction string from a model reply.
    ///
    /// Anything that is not UP or DOWN (case-insensitive) becomes SIDEWAYS.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "UP" => Direction::Up,
            "DOWN" => Direction::Down,
            _ => Direction::Sideways,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Point-in-time market data for a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub volume_24h: f64,
    pub price_change_24h_pct: f64,
    pub liquidity: f64,
    pub holders: u64,
}

/// A token as listed by search or trending endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListing {
    pub address: String,
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

/// A single (unix seconds, close price) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: i64,
    pub price: f64,
}

/// Coarse trend label derived from the overall price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StronglyBullish,
    Bullish,
    Neutral,
    Bearish,
    StronglyBearish,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::StronglyBullish => "strongly bullish",
            Trend::Bullish => "bullish",
            Trend::Neutral => "neutral",
            Trend::Bearish => "bearish",
            Trend::StronglyBearish => "strongly bearish",
        };
        write!(f, "{}", label)
    }
}

/// Volatility label derived from consecutive-sample price moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

impl fmt::Display for Volatility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Volatility::Low => write!(f, "low"),
            Volatility::Medium => write!(f, "medium"),
            Volatility::High => write!(f, "high"),
        }
    }
}

/// Summary of a price history window. Computed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSummary {
    pub trend: Trend,
    pub volatility: Volatility,
    pub price_change_pct: f64,
    pub points: Vec<PricePoint>,
}

/// One model's answer to the analysis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrediction {
    pub model: String,
    pub direction: Direction,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    /// Detailed mode only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<String>,
    /// Detailed mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_indicators: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Majority-vote consensus over all successful model replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub direction: Direction,
    /// Mean confidence of the majority-aligned models, 0-100.
    pub confidence: u8,
    /// Percentage of models agreeing with the majority, 0-100.
    pub agreement: u8,
    pub key_factors: Vec<String>,
    pub reasoning: String,
    pub model_count: usize,
}

/// Discrete trading action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Qualitative risk label attached to a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Low => write!(f, "LOW"),
            Risk::Medium => write!(f, "MEDIUM"),
            Risk::High => write!(f, "HIGH"),
        }
    }
}

/// The consensus fields a recommendation was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusRef {
    pub direction: Direction,
    pub confidence: u8,
    pub agreement: u8,
    pub model_count: usize,
}

impl From<&ConsensusResult> for ConsensusRef {
    fn from(consensus: &ConsensusResult) -> Self {
        Self {
            direction: consensus.direction,
            confidence: consensus.confidence,
            agreement: consensus.agreement,
            model_count: consensus.model_count,
        }
    }
}

/// Trading recommendation. A pure function of consensus + thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub action: Action,
    pub risk: Risk,
    pub explanation: String,
    pub consensus: ConsensusRef,
}

/// How much the prompt asks of each model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Standard,
    Detailed,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Standard => write!(f, "standard"),
            AnalysisMode::Detailed => write!(f, "detailed"),
        }
    }
}

/// Lookback span and candle interval used to fetch history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub lookback: Duration,
    /// Provider candle interval code (e.g. "15m", "1H").
    pub interval: &'static str,
}

/// Prediction horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[default]
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
        Timeframe::OneWeek,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "24h",
            Timeframe::OneWeek => "7d",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1 Hour",
            Timeframe::FourHours => "4 Hours",
            Timeframe::OneDay => "24 Hours",
            Timeframe::OneWeek => "7 Days",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "Short-term prediction for the next hour",
            Timeframe::FourHours => "Intraday prediction for the next four hours",
            Timeframe::OneDay => "Daily prediction for the next 24 hours",
            Timeframe::OneWeek => "Weekly prediction for the next seven days",
        }
    }

    /// History fetched to give the models context for this horizon.
    pub fn history_window(&self) -> HistoryWindow {
        const HOUR: u64 = 60 * 60;
        match self {
            Timeframe::OneHour => HistoryWindow {
                lookback: Duration::from_secs(12 * HOUR),
                interval: "15m",
            },
            Timeframe::FourHours => HistoryWindow {
                lookback: Duration::from_secs(48 * HOUR),
                interval: "1H",
            },
            Timeframe::OneDay => HistoryWindow {
                lookback: Duration::from_secs(7 * 24 * HOUR),
                interval: "4H",
            },
            Timeframe::OneWeek => HistoryWindow {
                lookback: Duration::from_secs(30 * 24 * HOUR),
                interval: "1D",
            },
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown timeframe '{}' (expected one of: 1h, 4h, 24h, 7d)",
                    s
                )
            })
    }
}

/// A complete prediction: inputs, individual replies, consensus and advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReport {
    pub id: String,
    pub token: TokenSnapshot,
    pub history: HistoricalSummary,
    pub timeframe: Timeframe,
    pub analysis_mode: AnalysisMode,
    pub consensus: ConsensusResult,
    pub recommendation: Recommendation,
    pub predictions: Vec<ModelPrediction>,
    /// Models asked, including the ones that failed.
    pub models_queried: usize,
    pub created_at: DateTime<Utc>,
}

impl PredictionReport {
    /// True when fewer models answered than were asked.
    pub fn is_degraded(&self) -> bool {
        self.consensus.model_count < self.models_queried
    }
}
