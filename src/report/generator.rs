//! Markdown report generation.
//!
//! Renders a [`PredictionReport`] for the one-shot CLI mode.

use crate::models::{
    Action, ConsensusResult, HistoricalSummary, ModelPrediction, PredictionReport,
    Recommendation, Risk, TokenSnapshot,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &PredictionReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Consensus Prediction: {} ({})\n\n",
        report.token.name, report.token.symbol
    ));

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_recommendation_section(&report.recommendation));
    output.push_str(&generate_consensus_section(&report.consensus));
    output.push_str(&generate_market_section(&report.token));
    output.push_str(&generate_history_section(&report.history));
    output.push_str(&generate_predictions_section(&report.predictions));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(report: &PredictionReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Token:** `{}`\n", report.token.address));
    section.push_str(&format!(
        "- **Timeframe:** {} ({})\n",
        report.timeframe.name(),
        report.timeframe
    ));
    section.push_str(&format!("- **Analysis Mode:** {}\n", report.analysis_mode));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Models Answered:** {}/{}\n",
        report.consensus.model_count, report.models_queried
    ));
    if report.is_degraded() {
        section.push_str("- **Note:** some models failed and were excluded\n");
    }
    section.push('\n');

    section
}

fn generate_recommendation_section(recommendation: &Recommendation) -> String {
    let mut section = String::new();

    let badge = match recommendation.action {
        Action::Buy => "🟢 **BUY**",
        Action::Sell => "🔴 **SELL**",
        Action::Hold => "🟡 **HOLD**",
    };
    let risk = match recommendation.risk {
        Risk::Low => "low",
        Risk::Medium => "medium",
        Risk::High => "high",
    };

    section.push_str("## Recommendation\n\n");
    section.push_str(&format!("### {} ({} risk)\n\n", badge, risk));
    section.push_str(&format!("> {}\n\n", recommendation.explanation));

    section
}

fn generate_consensus_section(consensus: &ConsensusResult) -> String {
    let mut section = String::new();

    section.push_str("## Consensus\n\n");
    section.push_str("| Direction | Confidence | Agreement | Models |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {}% | {}% | {} |\n\n",
        consensus.direction, consensus.confidence, consensus.agreement, consensus.model_count
    ));
    section.push_str(&format!("{}\n\n", consensus.reasoning));

    if !consensus.key_factors.is_empty() {
        section.push_str("### Key Factors\n\n");
        for (i, factor) in consensus.key_factors.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, factor));
        }
        section.push('\n');
    }

    section
}

fn generate_market_section(token: &TokenSnapshot) -> String {
    let mut section = String::new();

    section.push_str("## Market Data\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|---:|\n");
    section.push_str(&format!("| Price | ${} |\n", token.current_price));
    section.push_str(&format!("| 24h Volume | ${:.2} |\n", token.volume_24h));
    section.push_str(&format!(
        "| 24h Change | {:+.2}% |\n",
        token.price_change_24h_pct
    ));
    section.push_str(&format!("| Liquidity | ${:.2} |\n", token.liquidity));
    section.push_str(&format!("| Holders | {} |\n\n", token.holders));

    section
}

fn generate_history_section(history: &HistoricalSummary) -> String {
    let mut section = String::new();

    section.push_str("## Price History\n\n");
    section.push_str(&format!(
        "*Trend: {} | Volatility: {} | Change: {:+.2}%*\n\n",
        history.trend, history.volatility, history.price_change_pct
    ));

    section
}

fn generate_predictions_section(predictions: &[ModelPrediction]) -> String {
    let mut section = String::new();

    section.push_str("## Model Predictions\n\n");

    if predictions.is_empty() {
        section.push_str("No model returned a usable prediction.\n\n");
        return section;
    }

    section.push_str("| Model | Direction | Confidence | Reasoning |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");
    for prediction in predictions {
        section.push_str(&format!(
            "| `{}` | {} | {}% | {} |\n",
            prediction.model,
            prediction.direction,
            prediction.confidence,
            escape_cell(&prediction.reasoning)
        ));
    }
    section.push('\n');

    for prediction in predictions {
        if prediction.risk_factors.is_empty() && prediction.technical_indicators.is_none() {
            continue;
        }
        section.push_str(&format!("### `{}`\n\n", prediction.model));
        if !prediction.risk_factors.is_empty() {
            section.push_str(&format!(
                "**Risk factors:** {}\n\n",
                prediction.risk_factors.join(", ")
            ));
        }
        if let Some(ref indicators) = prediction.technical_indicators {
            section.push_str(&format!("**Technical indicators:** {}\n\n", indicators));
        }
    }

    section
}

/// Keep free text from breaking the table layout.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Not financial advice. Generated by consensus-predictor.*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &PredictionReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, recommend, Thresholds};
    use crate::models::{AnalysisMode, Direction, Timeframe, Trend, Volatility};
    use chrono::Utc;

    fn create_test_report() -> PredictionReport {
        let predictions = vec![
            ModelPrediction {
                model: "gpt-4o".to_string(),
                direction: Direction::Up,
                confidence: 80,
                reasoning: "Volume | momentum rising".to_string(),
                key_factors: vec!["volume".to_string()],
                risk_factors: Vec::new(),
                technical_indicators: None,
                timestamp: Utc::now(),
            },
            ModelPrediction {
                model: "gpt-4o-mini".to_string(),
                direction: Direction::Up,
                confidence: 70,
                reasoning: "Buyers in control".to_string(),
                key_factors: vec!["volume".to_string(), "holders".to_string()],
                risk_factors: Vec::new(),
                technical_indicators: None,
                timestamp: Utc::now(),
            },
        ];
        let consensus = aggregate(&predictions);
        let recommendation = recommend(&consensus, &Thresholds::default());

        PredictionReport {
            id: "test".to_string(),
            token: TokenSnapshot {
                address: "So11111111111111111111111111111111111111112".to_string(),
                symbol: "SOL".to_string(),
                name: "Wrapped SOL".to_string(),
                current_price: 152.3,
                volume_24h: 1_000_000.0,
                price_change_24h_pct: 2.5,
                liquidity: 5_000_000.0,
                holders: 900_000,
            },
            history: HistoricalSummary {
                trend: Trend::Bullish,
                volatility: Volatility::Low,
                price_change_pct: 4.0,
                points: Vec::new(),
            },
            timeframe: Timeframe::FourHours,
            analysis_mode: AnalysisMode::Standard,
            consensus,
            recommendation,
            predictions,
            models_queried: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Consensus Prediction: Wrapped SOL (SOL)"));
        assert!(markdown.contains("## Recommendation"));
        assert!(markdown.contains("**BUY**"));
        assert!(markdown.contains("| **UP** | 75% | 100% | 2 |"));
        assert!(markdown.contains("1. volume"));
        assert!(markdown.contains("Trend: bullish"));
        assert!(markdown.contains("`gpt-4o-mini`"));
    }

    #[test]
    fn test_degraded_note() {
        let report = create_test_report();
        let section = generate_metadata_section(&report);

        assert!(section.contains("4 Hours (4h)"));
        assert!(section.contains("**Models Answered:** 2/3"));
        assert!(section.contains("some models failed"));
    }

    #[test]
    fn test_reasoning_pipes_escaped() {
        let report = create_test_report();
        let section = generate_predictions_section(&report.predictions);
        assert!(section.contains("Volume \\| momentum rising"));
    }

    #[test]
    fn test_detailed_extras_rendered() {
        let mut report = create_test_report();
        report.predictions[0].risk_factors = vec!["thin liquidity".to_string()];
        report.predictions[0].technical_indicators = Some("RSI near 70".to_string());

        let section = generate_predictions_section(&report.predictions);
        assert!(section.contains("### `gpt-4o`"));
        assert!(section.contains("**Risk factors:** thin liquidity"));
        assert!(section.contains("**Technical indicators:** RSI near 70"));
        assert!(!section.contains("### `gpt-4o-mini`"));
    }

    #[test]
    fn test_empty_predictions_section() {
        let section = generate_predictions_section(&[]);
        assert!(section.contains("No model returned a usable prediction"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"consensus\""));
        assert!(json.contains("\"modelsQueried\""));
        assert!(json.contains("\"direction\": \"UP\""));
    }
}
