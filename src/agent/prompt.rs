//! Analysis prompt construction.

use chrono::{DateTime, Utc};

use crate::models::{AnalysisMode, HistoricalSummary, Timeframe, TokenSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromptOptions {
    pub timeframe: Timeframe,
    pub mode: AnalysisMode,
}

/// Build the user-turn prompt for every queried model.
pub fn build_prompt(
    snapshot: &TokenSnapshot,
    history: &HistoricalSummary,
    options: PromptOptions,
) -> String {
    build_prompt_at(snapshot, history, options, Utc::now())
}

/// Same as [`build_prompt`] with an explicit footer timestamp.
pub fn build_prompt_at(
    snapshot: &TokenSnapshot,
    history: &HistoricalSummary,
    options: PromptOptions,
    generated_at: DateTime<Utc>,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Analyze {} ({}) and predict its price direction over the next {}.\n\n",
        snapshot.name,
        snapshot.symbol,
        options.timeframe.name().to_lowercase()
    ));

    prompt.push_str("=== MARKET DATA ===\n");
    prompt.push_str(&format!("Token address: {}\n", snapshot.address));
    prompt.push_str(&format!("Current price: ${}\n", format_price(snapshot.current_price)));
    prompt.push_str(&format!("24h volume: ${:.2}\n", snapshot.volume_24h));
    prompt.push_str(&format!("24h price change: {:+.2}%\n", snapshot.price_change_24h_pct));
    prompt.push_str(&format!("Liquidity: ${:.2}\n", snapshot.liquidity));
    prompt.push_str(&format!("Holders: {}\n\n", snapshot.holders));

    prompt.push_str("=== PRICE HISTORY ===\n");
    prompt.push_str(&format!("Trend: {}\n", history.trend));
    prompt.push_str(&format!("Volatility: {}\n", history.volatility));
    prompt.push_str(&format!(
        "Change over window: {:+.2}%\n",
        history.price_change_pct
    ));
    if history.points.is_empty() {
        prompt.push_str("Recent prices: unavailable\n");
    } else {
        prompt.push_str("Recent prices (oldest first):\n");
        for point in &history.points {
            let time = DateTime::<Utc>::from_timestamp(point.time, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| point.time.to_string());
            prompt.push_str(&format!("- {}: ${}\n", time, format_price(point.price)));
        }
    }
    prompt.push('\n');

    prompt.push_str("=== RESPONSE FORMAT ===\n");
    match options.mode {
        AnalysisMode::Standard => {
            prompt.push_str("Reply with a JSON object with these fields:\n");
            prompt.push_str(r#"{"direction": "UP" | "DOWN" | "SIDEWAYS", "confidence": 0-100, "reasoning": "one or two sentences", "keyFactors": ["short factor", ...]}"#);
            prompt.push('\n');
        }
        AnalysisMode::Detailed => {
            prompt.push_str("Reply with a JSON object with these fields:\n");
            prompt.push_str(r#"{"direction": "UP" | "DOWN" | "SIDEWAYS", "confidence": 0-100, "reasoning": "a short paragraph", "keyFactors": ["short factor", ...], "riskFactors": ["key risk", ...], "technicalIndicators": "commentary on momentum, support/resistance and volume"}"#);
            prompt.push('\n');
            prompt.push_str(
                "Identify the key risk factors and comment on the technical indicators the data implies.\n",
            );
        }
    }
    prompt.push_str("Use at most 5 key factors. Confidence is an integer percentage.\n\n");

    prompt.push_str(&format!(
        "Generated at {}",
        generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    ));

    prompt
}

/// Show small prices with enough significant digits.
fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{:.2}", price)
    } else {
        format!("{:.8}", price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PricePoint, Trend, Volatility};
    use chrono::TimeZone;

    fn snapshot() -> TokenSnapshot {
        TokenSnapshot {
            address: "D8U9GxmBGs98geNjWkrYf4GUjHqDvMgG5XdL41TXpump".to_string(),
            symbol: "EMB".to_string(),
            name: "Embassy".to_string(),
            current_price: 0.0042,
            volume_24h: 96500.25,
            price_change_24h_pct: -3.75,
            liquidity: 185000.5,
            holders: 2841,
        }
    }

    fn history() -> HistoricalSummary {
        HistoricalSummary {
            trend: Trend::Bearish,
            volatility: Volatility::Medium,
            price_change_pct: -4.5,
            points: vec![PricePoint {
                time: 1_718_000_000,
                price: 0.0044,
            }],
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    /// Drop the timestamp footer so bodies can be compared.
    fn body(prompt: &str) -> &str {
        prompt.rsplit_once("\nGenerated at").map(|(b, _)| b).unwrap()
    }

    #[test]
    fn test_standard_prompt_contents() {
        let prompt = build_prompt_at(&snapshot(), &history(), PromptOptions::default(), fixed_time());

        assert!(prompt.contains("Embassy (EMB)"));
        assert!(prompt.contains("next 24 hours"));
        assert!(prompt.contains("Current price: $0.00420000"));
        assert!(prompt.contains("24h price change: -3.75%"));
        assert!(prompt.contains("Trend: bearish"));
        assert!(prompt.contains("Volatility: medium"));
        assert!(prompt.contains("2024-06-10 06:13 UTC"));
        assert!(prompt.contains("\"confidence\""));
        assert!(!prompt.contains("riskFactors"));
        assert!(prompt.ends_with("Generated at 2024-06-10T12:00:00Z"));
    }

    #[test]
    fn test_detailed_prompt_asks_for_risks_and_indicators() {
        let options = PromptOptions {
            timeframe: Timeframe::OneHour,
            mode: AnalysisMode::Detailed,
        };
        let prompt = build_prompt_at(&snapshot(), &history(), options, fixed_time());

        assert!(prompt.contains("next 1 hour"));
        assert!(prompt.contains("riskFactors"));
        assert!(prompt.contains("technical indicators"));
    }

    #[test]
    fn test_deterministic_apart_from_footer() {
        let a = build_prompt_at(&snapshot(), &history(), PromptOptions::default(), fixed_time());
        let b = build_prompt(&snapshot(), &history(), PromptOptions::default());
        assert_eq!(body(&a), body(&b));
    }

    #[test]
    fn test_empty_history() {
        let mut empty = history();
        empty.points.clear();
        let prompt = build_prompt_at(&snapshot(), &empty, PromptOptions::default(), fixed_time());
        assert!(prompt.contains("Recent prices: unavailable"));
    }
}
