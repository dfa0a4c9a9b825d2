//! Price-history summarisation.

use crate::models::{HistoricalSummary, PricePoint, Trend, Volatility};

/// Maximum number of points kept for display.
pub const MAX_SUMMARY_POINTS: usize = 12;

/// Summarise a time-ordered series of close prices.
pub fn summarize_history(samples: &[PricePoint]) -> HistoricalSummary {
    let price_change_pct = overall_change_pct(samples);

    HistoricalSummary {
        trend: classify_trend(price_change_pct),
        volatility: classify_volatility(mean_abs_step_pct(samples)),
        price_change_pct,
        points: downsample(samples, MAX_SUMMARY_POINTS),
    }
}

fn overall_change_pct(samples: &[PricePoint]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= 2 && first.price > 0.0 => {
            (last.price - first.price) / first.price * 100.0
        }
        _ => 0.0,
    }
}

/// Mean absolute percent change between consecutive samples.
fn mean_abs_step_pct(samples: &[PricePoint]) -> f64 {
    let steps: Vec<f64> = samples
        .windows(2)
        .filter(|w| w[0].price > 0.0)
        .map(|w| ((w[1].price - w[0].price) / w[0].price * 100.0).abs())
        .collect();

    if steps.is_empty() {
        0.0
    } else {
        steps.iter().sum::<f64>() / steps.len() as f64
    }
}

pub fn classify_trend(change_pct: f64) -> Trend {
    if change_pct > 10.0 {
        Trend::StronglyBullish
    } else if change_pct > 3.0 {
        Trend::Bullish
    } else if change_pct < -10.0 {
        Trend::StronglyBearish
    } else if change_pct < -3.0 {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

pub fn classify_volatility(mean_step_pct: f64) -> Volatility {
    if mean_step_pct < 2.0 {
        Volatility::Low
    } else if mean_step_pct < 5.0 {
        Volatility::Medium
    } else {
        Volatility::High
    }
}

/// Evenly spaced subset of at most `max` points; the last sample is always kept.
fn downsample(samples: &[PricePoint], max: usize) -> Vec<PricePoint> {
    if samples.len() <= max {
        return samples.to_vec();
    }
    if max < 2 {
        return samples.last().into_iter().take(max).copied().collect();
    }

    let step = (samples.len() - 1) as f64 / (max - 1) as f64;
    (0..max)
        .map(|i| samples[((i as f64 * step).round() as usize).min(samples.len() - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                time: 1_700_000_000 + i as i64 * 900,
                price,
            })
            .collect()
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let summary = summarize_history(&[]);
        assert_eq!(summary.trend, Trend::Neutral);
        assert_eq!(summary.volatility, Volatility::Low);
        assert_eq!(summary.price_change_pct, 0.0);
        assert!(summary.points.is_empty());
    }

    #[test]
    fn test_strong_uptrend() {
        let summary = summarize_history(&series(&[1.0, 1.05, 1.10, 1.20]));
        assert!((summary.price_change_pct - 20.0).abs() < 1e-9);
        assert_eq!(summary.trend, Trend::StronglyBullish);
    }

    #[test]
    fn test_trend_thresholds() {
        assert_eq!(classify_trend(10.5), Trend::StronglyBullish);
        assert_eq!(classify_trend(5.0), Trend::Bullish);
        assert_eq!(classify_trend(3.0), Trend::Neutral);
        assert_eq!(classify_trend(-4.0), Trend::Bearish);
        assert_eq!(classify_trend(-12.0), Trend::StronglyBearish);
    }

    #[test]
    fn test_volatility_from_steps() {
        // Steps of +10% and -9.09%: well above the high threshold.
        let choppy = summarize_history(&series(&[1.0, 1.1, 1.0, 1.1, 1.0]));
        assert_eq!(choppy.volatility, Volatility::High);

        let calm = summarize_history(&series(&[100.0, 100.5, 101.0, 100.8]));
        assert_eq!(calm.volatility, Volatility::Low);

        assert_eq!(classify_volatility(3.0), Volatility::Medium);
    }

    #[test]
    fn test_downsample_keeps_endpoints() {
        let prices: Vec<f64> = (0..100).map(|i| i as f64 + 1.0).collect();
        let summary = summarize_history(&series(&prices));

        assert_eq!(summary.points.len(), MAX_SUMMARY_POINTS);
        assert_eq!(summary.points.first().unwrap().price, 1.0);
        assert_eq!(summary.points.last().unwrap().price, 100.0);
        assert!(summary.points.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_short_history_kept_whole() {
        let summary = summarize_history(&series(&[1.0, 2.0, 3.0]));
        assert_eq!(summary.points.len(), 3);
    }
}
