//! Map a consensus onto a BUY/SELL/HOLD recommendation.

use crate::models::{Action, ConsensusRef, ConsensusResult, Direction, Recommendation, Risk};

/// Confidence cut-offs, as fractions of 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
    /// Below this the explanation flags the signal as very weak.
    pub low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: 0.75,
            medium: 0.5,
            low: 0.25,
        }
    }
}

impl From<&crate::config::ThresholdsConfig> for Thresholds {
    fn from(config: &crate::config::ThresholdsConfig) -> Self {
        Self {
            high: config.high,
            medium: config.medium,
            low: config.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    High,
    Medium,
    Weak,
}

/// Confidence discounted by how many models backed the majority.
///
/// A 2-of-3 majority at 80% confidence scores about 0.54.
pub fn conviction(consensus: &ConsensusResult) -> f64 {
    f64::from(consensus.confidence) / 100.0 * f64::from(consensus.agreement) / 100.0
}

/// Decision table over direction and conviction band.
pub fn recommend(consensus: &ConsensusResult, thresholds: &Thresholds) -> Recommendation {
    let fraction = conviction(consensus);
    let band = if fraction >= thresholds.high {
        Band::High
    } else if fraction >= thresholds.medium {
        Band::Medium
    } else {
        Band::Weak
    };

    let (action, risk) = match (consensus.direction, band) {
        (Direction::Up, Band::High) => (Action::Buy, Risk::Low),
        (Direction::Up, Band::Medium) => (Action::Buy, Risk::Medium),
        (Direction::Down, Band::High) => (Action::Sell, Risk::Low),
        (Direction::Down, Band::Medium) => (Action::Sell, Risk::Medium),
        (Direction::Sideways, Band::High | Band::Medium) => (Action::Hold, Risk::Low),
        (_, Band::Weak) => (Action::Hold, Risk::Medium),
    };

    Recommendation {
        action,
        risk,
        explanation: explain(consensus, band, fraction < thresholds.low),
        consensus: ConsensusRef::from(consensus),
    }
}

fn explain(consensus: &ConsensusResult, band: Band, very_weak: bool) -> String {
    if consensus.model_count == 0 {
        return "No model produced a usable prediction; holding is the only safe action."
            .to_string();
    }

    let summary = format!(
        "{} of {} model(s) lean {} ({}% agreement, {}% confidence).",
        (f64::from(consensus.agreement) / 100.0 * consensus.model_count as f64).round() as usize,
        consensus.model_count,
        consensus.direction,
        consensus.agreement,
        consensus.confidence
    );

    let advice = match (consensus.direction, band) {
        (Direction::Up, Band::High) => "Strong bullish consensus supports buying.",
        (Direction::Up, Band::Medium) => "Moderate bullish consensus; consider a smaller position.",
        (Direction::Down, Band::High) => "Strong bearish consensus supports selling.",
        (Direction::Down, Band::Medium) => "Moderate bearish consensus; consider reducing exposure.",
        (Direction::Sideways, Band::High | Band::Medium) => {
            "Models expect little movement; holding carries low risk."
        }
        (_, Band::Weak) if very_weak => "Signal is very weak; wait for clearer conditions.",
        (_, Band::Weak) => "Confidence is too low to act on; hold.",
    };

    format!("{} {}", summary, advice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consensus(direction: Direction, confidence: u8) -> ConsensusResult {
        ConsensusResult {
            direction,
            confidence,
            agreement: 100,
            key_factors: vec!["volume".to_string()],
            reasoning: String::new(),
            model_count: 3,
        }
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (Direction::Up, 80, Action::Buy, Risk::Low),
            (Direction::Up, 60, Action::Buy, Risk::Medium),
            (Direction::Up, 30, Action::Hold, Risk::Medium),
            (Direction::Down, 90, Action::Sell, Risk::Low),
            (Direction::Down, 55, Action::Sell, Risk::Medium),
            (Direction::Down, 10, Action::Hold, Risk::Medium),
            (Direction::Sideways, 75, Action::Hold, Risk::Low),
            (Direction::Sideways, 50, Action::Hold, Risk::Low),
            (Direction::Sideways, 49, Action::Hold, Risk::Medium),
        ];

        for (direction, confidence, action, risk) in cases {
            let rec = recommend(&consensus(direction, confidence), &Thresholds::default());
            assert_eq!(rec.action, action, "{} at {}", direction, confidence);
            assert_eq!(rec.risk, risk, "{} at {}", direction, confidence);
        }
    }

    #[test]
    fn test_threshold_boundaries_are_inclusive() {
        let rec = recommend(&consensus(Direction::Up, 75), &Thresholds::default());
        assert_eq!(rec.risk, Risk::Low);

        let rec = recommend(&consensus(Direction::Up, 74), &Thresholds::default());
        assert_eq!(rec.risk, Risk::Medium);
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = Thresholds {
            high: 0.95,
            medium: 0.9,
            low: 0.5,
        };
        let rec = recommend(&consensus(Direction::Up, 80), &strict);
        assert_eq!(rec.action, Action::Hold);
    }

    #[test]
    fn test_carries_consensus_reference() {
        let c = consensus(Direction::Down, 66);
        let rec = recommend(&c, &Thresholds::default());

        assert_eq!(rec.consensus.direction, Direction::Down);
        assert_eq!(rec.consensus.confidence, 66);
        assert_eq!(rec.consensus.model_count, 3);
        assert!(rec.explanation.contains("3 of 3 model(s) lean DOWN"));
    }

    #[test]
    fn test_split_vote_lowers_band() {
        let mut c = consensus(Direction::Up, 80);
        assert_eq!(recommend(&c, &Thresholds::default()).risk, Risk::Low);

        c.agreement = 67;
        let rec = recommend(&c, &Thresholds::default());
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.risk, Risk::Medium);
    }

    #[test]
    fn test_two_up_one_down_recommends_medium_risk_buy() {
        use crate::models::ModelPrediction;

        let vote = |model: &str, direction, confidence| ModelPrediction {
            model: model.to_string(),
            direction,
            confidence,
            reasoning: String::new(),
            key_factors: vec!["volume".to_string()],
            risk_factors: Vec::new(),
            technical_indicators: None,
            timestamp: chrono::Utc::now(),
        };
        let predictions = [
            vote("a", Direction::Up, 90),
            vote("b", Direction::Up, 70),
            vote("c", Direction::Down, 60),
        ];

        let c = crate::analysis::aggregate(&predictions);
        assert_eq!((c.direction, c.confidence, c.agreement), (Direction::Up, 80, 67));

        let rec = recommend(&c, &Thresholds::default());
        assert_eq!((rec.action, rec.risk), (Action::Buy, Risk::Medium));
    }

    #[test]
    fn test_empty_consensus_holds() {
        let c = crate::analysis::aggregate(&[]);
        let rec = recommend(&c, &Thresholds::default());
        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.risk, Risk::Medium);
        assert!(rec.explanation.starts_with("No model produced"));
    }
}
