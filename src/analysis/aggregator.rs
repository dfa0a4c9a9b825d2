//! Consensus aggregation over individual model predictions.
//!
//! Pure and deterministic: the same list always yields the same consensus.

use crate::models::{ConsensusResult, Direction, ModelPrediction};
use std::collections::HashMap;

/// Number of key factors carried into the consensus.
pub const CONSENSUS_KEY_FACTORS: usize = 3;

/// Factor reported when no model supplied any.
pub const DEFAULT_KEY_FACTOR: &str = "insufficient_data";

/// Reduce model predictions to a single majority-vote consensus.
pub fn aggregate(predictions: &[ModelPrediction]) -> ConsensusResult {
    if predictions.is_empty() {
        return ConsensusResult {
            direction: Direction::Sideways,
            confidence: 0,
            agreement: 0,
            key_factors: vec![DEFAULT_KEY_FACTOR.to_string()],
            reasoning: "No valid predictions available".to_string(),
            model_count: 0,
        };
    }

    let tally = tally_votes(predictions);
    let direction = majority_direction(&tally);

    let aligned: Vec<u32> = predictions
        .iter()
        .filter(|p| p.direction == direction)
        .map(|p| u32::from(p.confidence))
        .collect();

    let confidence = if aligned.is_empty() {
        0
    } else {
        rounded_ratio(aligned.iter().sum::<u32>() as f64, aligned.len() as f64, 1.0)
    };
    let agreement = rounded_ratio(aligned.len() as f64, predictions.len() as f64, 100.0);

    ConsensusResult {
        direction,
        confidence,
        agreement,
        key_factors: top_key_factors(predictions, CONSENSUS_KEY_FACTORS),
        reasoning: format!(
            "{}% of models predict {} with {}% average confidence",
            agreement, direction, confidence
        ),
        model_count: predictions.len(),
    }
}

/// Votes per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub up: usize,
    pub down: usize,
    pub sideways: usize,
}

pub fn tally_votes(predictions: &[ModelPrediction]) -> VoteTally {
    predictions
        .iter()
        .fold(VoteTally::default(), |mut tally, p| {
            match p.direction {
                Direction::Up => tally.up += 1,
                Direction::Down => tally.down += 1,
                Direction::Sideways => tally.sideways += 1,
            }
            tally
        })
}

/// The direction with the strictly highest vote count. Any tie for the top
/// count resolves to SIDEWAYS.
pub fn majority_direction(tally: &VoteTally) -> Direction {
    let top = tally.up.max(tally.down).max(tally.sideways);

    if tally.up == top && tally.down < top && tally.sideways < top {
        Direction::Up
    } else if tally.down == top && tally.up < top && tally.sideways < top {
        Direction::Down
    } else {
        Direction::Sideways
    }
}

/// Most frequent key factors across all predictions; ties keep first-seen order.
pub fn top_key_factors(predictions: &[ModelPrediction], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for factor in predictions.iter().flat_map(|p| p.key_factors.iter()) {
        let count = counts.entry(factor.as_str()).or_insert(0);
        if *count == 0 {
            first_seen.push(factor.as_str());
        }
        *count += 1;
    }

    if first_seen.is_empty() {
        return vec![DEFAULT_KEY_FACTOR.to_string()];
    }

    // Stable sort keeps first-seen order among equal counts.
    first_seen.sort_by_key(|factor| std::cmp::Reverse(counts[factor]));
    first_seen
        .into_iter()
        .take(n)
        .map(str::to_string)
        .collect()
}

fn rounded_ratio(numerator: f64, denominator: f64, scale: f64) -> u8 {
    (numerator / denominator * scale).round().clamp(0.0, 100.0) as u8
}
