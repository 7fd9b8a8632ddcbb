use crate::core::ElementId;
use serde::{Deserialize, Serialize};

/// What a match is about: the ordered pair, its coupling in every analyzed
/// view and the pair support the errors were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub first: ElementId,
    pub second: ElementId,
    pub coupling: Vec<f64>,
    pub support: f64,
}

/// A pattern match: error per fixed pattern slot, then the negated support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub errors: Vec<f64>,
    pub payload: CandidatePayload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// `sum(w_i * e_i)`
    #[default]
    Linear,
    /// Squared pattern errors, support dimension kept linear
    Squared,
}

impl ScoredCandidate {
    pub fn new(errors: Vec<f64>, payload: CandidatePayload) -> Self {
        Self { errors, payload }
    }

    pub fn dimensions(&self) -> usize {
        self.errors.len()
    }

    pub fn pair(&self) -> (&ElementId, &ElementId) {
        (&self.payload.first, &self.payload.second)
    }

    /// Errors against the pattern, without the support dimension
    pub fn pattern_errors(&self) -> &[f64] {
        let end = self.errors.len().saturating_sub(1);
        &self.errors[..end]
    }

    /// Lower is better. Missing weights count as zero.
    pub fn weighted_score(&self, weights: &[f64], mode: WeightingMode) -> f64 {
        let last = self.errors.len().saturating_sub(1);
        self.errors
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(i, (e, w))| match mode {
                WeightingMode::Squared if i < last => w * e * e,
                _ => w * e,
            })
            .sum()
    }

    /// Sum of squared pattern errors, 0 for a perfect match
    pub fn match_score(&self) -> f64 {
        self.pattern_errors().iter().map(|e| e * e).sum()
    }

    /// Reorder views and errors. `coupling_order[i]` and `error_order[i]`
    /// name the source index for target position `i`. The support
    /// dimension stays last.
    pub fn reordered(&self, coupling_order: &[usize], error_order: &[usize]) -> Self {
        let support_error = self.errors.last().copied().unwrap_or(0.0);
        let mut errors: Vec<f64> = error_order.iter().map(|&i| self.errors[i]).collect();
        errors.push(support_error);
        Self {
            errors,
            payload: CandidatePayload {
                first: self.payload.first.clone(),
                second: self.payload.second.clone(),
                coupling: coupling_order
                    .iter()
                    .map(|&i| self.payload.coupling[i])
                    .collect(),
                support: self.payload.support,
            },
        }
    }
}
