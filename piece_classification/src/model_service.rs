use crate::labels::{class_name, NUM_CLASSES};
use async_trait::async_trait;
use ndarray::Array4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("session mutex poisoned: {0}")]
    SessionPoisoned(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to extract output `{name}`: {reason}")]
    Output { name: String, reason: String },
    #[error("model returned {0} scores, expected 14")]
    UnexpectedOutputLength(usize),
    #[error("model returned a non-finite score")]
    NonFiniteScore,
    #[error("inference task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait Classifier: Send + Sync + 'static {
    /// Runs a `(1, 224, 224, 3)` batch and returns one score per class.
    async fn classify(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError>;

    fn is_loaded(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub class_name: &'static str,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Picks the most probable class. The first index wins on ties.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, ModelError> {
        if probabilities.len() != NUM_CLASSES {
            return Err(ModelError::UnexpectedOutputLength(probabilities.len()));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::NonFiniteScore);
        }

        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .reduce(|best, row| if row.1 > best.1 { row } else { best })
            .ok_or(ModelError::UnexpectedOutputLength(0))?;

        let class_name =
            class_name(class_index).ok_or(ModelError::UnexpectedOutputLength(class_index))?;

        Ok(Self {
            class_index,
            class_name,
            confidence,
            probabilities,
        })
    }
}

/// Numerically stable softmax, for exports that stop at the logits.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_picks_argmax() {
        let mut probs = vec![0.01; NUM_CLASSES];
        probs[9] = 0.87;
        let prediction = Prediction::from_probabilities(probs).unwrap();

        assert_eq!(prediction.class_index, 9);
        assert_eq!(prediction.class_name, "white_king");
        assert_eq!(prediction.confidence, 0.87);
        assert_eq!(prediction.probabilities.len(), NUM_CLASSES);
    }

    #[test]
    fn test_prediction_first_index_wins_ties() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[3] = 0.5;
        probs[11] = 0.5;
        let prediction = Prediction::from_probabilities(probs).unwrap();

        assert_eq!(prediction.class_index, 3);
        assert_eq!(prediction.class_name, "black_pawn");
    }

    #[test]
    fn test_prediction_rejects_wrong_output_length() {
        let err = Prediction::from_probabilities(vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedOutputLength(3)));
    }

    #[test]
    fn test_prediction_rejects_nan() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[0] = f32::NAN;
        assert!(matches!(
            Prediction::from_probabilities(probs),
            Err(ModelError::NonFiniteScore)
        ));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        let sum: f32 = probs.iter().sum();

        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > 0.99);
    }
}
