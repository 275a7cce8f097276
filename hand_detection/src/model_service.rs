use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

// MediaPipe clips raw palm scores to this range before the sigmoid.
const SCORE_CLIPPING_THRESHOLD: f32 = 100.0;

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
    #[error("inference task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait HandDetector: Send + Sync + 'static {
    async fn detect(&self, image: RgbImage) -> Result<HandDetection, ModelError>;

    fn is_loaded(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandDetection {
    pub present: bool,
    /// Best sigmoid anchor score, `0.0` when the model produced no anchors.
    pub best_score: f32,
}

impl HandDetection {
    pub fn from_raw_scores(raw_scores: &[f32], min_confidence: f32) -> Self {
        let best_score = raw_scores
            .iter()
            .map(|raw| sigmoid(raw.clamp(-SCORE_CLIPPING_THRESHOLD, SCORE_CLIPPING_THRESHOLD)))
            .fold(0.0f32, f32::max);

        Self {
            present: !raw_scores.is_empty() && best_score >= min_confidence,
            best_score,
        }
    }

    pub fn none() -> Self {
        Self {
            present: false,
            best_score: 0.0,
        }
    }
}

/// Maps a detection to the value reported as `confidence`.
///
/// The palm detector has no single "hand present" probability, so by
/// default this reports a placeholder: `1.0` when a hand was found and `0.0`
/// otherwise. It is not a model score. With `report_detector_score` the best
/// anchor score is returned instead.
pub fn reported_confidence(detection: &HandDetection, report_detector_score: bool) -> f32 {
    match (detection.present, report_detector_score) {
        (false, _) => 0.0,
        (true, false) => 1.0,
        (true, true) => detection.best_score,
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
