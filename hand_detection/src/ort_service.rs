use crate::{
    config::{InputLayout, ModelConfig},
    cv_utils::letterbox,
    model_service::{HandDetection, HandDetector, ModelError},
};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::{Array, Ix4};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Letterboxes the image to the network resolution and scales it to `[0, 1]`.
fn image_to_tensor(image: &RgbImage, size: u32, layout: InputLayout) -> Array<f32, Ix4> {
    let img = letterbox(image, size);
    let size = size as usize;

    let mut input = match layout {
        InputLayout::Nchw => Array::zeros((1, 3, size, size)),
        InputLayout::Nhwc => Array::zeros((1, size, size, 3)),
    };
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        for (c, value) in pixel.0.iter().enumerate() {
            let value = (*value as f32) / 255.;
            match layout {
                InputLayout::Nchw => input[[0, c, y, x]] = value,
                InputLayout::Nhwc => input[[0, y, x, c]] = value,
            }
        }
    }

    input
}

#[derive(Clone)]
pub struct OrtHandDetector {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    input_size: u32,
    input_layout: InputLayout,
    scores_output: String,
    min_detection_confidence: f32,
}

impl OrtHandDetector {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ort::Error> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let mut builder = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?;
                if model_config.use_cuda {
                    builder = builder
                        .with_execution_providers([CUDAExecutionProvider::default().build()])?;
                }
                let session = builder.commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} palm detection sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            input_size: model_config.input_size,
            input_layout: model_config.input_layout,
            scores_output: model_config.scores_output.clone(),
            min_detection_confidence: model_config.min_detection_confidence,
        })
    }

    fn run_inference(&self, image: &RgbImage) -> Result<HandDetection, ModelError> {
        let input = image_to_tensor(image, self.input_size, self.input_layout);

        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::SessionPoisoned(e.to_string()))?;
        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let scores = outputs
            .get(self.scores_output.as_str())
            .ok_or_else(|| ModelError::Output {
                name: self.scores_output.clone(),
                reason: "no such output".to_string(),
            })?;

        let (_shape, raw_scores) =
            scores
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Output {
                    name: self.scores_output.clone(),
                    reason: e.to_string(),
                })?;

        let detection = HandDetection::from_raw_scores(raw_scores, self.min_detection_confidence);
        tracing::debug!(
            "Palm detection over {} anchors: present={}, best_score={:.3}",
            raw_scores.len(),
            detection.present,
            detection.best_score
        );

        Ok(detection)
    }
}

#[async_trait]
impl HandDetector for OrtHandDetector {
    async fn detect(&self, image: RgbImage) -> Result<HandDetection, ModelError> {
        let detector = self.clone();
        tokio::task::spawn_blocking(move || detector.run_inference(&image))
            .await
            .map_err(|e| ModelError::Join(e.to_string()))?
    }
}
