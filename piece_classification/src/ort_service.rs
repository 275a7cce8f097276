use crate::{
    config::ModelConfig,
    model_service::{softmax, Classifier, ModelError},
};
use async_trait::async_trait;
use ndarray::Array4;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone)]
pub struct OrtClassifier {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    apply_softmax: bool,
}

impl OrtClassifier {
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
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: model_config.output_name.clone(),
            apply_softmax: model_config.apply_softmax,
        })
    }

    fn run_inference(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::SessionPoisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ModelError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ModelError::Output {
                name: self.output_name.clone(),
                reason: "no such output".to_string(),
            })?;

        let (_shape, data) =
            output
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Output {
                    name: self.output_name.clone(),
                    reason: e.to_string(),
                })?;

        Ok(to_probabilities(data, self.apply_softmax))
    }
}

/// Maps raw model scores to the probability vector handed to
/// [`crate::model_service::Prediction::from_probabilities`].
fn to_probabilities(scores: &[f32], apply_softmax: bool) -> Vec<f32> {
    if apply_softmax {
        softmax(scores)
    } else {
        scores.to_vec()
    }
}

#[async_trait]
impl Classifier for OrtClassifier {
    async fn classify(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let classifier = self.clone();
        tokio::task::spawn_blocking(move || classifier.run_inference(&input))
            .await
            .map_err(|e| ModelError::Join(e.to_string()))?
    }
}
