use crate::model_service::{Classifier, InputTensor, ModelLoader};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

#[derive(Debug, Clone)]
pub struct OrtModelLoader {
    num_instances: usize,
}

impl OrtModelLoader {
    pub fn new(num_instances: usize) -> Self {
        Self {
            num_instances: num_instances.max(1),
        }
    }
}

impl ModelLoader for OrtModelLoader {
    type Model = OrtClassifier;

    fn load(&self, path: &Path) -> Result<OrtClassifier, String> {
        OrtClassifier::from_file(path, self.num_instances).map_err(|e| e.to_string())
    }
}

pub struct OrtClassifier {
    sessions: Vec<Arc<Mutex<Session>>>,
    counter: AtomicUsize,
    output_name: String,
}

impl OrtClassifier {
    pub fn from_file(path: &Path, num_instances: usize) -> Result<Self, ort::Error> {
        let num_instances = num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let output_name = {
            let first = sessions[0]
                .lock()
                .map_err(|e| ort::Error::new(format!("session mutex poisoned: {}", e)))?;
            first
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| ort::Error::new("model declares no outputs"))?
        };

        tracing::info!(
            "Created {} ONNX sessions from {:?}, reading output `{}`",
            num_instances,
            path,
            output_name
        );

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            output_name,
        })
    }
}

impl Classifier for OrtClassifier {
    fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, String> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| format!("session mutex poisoned: {}", e))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| format!("failed to build tensor: {}", e))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| format!("inference failed: {}", e))?;

        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("failed to extract tensor: {}", e))?;

        Ok(data.to_vec())
    }
}
