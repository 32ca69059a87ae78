use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};

use super::classifier::Classifier;
use super::error::ClassifierError;
use super::model::{ImageModel, OnnxImageModel, Preprocessing};
use crate::runtime::{create_session_builder, RuntimeConfig};

const MAX_LABELS: usize = 1000;

/// A builder for constructing a Classifier with a fluent interface.
#[derive(Default)]
pub struct ClassifierBuilder {
    model_path: Option<String>,
    labels_path: Option<String>,
    model: Option<Arc<dyn ImageModel>>,
    preprocessing: Preprocessing,
    runtime_config: RuntimeConfig,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    pub fn new() -> Self {
        Self {
            model_path: None,
            labels_path: None,
            model: None,
            preprocessing: Preprocessing::default(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Sets the runtime configuration for ONNX model execution.
    ///
    /// Must be called before [`with_model_files`](Self::with_model_files).
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets how images are resized and normalized before inference.
    ///
    /// Must be called before [`with_model_files`](Self::with_model_files).
    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Loads an ONNX model and its label vocabulary from disk.
    ///
    /// The labels file holds one label per line, in the order of the model's
    /// output scores. Blank lines are ignored.
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or a
    ///   `ModelLoad` error if:
    ///   - The paths are empty or a model is already set
    ///   - The files don't exist
    ///   - The model or labels failed to load
    ///   - The model structure is invalid
    pub fn with_model_files(
        mut self,
        model_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let labels_path = labels_path.as_ref();

        if model_path.as_os_str().is_empty() || labels_path.as_os_str().is_empty() {
            return Err(ClassifierError::ModelLoad("Model and labels paths cannot be empty".to_string()));
        }
        if self.model.is_some() {
            return Err(ClassifierError::ModelLoad("Model already set".to_string()));
        }
        if !model_path.exists() {
            return Err(ClassifierError::ModelLoad(format!("Model file not found: {}", model_path.display())));
        }
        if !labels_path.exists() {
            return Err(ClassifierError::ModelLoad(format!("Labels file not found: {}", labels_path.display())));
        }

        let labels_text = fs::read_to_string(labels_path).map_err(|e| {
            error!("Failed to read labels: {}", e);
            ClassifierError::ModelLoad(format!("Failed to read labels: {}", e))
        })?;
        let labels = parse_labels(&labels_text);
        validate_labels(&labels).map_err(|e| ClassifierError::ModelLoad(e.to_string()))?;
        info!("Loaded {} labels from {}", labels.len(), labels_path.display());

        // ort errors become ModelLoad through From<ort::Error>
        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(model_path)?;

        let model = OnnxImageModel::new(session, labels, self.preprocessing.clone())?;
        info!("Model structure validated successfully");

        self.model_path = Some(model_path.to_string_lossy().to_string());
        self.labels_path = Some(labels_path.to_string_lossy().to_string());
        self.model = Some(Arc::new(model));
        Ok(self)
    }

    /// Uses an already constructed model, e.g. a different inference backend.
    pub fn with_image_model(mut self, model: Arc<dyn ImageModel>) -> Result<Self, ClassifierError> {
        if self.model.is_some() {
            return Err(ClassifierError::ValidationError("Model already set".to_string()));
        }
        self.model = Some(model);
        Ok(self)
    }

    /// Builds and returns the final Classifier instance
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The constructed Classifier if successful, or an error if:
    ///   - No model has been set
    ///   - The model's vocabulary is empty, has blank labels or duplicates
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let model = self.model
            .ok_or_else(|| ClassifierError::ValidationError("A model must be set".to_string()))?;
        validate_labels(model.labels())?;

        Ok(Classifier {
            model_path: self.model_path,
            labels_path: self.labels_path,
            model,
        })
    }
}

pub(crate) fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Validates a label vocabulary according to the following rules:
/// - At least one label, at most `MAX_LABELS`
/// - No label is blank
/// - Labels are unique
pub(crate) fn validate_labels(labels: &[String]) -> Result<(), ClassifierError> {
    if labels.is_empty() {
        return Err(ClassifierError::ValidationError("Label vocabulary cannot be empty".into()));
    }
    if labels.len() > MAX_LABELS {
        return Err(ClassifierError::ValidationError(
            format!("Maximum number of labels ({}) exceeded", MAX_LABELS)
        ));
    }
    if let Some(pos) = labels.iter().position(|l| l.trim().is_empty()) {
        return Err(ClassifierError::ValidationError(
            format!("Label {} cannot be empty", pos + 1)
        ));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
        return Err(ClassifierError::ValidationError(
            format!("Duplicate label '{}'", dup)
        ));
    }
    Ok(())
}
