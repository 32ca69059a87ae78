use ort::Error as OrtError;
use std::fmt;

use crate::model_manager::ModelError;

/// Represents the different types of errors that can occur while classifying images.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// The model artifact could not be fetched or loaded
    ModelLoad(String),
    /// The supplied bytes could not be decoded as an image
    UnsupportedImageFormat(String),
    /// Inference failed or the model produced output that breaks the result invariants
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    ValidationError(String),
}

impl ClassifierError {
    /// Whether the error leaves the session unable to produce any prediction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad(_))
    }
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoad(msg) => write!(f, "Model load error: {}", msg),
            Self::UnsupportedImageFormat(msg) => write!(f, "Unsupported image format: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ClassifierError {}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}

impl From<ModelError> for ClassifierError {
    fn from(err: ModelError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_model_load_is_fatal() {
        assert!(ClassifierError::ModelLoad("gone".into()).is_fatal());
        assert!(!ClassifierError::UnsupportedImageFormat("x".into()).is_fatal());
        assert!(!ClassifierError::PredictionError("x".into()).is_fatal());
        assert!(!ClassifierError::ValidationError("x".into()).is_fatal());
    }

    #[test]
    fn test_model_error_becomes_model_load() {
        let err = ClassifierError::from(ModelError::NotDownloaded("model.onnx".into()));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("model.onnx"));
    }
}
