mod builder;
#[allow(clippy::module_inception)]
mod classifier;
mod error;
mod model;
mod normalizer;
mod utils;

pub use builder::ClassifierBuilder;
pub use classifier::{Classifier, LabelScore, PredictionResult};
pub use error::ClassifierError;
pub use model::{ImageModel, ModelOutput, OnnxImageModel, Preprocessing, ResizeMode};
pub use normalizer::{normalize, CanonicalImage};

/// Information about a loaded classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    pub model_path: Option<String>,
    pub labels_path: Option<String>,
    pub num_classes: usize,
    pub class_labels: Vec<String>,
}
