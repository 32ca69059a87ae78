//! An image classification demo built around a pretrained ONNX classifier.
//!
//! The crate is organised as a short pipeline:
//!
//! 1. [`ModelProvider`] fetches the model artifact once (through [`ModelManager`])
//!    and memoizes the loaded [`Classifier`] for the life of the process.
//! 2. [`normalize`] turns uploaded bytes into an upright RGB [`CanonicalImage`].
//! 3. [`Classifier::classify`] runs inference and ranks every label.
//! 4. [`ContentTable::lookup`] maps a label to its authored texts, images and videos.
//! 5. The [`web`] module renders all of it as a single HTML page.
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use imagelens::{normalize, ContentTable, ModelManager, ModelProvider, ModelSource, RuntimeConfig};
//!
//! let manager = ModelManager::new_default()?;
//! let source = ModelSource::new(
//!     "wheat",
//!     "https://example.com/model.onnx",
//!     "https://example.com/labels.txt",
//! );
//! let provider = ModelProvider::from_source(manager, source, RuntimeConfig::default());
//!
//! let classifier = provider.get_model().await?;
//! let image = normalize(&std::fs::read("photo.jpg")?)?;
//! let prediction = classifier.classify(&image)?;
//!
//! let content = ContentTable::builtin(classifier.labels());
//! let entry = content.lookup(&prediction.predicted_label);
//! println!("{} -> {} texts", prediction.predicted_label, entry.texts.len());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod content;
pub mod model_manager;
pub mod provider;
mod runtime;
pub mod session;
pub mod video;
pub mod web;

pub use classifier::{
    normalize, CanonicalImage, Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo,
    ImageModel, LabelScore, ModelOutput, OnnxImageModel, Preprocessing, PredictionResult, ResizeMode,
};
pub use config::AppConfig;
pub use content::{ContentAuthoring, ContentEntry, ContentKey, ContentTable};
pub use model_manager::{ModelError, ModelManager, ModelSource};
pub use provider::ModelProvider;
pub use runtime::{create_session_builder, RuntimeConfig};
pub use session::{SessionState, SessionStore};
pub use video::{thumbnail_url, video_id};

pub fn init_logger() {
    env_logger::init();
}
