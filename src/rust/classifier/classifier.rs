use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::error::ClassifierError;
use super::model::ImageModel;
use super::normalizer::CanonicalImage;
use super::utils::DISTRIBUTION_TOLERANCE;

/// One entry of a ranked prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub probability: f32,
}

impl LabelScore {
    /// The probability as a percentage in `[0, 100]`.
    pub fn percent(&self) -> f32 {
        self.probability * 100.0
    }
}

/// The outcome of classifying one image.
///
/// `ranked` holds exactly one entry per vocabulary label, ordered by
/// probability descending with ties in vocabulary order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_label: String,
    pub predicted_index: usize,
    pub ranked: Vec<LabelScore>,
}

impl PredictionResult {
    pub fn probability(&self, label: &str) -> Option<f32> {
        self.ranked
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.probability)
    }

    pub fn probabilities(&self) -> HashMap<String, f32> {
        self.ranked
            .iter()
            .map(|s| (s.label.clone(), s.probability))
            .collect()
    }

    pub fn is_predicted(&self, label: &str) -> bool {
        self.predicted_label == label
    }
}

/// A thread-safe image classifier around a loaded [`ImageModel`].
///
/// The classifier is immutable once built and is shared between sessions through `Arc`.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use imagelens::{normalize, Classifier};
///
/// let classifier = Classifier::builder()
///     .with_model_files("model.onnx", "labels.txt")?
///     .build()?;
///
/// let image = normalize(&std::fs::read("photo.jpg")?)?;
/// let (label, scores) = classifier.predict(&image)?;
/// println!("{}: {:.2}", label, scores[&label]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Classifier {
    pub(crate) model_path: Option<String>,
    pub(crate) labels_path: Option<String>,
    pub(crate) model: Arc<dyn ImageModel>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("model_path", &self.model_path)
            .field("labels_path", &self.labels_path)
            .field("labels", &self.model.labels())
            .finish()
    }
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    /// The label vocabulary, in model order.
    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    /// Returns information about the loaded model
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            model_path: self.model_path.clone(),
            labels_path: self.labels_path.clone(),
            num_classes: self.labels().len(),
            class_labels: self.labels().to_vec(),
        }
    }

    /// Predicts the label of the image and returns the probability of every label.
    pub fn predict(&self, image: &CanonicalImage) -> Result<(String, HashMap<String, f32>), ClassifierError> {
        let result = self.classify(image)?;
        let probabilities = result.probabilities();
        Ok((result.predicted_label, probabilities))
    }

    /// Runs inference and ranks every label by probability.
    ///
    /// The predicted label is the one the model designates, even when another
    /// label ties with it after ranking.
    ///
    /// # Errors
    /// - `PredictionError` if inference fails
    /// - `PredictionError` if the model output does not cover the vocabulary,
    ///   contains values outside `[0, 1]`, or does not sum to 1
    pub fn classify(&self, image: &CanonicalImage) -> Result<PredictionResult, ClassifierError> {
        let output = self.model.predict(image)?;
        rank(self.labels(), output.predicted_index, &output.probabilities)
    }
}

/// Pairs labels with probabilities and sorts them, validating the result invariants.
pub(crate) fn rank(
    labels: &[String],
    predicted_index: usize,
    probabilities: &[f32],
) -> Result<PredictionResult, ClassifierError> {
    if probabilities.len() != labels.len() {
        return Err(ClassifierError::PredictionError(format!(
            "Expected {} probabilities, got {}",
            labels.len(),
            probabilities.len()
        )));
    }
    if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
        return Err(ClassifierError::PredictionError(
            format!("Probability {} is outside [0, 1]", bad)
        ));
    }
    let total: f32 = probabilities.iter().sum();
    if (total - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(ClassifierError::PredictionError(
            format!("Probabilities sum to {}, expected 1", total)
        ));
    }
    let predicted_label = labels.get(predicted_index).cloned().ok_or_else(|| {
        ClassifierError::PredictionError(format!(
            "Predicted index {} is outside the vocabulary of {} labels",
            predicted_index,
            labels.len()
        ))
    })?;

    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &probability)| LabelScore {
            label: label.clone(),
            probability,
        })
        .collect();
    // sort_by is stable, so equal probabilities keep vocabulary order
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    Ok(PredictionResult {
        predicted_label,
        predicted_index,
        ranked,
    })
}
