use std::collections::HashMap;
use std::fmt;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use super::error::ClassifierError;
use super::normalizer::CanonicalImage;
use super::utils::{argmax, is_distribution, softmax};

/// What a model reports for one image: its own top index and one probability per label.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub predicted_index: usize,
    pub probabilities: Vec<f32>,
}

/// A pretrained image classifier with a fixed label vocabulary.
///
/// Implementations must be `Send + Sync`; a single loaded model is shared by
/// every session for the lifetime of the process.
pub trait ImageModel: Send + Sync {
    /// The ordered label vocabulary. Index `i` of every [`ModelOutput::probabilities`]
    /// refers to `labels()[i]`.
    fn labels(&self) -> &[String];

    /// Runs inference on an upright RGB image.
    fn predict(&self, image: &CanonicalImage) -> Result<ModelOutput, ClassifierError>;
}

/// How the image is brought to the model's input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Stretch to the target size, ignoring aspect ratio
    Squish,
    /// Scale to fit and pad the remainder with black
    Letterbox,
    /// Scale to cover and crop the center
    CenterCrop,
}

/// Input preparation for the ONNX backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessing {
    pub width: u32,
    pub height: u32,
    pub resize: ResizeMode,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessing {
    fn default() -> Self {
        // ImageNet statistics, which most pretrained vision backbones expect
        Self {
            width: 224,
            height: 224,
            resize: ResizeMode::CenterCrop,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Preprocessing {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        if self.width == 0 || self.height == 0 {
            return Err(ClassifierError::ValidationError(
                format!("Input size must be positive, got {}x{}", self.width, self.height)
            ));
        }
        if self.std.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(ClassifierError::ValidationError(
                "Normalization std values must be positive".into()
            ));
        }
        Ok(())
    }

    fn fit(&self, image: &RgbImage) -> RgbImage {
        let (src_w, src_h) = (image.width() as f32, image.height() as f32);
        match self.resize {
            ResizeMode::Squish => {
                imageops::resize(image, self.width, self.height, FilterType::Triangle)
            }
            ResizeMode::Letterbox => {
                let scale = (self.width as f32 / src_w).min(self.height as f32 / src_h);
                let new_w = ((src_w * scale).round() as u32).clamp(1, self.width);
                let new_h = ((src_h * scale).round() as u32).clamp(1, self.height);
                let scaled = imageops::resize(image, new_w, new_h, FilterType::Triangle);

                let mut canvas = RgbImage::new(self.width, self.height);
                let x = ((self.width - new_w) / 2) as i64;
                let y = ((self.height - new_h) / 2) as i64;
                imageops::replace(&mut canvas, &scaled, x, y);
                canvas
            }
            ResizeMode::CenterCrop => {
                // Crop in source coordinates first so the intermediate buffer
                // never exceeds the source, whatever its aspect ratio.
                let (crop_w, crop_h) = self.crop_window(image.width(), image.height());
                let x = (image.width() - crop_w) / 2;
                let y = (image.height() - crop_h) / 2;
                let region = imageops::crop_imm(image, x, y, crop_w, crop_h).to_image();
                imageops::resize(&region, self.width, self.height, FilterType::Triangle)
            }
        }
    }

    /// The largest centered region of a `src_w`×`src_h` image with the input's aspect ratio.
    fn crop_window(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        let target = self.width as f64 / self.height as f64;
        if src_w as f64 / src_h as f64 > target {
            let w = (src_h as f64 * target).round() as u32;
            (w.clamp(1, src_w), src_h)
        } else {
            let h = (src_w as f64 / target).round() as u32;
            (src_w, h.clamp(1, src_h))
        }
    }

    /// Builds the `[1, 3, height, width]` input tensor.
    pub fn to_tensor(&self, image: &CanonicalImage) -> Array4<f32> {
        let fitted = self.fit(image.as_rgb());
        let mut tensor = Array4::<f32>::zeros((1, 3, self.height as usize, self.width as usize));

        for (x, y, pixel) in fitted.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }

        tensor
    }
}

/// [`ImageModel`] backed by an ONNX Runtime session.
///
/// The model is expected to take a single `[1, 3, H, W]` float input and
/// produce one score per label in its first output. Raw logits are turned
/// into probabilities with a softmax; outputs that are already a probability
/// distribution are passed through.
pub struct OnnxImageModel {
    session: Session,
    input_name: String,
    labels: Vec<String>,
    preprocessing: Preprocessing,
}

impl fmt::Debug for OnnxImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxImageModel")
            .field("input_name", &self.input_name)
            .field("labels", &self.labels)
            .field("preprocessing", &self.preprocessing)
            .finish()
    }
}

impl OnnxImageModel {
    pub fn new(
        session: Session,
        labels: Vec<String>,
        preprocessing: Preprocessing,
    ) -> Result<Self, ClassifierError> {
        Self::validate_model(&session)?;
        preprocessing.validate()?;
        let input_name = session.inputs[0].name.clone();
        Ok(Self {
            session,
            input_name,
            labels,
            preprocessing,
        })
    }

    /// Validates that the model has the expected input/output structure
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs.len() != 1 {
            return Err(ClassifierError::ModelLoad(
                format!("Model must have exactly 1 image input, found {}", session.inputs.len())
            ));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelLoad(
                "Model must have at least 1 output for class scores".to_string()
            ));
        }
        Ok(())
    }

    pub fn preprocessing(&self) -> &Preprocessing {
        &self.preprocessing
    }
}

impl ImageModel for OnnxImageModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, image: &CanonicalImage) -> Result<ModelOutput, ClassifierError> {
        let input = self.preprocessing.to_tensor(image);

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), Tensor::from_array(input)
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to create input tensor: {}", e)))?);

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to extract output tensor: {}", e)))?;

        let scores: Vec<f32> = output_tensor.iter().cloned().collect();
        if scores.len() != self.labels.len() {
            return Err(ClassifierError::PredictionError(format!(
                "Model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let probabilities = if is_distribution(&scores) {
            scores
        } else {
            softmax(&scores)
        };
        let predicted_index = argmax(&probabilities)
            .ok_or_else(|| ClassifierError::PredictionError("Model produced no scores".into()))?;

        Ok(ModelOutput {
            predicted_index,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> CanonicalImage {
        CanonicalImage::from_rgb(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    fn identity(size: u32, resize: ResizeMode) -> Preprocessing {
        Preprocessing {
            width: size,
            height: size,
            resize,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    #[test]
    fn test_tensor_shape_and_scaling() {
        let tensor = identity(8, ResizeMode::Squish).to_tensor(&solid(20, 10, [255, 0, 0]));
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert_eq!(tensor[[0, 0, 4, 4]], 1.0);
        assert_eq!(tensor[[0, 1, 4, 4]], 0.0);
        assert_eq!(tensor[[0, 2, 4, 4]], 0.0);
    }

    #[test]
    fn test_mean_std_normalization() {
        let preprocessing = Preprocessing::square(4);
        let tensor = preprocessing.to_tensor(&solid(4, 4, [0, 0, 0]));
        let expected = -0.485 / 0.229;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_letterbox_pads_short_side() {
        let tensor = identity(8, ResizeMode::Letterbox).to_tensor(&solid(16, 8, [255, 255, 255]));
        // 16x8 scales to 8x4, centered vertically: rows 0-1 and 6-7 are padding
        assert_eq!(tensor[[0, 0, 0, 4]], 0.0);
        assert_eq!(tensor[[0, 0, 4, 4]], 1.0);
        assert_eq!(tensor[[0, 0, 7, 4]], 0.0);
    }

    #[test]
    fn test_center_crop_fills_input() {
        let tensor = identity(8, ResizeMode::CenterCrop).to_tensor(&solid(32, 8, [255, 255, 255]));
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert!(tensor.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Red outer thirds, white middle third
        let image = CanonicalImage::from_rgb(RgbImage::from_fn(24, 8, |x, _| {
            if (8..16).contains(&x) { Rgb([255, 255, 255]) } else { Rgb([255, 0, 0]) }
        }));
        let tensor = identity(8, ResizeMode::CenterCrop).to_tensor(&image);
        assert_eq!(tensor[[0, 1, 4, 0]], 1.0);
        assert_eq!(tensor[[0, 1, 4, 7]], 1.0);
    }

    #[test]
    fn test_crop_window() {
        let preprocessing = Preprocessing::square(224);
        assert_eq!(preprocessing.crop_window(640, 480), (480, 480));
        assert_eq!(preprocessing.crop_window(480, 640), (480, 480));
        assert_eq!(preprocessing.crop_window(1, 4000), (1, 1));
        assert_eq!(preprocessing.crop_window(65535, 1), (1, 1));

        let wide = Preprocessing { width: 200, height: 100, ..Preprocessing::default() };
        assert_eq!(wide.crop_window(100, 100), (100, 50));
    }

    #[test]
    fn test_center_crop_on_thin_image_stays_small() {
        let start = std::time::Instant::now();
        let tensor = Preprocessing::default().to_tensor(&solid(1, 4000, [10, 20, 30]));
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        // Cropping first keeps this to a 1x1 region upscaled once
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_preprocessing() {
        let mut preprocessing = Preprocessing::square(0);
        assert!(preprocessing.validate().is_err());
        preprocessing = Preprocessing::default();
        preprocessing.std = [0.0, 1.0, 1.0];
        assert!(preprocessing.validate().is_err());
        assert!(Preprocessing::default().validate().is_ok());
    }
}
