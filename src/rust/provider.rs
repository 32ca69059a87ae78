//! Process-wide, load-once access to the classifier.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use log::{error, info};
use tokio::sync::Mutex;

use crate::classifier::{Classifier, ClassifierError, Preprocessing};
use crate::model_manager::{ModelManager, ModelSource};
use crate::runtime::RuntimeConfig;

type LoadFuture = Pin<Box<dyn Future<Output = Result<Classifier, ClassifierError>> + Send>>;
type Loader = Box<dyn Fn() -> LoadFuture + Send + Sync>;

/// Lazily loads the classifier on first use and hands out the same instance afterwards.
///
/// Loading happens at most once per provider, even when many requests ask for
/// the model at the same moment: the first caller loads while the others wait
/// on the guard. A failed load memoizes nothing, so the error reaches the
/// caller and the next explicit request starts a fresh attempt.
pub struct ModelProvider {
    loader: Loader,
    model: OnceLock<Arc<Classifier>>,
    init_lock: Mutex<()>,
}

impl ModelProvider {
    /// Creates a provider around an arbitrary async loader.
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Classifier, ClassifierError>> + Send + 'static,
    {
        Self {
            loader: Box::new(move || Box::pin(loader())),
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Creates a provider that downloads `source` through `manager` if needed
    /// and then loads it with the ONNX backend.
    pub fn from_source(manager: ModelManager, source: ModelSource, runtime_config: RuntimeConfig) -> Self {
        Self::from_source_with(manager, source, runtime_config, Preprocessing::default())
    }

    pub fn from_source_with(
        manager: ModelManager,
        source: ModelSource,
        runtime_config: RuntimeConfig,
        preprocessing: Preprocessing,
    ) -> Self {
        Self::new(move || {
            let manager = manager.clone();
            let source = source.clone();
            let runtime_config = runtime_config.clone();
            let preprocessing = preprocessing.clone();
            async move {
                manager.download_model(&source).await?;
                let model_path = manager.get_model_path(&source.name);
                let labels_path = manager.get_labels_path(&source.name);

                // Session creation is blocking work
                tokio::task::spawn_blocking(move || {
                    Classifier::builder()
                        .with_runtime_config(runtime_config)
                        .with_preprocessing(preprocessing)
                        .with_model_files(&model_path, &labels_path)?
                        .build()
                })
                .await
                .map_err(|e| ClassifierError::ModelLoad(format!("Model loading task failed: {}", e)))?
            }
        })
    }

    /// Returns the loaded classifier, loading it first if this is the first call.
    ///
    /// # Errors
    /// - `ModelLoad` if the artifact cannot be fetched or loaded
    pub async fn get_model(&self) -> Result<Arc<Classifier>, ClassifierError> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        let _guard = self.init_lock.lock().await;
        // Another caller may have finished loading while we waited
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        info!("Loading classifier model...");
        let classifier = match (self.loader)().await {
            Ok(classifier) => classifier,
            Err(e) => {
                error!("Failed to load classifier model: {}", e);
                return Err(match e {
                    ClassifierError::ModelLoad(_) => e,
                    other => ClassifierError::ModelLoad(other.to_string()),
                });
            }
        };
        info!("Classifier model loaded with {} labels", classifier.labels().len());

        let model = Arc::new(classifier);
        let _ = self.model.set(Arc::clone(&model));
        Ok(model)
    }

    /// Whether the model has been loaded, without triggering a load.
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// The label vocabulary if the model is already loaded.
    pub fn loaded_labels(&self) -> Option<Vec<String>> {
        self.model.get().map(|m| m.labels().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{CanonicalImage, ImageModel, ModelOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Uniform(Vec<String>);

    impl ImageModel for Uniform {
        fn labels(&self) -> &[String] {
            &self.0
        }

        fn predict(&self, _image: &CanonicalImage) -> Result<ModelOutput, ClassifierError> {
            Ok(ModelOutput {
                predicted_index: 0,
                probabilities: vec![1.0 / self.0.len() as f32; self.0.len()],
            })
        }
    }

    fn counting_provider(loads: Arc<AtomicUsize>) -> ModelProvider {
        ModelProvider::new(move || {
            let loads = Arc::clone(&loads);
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Classifier::builder()
                    .with_image_model(Arc::new(Uniform(vec!["a".into(), "b".into()])))?
                    .build()
            }
        })
    }

    #[tokio::test]
    async fn test_loads_once() -> Result<(), ClassifierError> {
        let loads = Arc::new(AtomicUsize::new(0));
        let provider = counting_provider(Arc::clone(&loads));
        assert!(!provider.is_loaded());

        let first = provider.get_model().await?;
        let second = provider.get_model().await?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(provider.is_loaded());
        assert_eq!(provider.loaded_labels(), Some(vec!["a".to_string(), "b".to_string()]));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(counting_provider(Arc::clone(&loads)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move { provider.get_model().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_and_not_memoized() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let provider = ModelProvider::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClassifierError::ValidationError("bad vocabulary".into()))
            }
        });

        let err = provider.get_model().await.unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_)));
        assert!(!provider.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // Only an explicit second request tries again
        assert!(provider.get_model().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_source_unreachable_is_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        let source = ModelSource::new("none", "http://127.0.0.1:9/m.onnx", "http://127.0.0.1:9/l.txt");
        let provider = ModelProvider::from_source(manager, source, RuntimeConfig::default());
        assert!(matches!(provider.get_model().await, Err(ClassifierError::ModelLoad(_))));
    }
}
