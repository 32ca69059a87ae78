use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use imagelens::config::{parse_resize_mode, DEFAULT_BODY_LIMIT, DEFAULT_MODEL_NAME, DEFAULT_PORT};
use imagelens::model_manager::google_drive_url;
use imagelens::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};
use imagelens::web::{router, AppState};
use imagelens::{AppConfig, ContentTable, ModelProvider, ModelSource, ResizeMode, RuntimeConfig};
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force a fresh download of the model files
    #[arg(short, long)]
    fresh: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, env = "IMAGELENS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Where downloaded models are cached
    #[arg(long, env = "IMAGELENS_CACHE")]
    models_dir: Option<PathBuf>,

    /// Name of the cache entry for the model
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,

    /// URL of the ONNX model file
    #[arg(long, env = "IMAGELENS_MODEL_URL", default_value = "")]
    model_url: String,

    /// URL of the labels file, one label per line
    #[arg(long, env = "IMAGELENS_LABELS_URL", default_value = "")]
    labels_url: String,

    /// Google Drive file id of the model, used when no model URL is given
    #[arg(long)]
    drive_model_id: Option<String>,

    /// Google Drive file id of the labels file, used when no labels URL is given
    #[arg(long)]
    drive_labels_id: Option<String>,

    /// Expected SHA-256 of the model file
    #[arg(long)]
    model_sha256: Option<String>,

    /// Expected SHA-256 of the labels file
    #[arg(long)]
    labels_sha256: Option<String>,

    /// JSON file with the content shown for each label
    #[arg(long)]
    content: Option<PathBuf>,

    /// Load the model before accepting requests
    #[arg(long)]
    eager: bool,

    /// Square input size expected by the model
    #[arg(long, default_value_t = 224)]
    input_size: u32,

    /// How images are fitted to the input size: squish, letterbox or crop
    #[arg(long, default_value = "crop", value_parser = parse_resize_mode)]
    resize: ResizeMode,

    /// Largest accepted upload, in bytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,

    /// Seconds of inactivity after which a session is dropped
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL.as_secs())]
    session_ttl_secs: u64,

    /// Most sessions kept in memory at once
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,
}

impl Args {
    fn into_config(self) -> AppConfig {
        let model_url = match (self.model_url.is_empty(), &self.drive_model_id) {
            (true, Some(id)) => google_drive_url(id),
            _ => self.model_url,
        };
        let labels_url = match (self.labels_url.is_empty(), &self.drive_labels_id) {
            (true, Some(id)) => google_drive_url(id),
            _ => self.labels_url,
        };

        AppConfig {
            host: self.host,
            port: self.port,
            models_dir: self.models_dir,
            source: ModelSource::new(self.model_name, model_url, labels_url)
                .with_hashes(self.model_sha256, self.labels_sha256),
            content_path: self.content,
            eager_load: self.eager,
            fresh: self.fresh,
            input_size: self.input_size,
            resize: self.resize,
            body_limit: self.body_limit,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            max_sessions: self.max_sessions,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Args::parse().into_config();

    info!("=== Starting image classifier demo ===");

    let manager = config.model_manager().context("Failed to prepare the model cache")?;
    info!("Model cache: {}", manager.models_dir().display());

    if config.fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(&config.source.name)?;
    }

    if config.source.model_url.is_empty() && !manager.is_model_downloaded(&config.source.name) {
        warn!(
            "No model URL configured and no cached model named '{}'; predictions will fail until one is provided",
            config.source.name
        );
    }

    let provider = Arc::new(ModelProvider::from_source_with(
        manager,
        config.source.clone(),
        RuntimeConfig::default(),
        config.preprocessing(),
    ));

    if config.eager_load {
        let classifier = provider.get_model().await.context("Failed to load the model")?;
        info!("Model ready: {:?}", classifier.info());
    }

    let authoring = match &config.content_path {
        Some(path) => ContentTable::load_authoring(path)?,
        None => ContentTable::builtin_authoring(),
    };
    info!("Loaded {} content entries", authoring.len());

    let state = AppState::new(provider, authoring)
        .with_body_limit(config.body_limit)
        .with_sessions(config.session_store());
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
