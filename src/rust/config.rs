//! Application configuration

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::classifier::{Preprocessing, ResizeMode};
use crate::model_manager::{ModelManager, ModelSource};
use crate::session::{SessionStore, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};

pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_MODEL_NAME: &str = "default";
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Everything the server needs to start, resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Overrides the cache directory resolved by [`ModelManager::get_default_models_dir`]
    pub models_dir: Option<PathBuf>,
    pub source: ModelSource,
    /// JSON content file; the built-in table is used when unset
    pub content_path: Option<PathBuf>,
    /// Load the model at startup instead of on the first prediction
    pub eager_load: bool,
    /// Delete any cached artifact before starting
    pub fresh: bool,
    pub input_size: u32,
    pub resize: ResizeMode,
    /// Largest accepted upload, in bytes
    pub body_limit: usize,
    /// Idle time after which a visitor's session is dropped
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            models_dir: None,
            source: ModelSource::new(DEFAULT_MODEL_NAME, "", ""),
            content_path: None,
            eager_load: false,
            fresh: false,
            input_size: 224,
            resize: ResizeMode::CenterCrop,
            body_limit: DEFAULT_BODY_LIMIT,
            session_ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn model_manager(&self) -> io::Result<ModelManager> {
        match &self.models_dir {
            Some(dir) => ModelManager::new(dir),
            None => ModelManager::new_default(),
        }
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::with_limits(self.session_ttl, self.max_sessions)
    }

    pub fn preprocessing(&self) -> Preprocessing {
        Preprocessing {
            resize: self.resize,
            ..Preprocessing::square(self.input_size)
        }
    }
}

/// Parses a resize mode name as accepted on the command line.
pub fn parse_resize_mode(value: &str) -> Result<ResizeMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "squish" => Ok(ResizeMode::Squish),
        "letterbox" | "pad" => Ok(ResizeMode::Letterbox),
        "crop" | "center-crop" => Ok(ResizeMode::CenterCrop),
        other => Err(format!("unknown resize mode '{}' (expected squish, letterbox or crop)", other)),
    }
}
