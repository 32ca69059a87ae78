//! The single-page web front end.
//!
//! Routes:
//!
//! - `GET /` renders the page; `?label=` picks which label's content is shown
//! - `POST /predict` takes a multipart image (`camera` or `upload`) and classifies it
//! - `POST /reset` forgets the visitor's session
//! - `GET /health` reports liveness and whether the model is loaded

mod error;
mod handlers;
pub mod render;

use std::sync::{Arc, OnceLock};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::config::DEFAULT_BODY_LIMIT;
use crate::content::{ContentAuthoring, ContentTable};
use crate::provider::ModelProvider;
use crate::session::SessionStore;

pub use error::{classifier_status, WebError, WebResult};
pub use handlers::SESSION_COOKIE;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<ModelProvider>,
    authoring: Arc<Vec<ContentAuthoring>>,
    content: Arc<OnceLock<ContentTable>>,
    pub sessions: SessionStore,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(provider: Arc<ModelProvider>, authoring: Vec<ContentAuthoring>) -> Self {
        Self {
            provider,
            authoring: Arc::new(authoring),
            content: Arc::new(OnceLock::new()),
            sessions: SessionStore::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    /// The content table, resolved against `vocabulary` the first time it is needed.
    pub fn content_table(&self, vocabulary: &[String]) -> &ContentTable {
        self.content
            .get_or_init(|| ContentTable::resolve(self.authoring.as_ref().clone(), vocabulary))
    }
}

/// Create the router with all routes
pub fn router(state: AppState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(handlers::index))
        .route("/predict", post(handlers::predict))
        .route("/reset", post(handlers::reset))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
