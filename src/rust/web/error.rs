//! Error handling for the HTTP surface

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use log::error;

use super::render::{page, PageView};
use crate::classifier::ClassifierError;

pub type WebResult<T> = Result<T, WebError>;

#[derive(Debug)]
pub enum WebError {
    /// A classification step failed
    Classifier(ClassifierError),
    /// The request body could not be read
    BadRequest(String),
    InternalError(String),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Classifier(e) => classifier_status(e),
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the visitor.
    pub fn message(&self) -> String {
        match self {
            WebError::Classifier(ClassifierError::UnsupportedImageFormat(_)) => {
                "The file could not be read as an image. Try a JPEG, PNG, WebP or TIFF file.".to_string()
            }
            WebError::Classifier(ClassifierError::ModelLoad(msg)) => {
                format!("The classifier model is not available right now: {}", msg)
            }
            WebError::Classifier(e) => e.to_string(),
            WebError::BadRequest(msg) => format!("Bad request: {}", msg),
            WebError::InternalError(_) => "Internal server error".to_string(),
        }
    }
}

pub fn classifier_status(err: &ClassifierError) -> StatusCode {
    // Nothing can be predicted until the model loads
    if err.is_fatal() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match err {
        ClassifierError::UnsupportedImageFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClassifierError::ValidationError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ClassifierError> for WebError {
    fn from(err: ClassifierError) -> Self {
        WebError::Classifier(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        let view = PageView {
            error: Some(self.message()),
            ..PageView::default()
        };
        (status, Html(page(&view))).into_response()
    }
}
