//! Request handlers

use axum::{
    extract::{Multipart, Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{classifier_status, WebError};
use super::render::{page, PageView, ResultView};
use super::AppState;
use crate::classifier::{normalize, ClassifierError};
use crate::session::SessionState;

pub const SESSION_COOKIE: &str = "imagelens_session";

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub label: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_loaded: bool,
}

/// The visitor's session id, and whether it was just minted.
fn session_id(headers: &HeaderMap) -> (Uuid, bool) {
    let existing = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok());

    match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4(), true),
    }
}

fn with_session_cookie(mut response: Response, id: Uuid, is_new: bool) -> Response {
    if is_new {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Renders the page for one session snapshot. No inference or image decoding happens here.
fn render_session(state: &AppState, session: &SessionState, error: Option<String>) -> String {
    let labels = state.provider.loaded_labels();

    let result = match (&session.last_prediction, &labels) {
        (Some(prediction), Some(labels)) => {
            let panel_label = session
                .panel_label(labels)
                .unwrap_or(prediction.predicted_label.as_str());
            let content = state.content_table(labels).lookup(panel_label);
            Some(ResultView {
                image_data_uri: session.current_image.as_deref(),
                prediction,
                labels,
                panel_label,
                content,
            })
        }
        _ => None,
    };

    page(&PageView {
        error,
        labels: labels.as_deref(),
        result,
    })
}

pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IndexQuery>,
) -> Response {
    let (id, is_new) = session_id(&headers);

    if let Some(label) = query.label {
        let known = state
            .provider
            .loaded_labels()
            .map(|labels| labels.contains(&label))
            .unwrap_or(false);
        if known {
            state
                .sessions
                .update(id, |session| session.selected_label = Some(label))
                .await;
        } else {
            debug!("Ignoring selection of unknown label '{}'", label);
        }
    }

    let session = state.sessions.get(id).await;
    let html = render_session(&state, &session, None);
    with_session_cookie(Html(html).into_response(), id, is_new)
}

/// Reads the submitted image. An upload wins over a camera snapshot.
async fn read_image(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, WebError> {
    let mut camera = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| WebError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            continue;
        }
        match name.as_str() {
            "upload" => upload = Some(bytes.to_vec()),
            "camera" => camera = Some(bytes.to_vec()),
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(upload.or(camera))
}

pub async fn predict(State(state): State<AppState>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let (id, is_new) = session_id(&headers);

    let bytes = match read_image(&mut multipart).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return with_session_cookie(Redirect::to("/").into_response(), id, is_new),
        Err(e) => return with_session_cookie(e.into_response(), id, is_new),
    };

    let outcome = match state.provider.get_model().await {
        Ok(classifier) => tokio::task::spawn_blocking(move || {
            let image = normalize(&bytes)?;
            let prediction = classifier.classify(&image)?;
            // Encoded once here so later page views only reuse it
            let image_data_uri = image
                .to_data_uri()
                .map_err(|e| ClassifierError::PredictionError(e.to_string()))?;
            Ok::<_, ClassifierError>((image_data_uri, prediction))
        })
        .await
        .map_err(|e| WebError::InternalError(format!("Prediction task failed: {}", e))),
        Err(e) => Ok(Err(e)),
    };

    let response = match outcome {
        Ok(Ok((image_data_uri, prediction))) => {
            info!(
                "Predicted '{}' ({:.2}%)",
                prediction.predicted_label,
                prediction.probability(&prediction.predicted_label).unwrap_or(0.0) * 100.0
            );
            state
                .sessions
                .update(id, |session| session.record(image_data_uri, prediction))
                .await;
            Redirect::to("/").into_response()
        }
        Ok(Err(e)) => {
            warn!("Prediction request failed: {}", e);
            let status = classifier_status(&e);
            let message = WebError::from(e).message();
            // The previous image and prediction stay as they were
            let session = state.sessions.get(id).await;
            let html = render_session(&state, &session, Some(message));
            (status, Html(html)).into_response()
        }
        Err(e) => e.into_response(),
    };

    with_session_cookie(response, id, is_new)
}

pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, _) = session_id(&headers);
    if state.sessions.end(id).await {
        debug!("Session {} ended", id);
    }

    let mut response = Redirect::to("/").into_response();
    let expired = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE);
    if let Ok(value) = HeaderValue::from_str(&expired) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            model_loaded: state.provider.is_loaded(),
        }),
    )
}
