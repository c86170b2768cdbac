//! HTTP surface: the page shell plus a small JSON API driving one session
//! per browser tab.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FlowError, ValidationError};
use crate::predictor::IMAGE_FIELD;
use crate::present::View;
use crate::session::{Session, SessionStore};
use crate::upload::{ImageFile, MAX_UPLOAD_BYTES};

/// Hard cap on request bodies. Above the upload limit so that oversized
/// files still reach validation and get the regular message.
pub const BODY_LIMIT: usize = 12 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone)]
pub struct WebState {
    sessions: Arc<SessionStore>,
}

type ApiError = (StatusCode, Json<Value>);
type ViewResult = Result<(StatusCode, Json<View>), ApiError>;

fn not_found(id: &Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown session", "session_id": id })),
    )
}

fn busy() -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": FlowError::Busy.to_string() })),
    )
}

pub fn router(sessions: Arc<SessionStore>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_view).delete(delete_session))
        .route(
            "/api/sessions/:id/image",
            post(upload_image).delete(clear_image),
        )
        .route("/api/sessions/:id/analyze", post(analyze))
        .route("/api/sessions/:id/reset", post(reset))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
        .with_state(WebState { sessions })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn lookup(state: &WebState, id: &Uuid) -> Result<Arc<Session>, ApiError> {
    state.sessions.get(id).ok_or_else(|| not_found(id))
}

async fn create_session(State(state): State<WebState>) -> (StatusCode, Json<Value>) {
    let session = state.sessions.create();
    let view = session.view().await;
    (
        StatusCode::CREATED,
        Json(json!({ "session_id": session.id(), "view": view })),
    )
}

async fn get_view(State(state): State<WebState>, Path(id): Path<Uuid>) -> ViewResult {
    let session = lookup(&state, &id)?;
    Ok((StatusCode::OK, Json(session.view().await)))
}

async fn delete_session(State(state): State<WebState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.sessions.remove(&id) {
        info!(session = %id, live = state.sessions.len(), "session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn upload_image(
    State(state): State<WebState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ViewResult {
    let session = lookup(&state, &id)?;

    let outcome = match read_image_field(&mut multipart).await {
        Ok(file) => session.select_file(file).await,
        Err(err) => match session.reject_file(&err).await {
            Ok(()) => Err(FlowError::Validation(err)),
            Err(flow_err) => Err(flow_err),
        },
    };

    match outcome {
        Ok(view) => Ok((StatusCode::OK, Json(view))),
        Err(FlowError::Validation(_)) => {
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(session.view().await)))
        }
        Err(FlowError::Busy) => Err(busy()),
    }
}

/// Pulls the `image` part out of the form; other parts are skipped.
async fn read_image_field(multipart: &mut Multipart) -> Result<ImageFile, ValidationError> {
    while let Some(field) = multipart.next_field().await.map_err(body_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("image").to_string();
        let mime = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(body_error)?;
        return Ok(ImageFile::new(file_name, mime, data.to_vec()));
    }

    Err(ValidationError::Unreadable)
}

fn body_error(err: MultipartError) -> ValidationError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::TooLarge {
            size: MAX_UPLOAD_BYTES + 1,
        }
    } else {
        warn!(error = %err, "malformed upload body");
        ValidationError::Unreadable
    }
}

async fn clear_image(State(state): State<WebState>, Path(id): Path<Uuid>) -> ViewResult {
    let session = lookup(&state, &id)?;
    match session.clear_selection().await {
        Ok(view) => Ok((StatusCode::OK, Json(view))),
        Err(_) => Err(busy()),
    }
}

/// 202 when a request went out, 200 when the trigger was a no-op.
async fn analyze(State(state): State<WebState>, Path(id): Path<Uuid>) -> ViewResult {
    let session = lookup(&state, &id)?;
    let status = match session.analyze().await {
        Some(_cycle) => StatusCode::ACCEPTED,
        None => StatusCode::OK,
    };
    Ok((status, Json(session.view().await)))
}

async fn reset(State(state): State<WebState>, Path(id): Path<Uuid>) -> ViewResult {
    let session = lookup(&state, &id)?;
    session.reset().await;
    Ok((StatusCode::OK, Json(session.view().await)))
}
