use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use inkframe_core::{
    Carousel, FrameConfig, FrameError, Gallery, PreviewCache, PreviewFrame, PreviewKey,
    StatusFacade,
};

/// Shared handles the HTTP handlers operate on.
#[derive(Clone)]
pub struct AppState {
    pub carousel: Arc<Carousel>,
    pub cache: Arc<PreviewCache>,
    pub status: Arc<StatusFacade>,
    pub gallery: Arc<dyn Gallery>,
    pub config: FrameConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_endpoint))
        .route("/carousel/start", post(carousel_start))
        .route("/carousel/stop", post(carousel_stop))
        .route("/display", post(display_now))
        .route("/preview", get(preview))
        .route("/preview/meta", get(preview_meta))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StartParams {
    minutes: Option<String>,
}

async fn carousel_start(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Response {
    let minutes = match params.minutes {
        None => state.config.carousel.minutes,
        Some(raw) => match raw.parse::<u64>() {
            Ok(minutes) if minutes >= 1 => minutes,
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "minutes must be a whole number >= 1",
                )
            }
        },
    };

    let interval = Duration::from_secs(minutes.saturating_mul(60));
    match state.carousel.start(Some(interval)) {
        Ok(()) => ok_response(),
        Err(err) => frame_error_response(err),
    }
}

async fn carousel_stop(State(state): State<AppState>) -> Response {
    match state.carousel.stop() {
        Ok(()) => ok_response(),
        Err(err) => frame_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct DisplayParams {
    file: Option<String>,
}

async fn display_now(
    State(state): State<AppState>,
    Query(params): Query<DisplayParams>,
) -> Response {
    let Some(file) = params.file.filter(|file| !file.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing ?file=");
    };

    let items = match state.gallery.list() {
        Ok(items) => items,
        Err(err) => return frame_error_response(err),
    };
    if !items.iter().any(|item| item == &file) {
        return error_response(StatusCode::NOT_FOUND, "image not found");
    }

    match state.carousel.display_now(&file) {
        Ok(()) => ok_response(),
        Err(err) => frame_error_response(err),
    }
}

async fn status_endpoint(State(state): State<AppState>) -> Response {
    match state.status.report() {
        Ok(report) => Json(report).into_response(),
        Err(err) => frame_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct PreviewParams {
    layout: Option<String>,
    theme: Option<String>,
    refresh: Option<String>,
}

async fn preview(State(state): State<AppState>, Query(params): Query<PreviewParams>) -> Response {
    let key = PreviewKey::new(params.layout.as_deref(), params.theme.as_deref());
    let force = matches!(params.refresh.as_deref(), Some("1") | Some("true"));

    let frame = match render_preview(&state, &key, force).await {
        Ok(frame) => frame,
        Err(err) => return frame_error_response(err),
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    insert_preview_headers(&mut headers, &frame);

    (headers, frame.bytes.to_vec()).into_response()
}

async fn preview_meta(
    State(state): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Response {
    let key = PreviewKey::new(params.layout.as_deref(), params.theme.as_deref());
    let force = matches!(params.refresh.as_deref(), Some("1") | Some("true"));

    match render_preview(&state, &key, force).await {
        Ok(frame) => Json(json!({
            "ok": true,
            "generated_at": frame.iso_timestamp(),
            "stale": frame.stale,
            "cache": frame.cache.as_str(),
            "layout": frame.layout,
            "theme": frame.theme,
            "source": frame.source,
            "size": frame.bytes.len(),
            "render_error": frame.render_error,
        }))
        .into_response(),
        Err(err) => frame_error_response(err),
    }
}

/// Renders (or serves) the preview for the item the carousel currently
/// reports, falling back to the first gallery item before the carousel has
/// ever run, and to the placeholder frame when the gallery is empty.
async fn render_preview(
    state: &AppState,
    key: &PreviewKey,
    force: bool,
) -> inkframe_core::Result<PreviewFrame> {
    let item = current_preview_item(state)?;
    state.cache.get_or_render(item.as_deref(), key, force).await
}

fn current_preview_item(state: &AppState) -> inkframe_core::Result<Option<String>> {
    let snapshot = state.carousel.snapshot()?;
    if snapshot.current_file.is_some() {
        return Ok(snapshot.current_file);
    }
    Ok(state.gallery.list()?.into_iter().next())
}

fn insert_preview_headers(headers: &mut HeaderMap, frame: &PreviewFrame) {
    insert_header(headers, "x-preview-generated-at", &frame.iso_timestamp());
    insert_header(headers, "x-preview-stale", if frame.stale { "1" } else { "0" });
    insert_header(headers, "x-preview-cache", frame.cache.as_str());
    insert_header(headers, "x-preview-layout", &frame.layout);
    insert_header(headers, "x-preview-theme", &frame.theme);
    insert_header(
        headers,
        "x-preview-source",
        frame.source.as_deref().unwrap_or("placeholder"),
    );
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn ok_response() -> Response {
    Json(json!({"ok": true})).into_response()
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({"ok": false, "error": error}))).into_response()
}

fn frame_error_response(err: FrameError) -> Response {
    let status = match &err {
        FrameError::EmptyGallery | FrameError::InvalidInterval => StatusCode::BAD_REQUEST,
        FrameError::RenderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        FrameError::Io(_) | FrameError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}
