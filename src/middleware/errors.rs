use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::error::{ApiError, InternalErrorDetail};
use crate::state::AppState;

/// Logs internal errors and, in development only, exposes their detail in
/// an `error` field of the body.
pub async fn normalize_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    tracing::error!("{} {} failed: {}", method, path, detail);

    if !state.config.is_development() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    let mut body = ApiError::internal(anyhow::anyhow!(detail.clone())).to_json();
    body["error"] = json!(detail);
    parts.headers.remove(header::CONTENT_LENGTH);
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    Response::from_parts(parts, Body::from(bytes))
}

/// Fallback for unknown routes.
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Can't find {} on this server!", uri.path()))
}
