//! Ferry Gateway
//!
//! The HTTP retrieval endpoint: `GET /blob/{id}` resolves an identifier
//! through the registry and streams the blob back. Unknown identifiers and
//! artifacts that vanished before the fetch are both answered with 403 so a
//! guessing client cannot tell the two apart. Retrieval accounting is tied to
//! the response body stream; when the transfer ends (complete or not) the
//! entry is notified by drop.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::debug;

use ferry_registry::BlobRegistry;

/// Build the gateway router over a shared registry.
pub fn router(registry: Arc<BlobRegistry>) -> Router {
  Router::new()
    .route("/blob/{id}", get(get_blob))
    .with_state(registry)
}

async fn get_blob(
  State(registry): State<Arc<BlobRegistry>>,
  Path(id): Path<String>,
) -> Response {
  let Some(blob) = registry.lookup(&id) else {
    debug!(id = %id, "blob lookup miss");
    return forbidden();
  };

  let stream = match blob.open().await {
    Ok(stream) => stream,
    Err(e) => {
      debug!(id = %id, error = %e, "blob could not be opened");
      return forbidden();
    }
  };

  let mut headers = HeaderMap::new();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
  if let Some(len) = blob.content_length() {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
  }
  (headers, Body::from_stream(stream)).into_response()
}

fn forbidden() -> Response {
  (StatusCode::FORBIDDEN, "Forbidden").into_response()
}
