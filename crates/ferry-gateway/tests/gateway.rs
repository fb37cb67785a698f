//! Router tests for the blob retrieval endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use ferry_config::BlobConfig;
use ferry_gateway::router;
use ferry_registry::{BlobRegistry, ByteStream};
use http_body_util::BodyExt as _;
use tower::ServiceExt;

fn test_registry(dir: &tempfile::TempDir) -> Arc<BlobRegistry> {
  Arc::new(BlobRegistry::new(BlobConfig {
    dir: dir.path().to_path_buf(),
    ..BlobConfig::default()
  }))
}

fn write_temp_file(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
  let path = dir.path().join(uuid::Uuid::new_v4().to_string());
  std::fs::write(&path, contents).unwrap();
  path
}

async fn fetch(registry: &Arc<BlobRegistry>, id: &str) -> axum::response::Response {
  router(Arc::clone(registry))
    .oneshot(
      Request::builder()
        .uri(format!("/blob/{id}"))
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_fetch_streams_file_contents() {
  let dir = tempfile::tempdir().unwrap();
  let registry = test_registry(&dir);
  let path = write_temp_file(&dir, b"file contents");
  let id = registry.register(&path, Duration::from_secs(60), 1);

  let response = fetch(&registry, &id).await;

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers().get(header::CONTENT_TYPE).unwrap(),
    "application/octet-stream"
  );
  assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "13");

  let body = response.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body.as_ref(), b"file contents");
}

#[tokio::test]
async fn test_unknown_id_is_forbidden() {
  let dir = tempfile::tempdir().unwrap();
  let registry = test_registry(&dir);

  let response = fetch(&registry, "definitely-not-issued").await;

  assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_completed_blob_is_forbidden_on_refetch() {
  let dir = tempfile::tempdir().unwrap();
  let registry = test_registry(&dir);
  let path = write_temp_file(&dir, b"file contents");
  let id = registry.register(&path, Duration::from_secs(60), 1);

  let response = fetch(&registry, &id).await;
  let body = response.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body.as_ref(), b"file contents");
  assert!(!path.exists());

  let response = fetch(&registry, &id).await;
  assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_vanished_file_is_forbidden_not_server_error() {
  let dir = tempfile::tempdir().unwrap();
  let registry = test_registry(&dir);
  let path = write_temp_file(&dir, b"file contents");
  let id = registry.register(&path, Duration::from_secs(60), 1);

  std::fs::remove_file(&path).unwrap();

  let response = fetch(&registry, &id).await;
  assert_eq!(response.status(), StatusCode::FORBIDDEN);

  // The entry was abandoned, so the identifier stays dead.
  assert!(registry.lookup(&id).is_none());
}

#[tokio::test]
async fn test_stream_blob_has_no_content_length() {
  let dir = tempfile::tempdir().unwrap();
  let registry = test_registry(&dir);

  let stream: ByteStream =
    Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(b"one-shot"))]));
  let id = registry.register_stream(stream, Duration::from_secs(60));

  let response = fetch(&registry, &id).await;

  assert_eq!(response.status(), StatusCode::OK);
  assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

  let body = response.into_body().collect().await.unwrap().to_bytes();
  assert_eq!(body.as_ref(), b"one-shot");

  let response = fetch(&registry, &id).await;
  assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
