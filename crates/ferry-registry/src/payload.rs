//! Inline-or-reference payload planning.
//!
//! The producer-side decision for an outgoing message: artifacts at or below
//! the configured threshold travel inline with the message itself, larger
//! ones are registered and travel as a retrieval URL. Ferry only produces the
//! [`Payload`] value; embedding it into a message belongs to the transport.

use std::path::PathBuf;

use bytes::Bytes;
use url::Url;

use crate::error::BlobError;
use crate::registry::BlobRegistry;

/// How an artifact should travel with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
  /// The artifact bytes are small enough to ride along directly.
  Inline(Bytes),
  /// The artifact is served by reference; consumers fetch the URL.
  Reference(Url),
}

impl BlobRegistry {
  /// Plan the payload for a file artifact.
  ///
  /// Below the inline threshold the file is consumed on the spot: its bytes
  /// are read, the file is deleted, and the bytes travel inline. Otherwise
  /// the file is registered with the configured TTL and the returned payload
  /// carries the retrieval URL.
  pub async fn prepare_file(
    &self,
    path: impl Into<PathBuf>,
    expected: u64,
  ) -> Result<Payload, BlobError> {
    let path = path.into();
    let len = tokio::fs::metadata(&path).await?.len();
    if len <= self.config().min_inline_len {
      let bytes = tokio::fs::read(&path).await?;
      tokio::fs::remove_file(&path).await?;
      return Ok(Payload::Inline(Bytes::from(bytes)));
    }
    let id = self.register(path, self.config().ttl(), expected);
    Ok(Payload::Reference(self.blob_url(&id)?))
  }

  /// Plan the payload for an in-memory artifact.
  ///
  /// Large buffers are spooled to the configured directory and registered;
  /// spooling errors propagate to the caller.
  pub async fn prepare_bytes(&self, bytes: Bytes, expected: u64) -> Result<Payload, BlobError> {
    if bytes.len() as u64 <= self.config().min_inline_len {
      return Ok(Payload::Inline(bytes));
    }
    let id = self
      .register_bytes(&bytes, self.config().ttl(), expected)
      .await?;
    Ok(Payload::Reference(self.blob_url(&id)?))
  }

  fn blob_url(&self, id: &str) -> Result<Url, BlobError> {
    Ok(self.config().base_url.join(&format!("/blob/{id}"))?)
  }
}
