//! Registry errors.

/// Errors surfaced by blob registration and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
  /// The identifier is unknown, or the backing resource is already gone.
  #[error("blob not found")]
  NotFound,

  /// An I/O error occurred while spooling or reading blob contents.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The resource URL for a registered blob could not be built.
  #[error("invalid blob url: {0}")]
  Url(#[from] url::ParseError),
}
