//! Blob entries and retrieval streams.
//!
//! [`Blob`] is the capability handed out by the registry: produce a stream,
//! report a length, match an identifier. The backing kind (file vs. one-shot
//! stream) stays private; callers only see the capability set.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::error::BlobError;
use crate::file_entry::FileEntry;
use crate::stream_entry::StreamEntry;

/// A boxed stream of blob bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A live blob entry, cheap to clone.
#[derive(Clone)]
pub struct Blob {
  kind: Kind,
}

#[derive(Clone)]
enum Kind {
  File(Arc<FileEntry>),
  Stream(Arc<StreamEntry>),
}

impl Blob {
  pub(crate) fn file(entry: Arc<FileEntry>) -> Self {
    Self {
      kind: Kind::File(entry),
    }
  }

  pub(crate) fn stream(entry: Arc<StreamEntry>) -> Self {
    Self {
      kind: Kind::Stream(entry),
    }
  }

  pub(crate) fn as_file(&self) -> Option<&Arc<FileEntry>> {
    match &self.kind {
      Kind::File(entry) => Some(entry),
      Kind::Stream(_) => None,
    }
  }

  pub(crate) fn as_stream(&self) -> Option<&Arc<StreamEntry>> {
    match &self.kind {
      Kind::Stream(entry) => Some(entry),
      Kind::File(_) => None,
    }
  }

  pub(crate) fn is_released(&self) -> bool {
    match &self.kind {
      Kind::File(entry) => entry.is_deleted(),
      Kind::Stream(entry) => entry.is_closed(),
    }
  }

  /// Whether the given identifier was ever bound to this entry.
  pub fn has_id(&self, id: &str) -> bool {
    match &self.kind {
      Kind::File(entry) => entry.has_id(id),
      Kind::Stream(entry) => entry.has_id(id),
    }
  }

  /// Open a readable stream over the blob contents.
  ///
  /// Retrieval accounting starts here and ends when the returned stream is
  /// dropped. Returns [`BlobError::NotFound`] when the backing resource is
  /// gone or (for stream blobs) was already consumed.
  pub async fn open(&self) -> Result<BlobStream, BlobError> {
    match &self.kind {
      Kind::File(entry) => entry.open().await,
      Kind::Stream(entry) => entry.open(),
    }
  }

  /// The content length in bytes, or `None` when it cannot be known.
  pub fn content_length(&self) -> Option<u64> {
    match &self.kind {
      Kind::File(entry) => entry.content_length(),
      Kind::Stream(_) => None,
    }
  }
}

/// A retrieval stream over one blob.
///
/// Dropping the stream finishes the retrieval: file entries count the
/// completed download (possibly releasing the file), stream entries close for
/// good. Drop runs on every exit path, so an aborted transfer is accounted
/// for the same way as a completed one.
pub struct BlobStream {
  inner: ByteStream,
  release: Release,
}

enum Release {
  File(Arc<FileEntry>),
  Stream(Arc<StreamEntry>),
}

impl BlobStream {
  pub(crate) fn for_file(inner: ByteStream, entry: Arc<FileEntry>) -> Self {
    Self {
      inner,
      release: Release::File(entry),
    }
  }

  pub(crate) fn for_stream(inner: ByteStream, entry: Arc<StreamEntry>) -> Self {
    Self {
      inner,
      release: Release::Stream(entry),
    }
  }
}

impl Stream for BlobStream {
  type Item = io::Result<Bytes>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.get_mut().inner.as_mut().poll_next(cx)
  }
}

impl Drop for BlobStream {
  fn drop(&mut self) {
    match &self.release {
      Release::File(entry) => entry.finish_retrieval(),
      Release::Stream(entry) => entry.release(),
    }
  }
}
