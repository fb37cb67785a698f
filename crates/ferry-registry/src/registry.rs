//! Process-wide table of live blob entries.
//!
//! The registry hands out unguessable identifiers for local artifacts and
//! resolves them back to entries for retrieval. File-backed entries are
//! de-duplicated by path, so registering the same file again extends the
//! existing entry instead of creating a second one. Entries evict themselves
//! through the shared state exactly once, at the moment they are released.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ferry_config::BlobConfig;
use tracing::debug;
use uuid::Uuid;

use crate::entry::{Blob, ByteStream};
use crate::error::BlobError;
use crate::file_entry::FileEntry;
use crate::stream_entry::StreamEntry;

/// The live-entry table, shared between the registry handle and the entries
/// themselves (each entry holds a `Weak` back-reference for self-removal).
pub(crate) struct Shared {
  entries: RwLock<Vec<Blob>>,
}

impl Shared {
  fn new() -> Arc<Self> {
    Arc::new(Self {
      entries: RwLock::new(Vec::new()),
    })
  }

  pub(crate) fn remove_file(&self, target: &FileEntry) {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.retain(|blob| {
      blob
        .as_file()
        .is_none_or(|entry| !std::ptr::eq(Arc::as_ptr(entry), target))
    });
  }

  pub(crate) fn remove_stream(&self, target: &StreamEntry) {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.retain(|blob| {
      blob
        .as_stream()
        .is_none_or(|entry| !std::ptr::eq(Arc::as_ptr(entry), target))
    });
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
  }
}

/// Registry of artifacts currently offered for retrieval.
///
/// Purely in-memory; a process restart orphans whatever is still on disk.
pub struct BlobRegistry {
  config: BlobConfig,
  shared: Arc<Shared>,
}

impl BlobRegistry {
  /// Create an empty registry.
  pub fn new(config: BlobConfig) -> Self {
    Self {
      config,
      shared: Shared::new(),
    }
  }

  pub fn config(&self) -> &BlobConfig {
    &self.config
  }

  /// Offer a file for retrieval and promise `expected` downloads of it.
  ///
  /// Registering a path that is already live extends the existing entry:
  /// the expectation grows, the sweep is re-armed, and a fresh identifier is
  /// bound. `expected` may be 0, in which case only the sweep ever releases
  /// the file. The returned identifier is the sole access credential.
  pub fn register(&self, path: impl Into<PathBuf>, ttl: Duration, expected: u64) -> String {
    let path = path.into();
    let id = Uuid::new_v4().to_string();
    let entry = self.find_or_insert(path, ttl);
    entry.expect_downloads(&id, expected);
    debug!(id = %id, path = %entry.path().display(), expected, "registered file blob");
    id
  }

  /// Offer a one-shot byte stream for retrieval by a single consumer.
  ///
  /// Streams are never de-duplicated; every call creates a new entry with a
  /// one-shot deadline of `ttl`.
  pub fn register_stream(&self, stream: ByteStream, ttl: Duration) -> String {
    let id = Uuid::new_v4().to_string();
    let entry = StreamEntry::new(id.clone(), stream, Arc::downgrade(&self.shared));
    {
      let mut entries = self.shared.entries.write().unwrap_or_else(|e| e.into_inner());
      entries.push(Blob::stream(Arc::clone(&entry)));
    }
    // Armed only after insertion, so a deadline can never fire against an
    // entry the table does not know yet.
    entry.arm_deadline(ttl);
    debug!(id = %id, "registered stream blob");
    id
  }

  /// Spool bytes to a fresh file under the configured directory and register
  /// that file. I/O errors propagate to the caller; nothing has been handed
  /// off yet.
  pub async fn register_bytes(
    &self,
    bytes: &[u8],
    ttl: Duration,
    expected: u64,
  ) -> Result<String, BlobError> {
    let path = self.config.dir.join(Uuid::new_v4().to_string());
    tokio::fs::write(&path, bytes).await?;
    Ok(self.register(path, ttl, expected))
  }

  /// Resolve an identifier to a live entry.
  ///
  /// Unknown identifiers and entries already released resolve to `None`; a
  /// release racing with the lookup at worst surfaces later as a not-found
  /// on `open`.
  pub fn lookup(&self, id: &str) -> Option<Blob> {
    let entries = self.shared.entries.read().unwrap_or_else(|e| e.into_inner());
    entries
      .iter()
      .find(|blob| blob.has_id(id) && !blob.is_released())
      .cloned()
  }

  /// Find the live entry for `path`, or insert a new one. Runs under the
  /// write lock so concurrent registrations of the same file cannot create
  /// two entries.
  fn find_or_insert(&self, path: PathBuf, ttl: Duration) -> Arc<FileEntry> {
    let mut entries = self.shared.entries.write().unwrap_or_else(|e| e.into_inner());
    for blob in entries.iter() {
      if let Some(entry) = blob.as_file() {
        if entry.path() == path.as_path() && !entry.is_deleted() {
          return Arc::clone(entry);
        }
      }
    }
    let entry = FileEntry::new(path, ttl, Arc::downgrade(&self.shared));
    entries.push(Blob::file(Arc::clone(&entry)));
    entry
  }
}
