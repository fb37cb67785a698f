//! File-backed blob entries.
//!
//! A file entry tracks, per backing file, how many retrievals were promised,
//! how many finished, and how many are in flight right now. The file is
//! released exactly once: when the last promised retrieval completes, or when
//! a recurring time-to-live sweep finds the entry idle with an unchanged
//! expectation. Completion, sweep, and abandonment all funnel through
//! [`FileEntry::release`], which is guarded by a compare-and-set on the
//! deleted flag.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::entry::BlobStream;
use crate::error::BlobError;
use crate::registry::Shared;

pub(crate) struct FileEntry {
  path: PathBuf,
  ttl: Duration,
  ids: RwLock<HashSet<String>>,
  expected: AtomicU64,
  completed: AtomicU64,
  in_flight: AtomicU64,
  deleted: AtomicBool,
  /// The single live sweep task; re-arming aborts the old one first.
  timer: Mutex<Option<JoinHandle<()>>>,
  shared: Weak<Shared>,
  weak_self: Weak<FileEntry>,
}

impl FileEntry {
  pub(crate) fn new(path: PathBuf, ttl: Duration, shared: Weak<Shared>) -> Arc<Self> {
    Arc::new_cyclic(|weak_self| Self {
      path,
      ttl,
      ids: RwLock::new(HashSet::new()),
      expected: AtomicU64::new(0),
      completed: AtomicU64::new(0),
      in_flight: AtomicU64::new(0),
      deleted: AtomicBool::new(false),
      timer: Mutex::new(None),
      shared,
      weak_self: weak_self.clone(),
    })
  }

  pub(crate) fn path(&self) -> &Path {
    &self.path
  }

  pub(crate) fn has_id(&self, id: &str) -> bool {
    self
      .ids
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .contains(id)
  }

  pub(crate) fn is_deleted(&self) -> bool {
    self.deleted.load(Ordering::SeqCst)
  }

  /// Bind another identifier to this entry and promise `count` more
  /// retrievals, then re-arm the sweep against the new expectation.
  pub(crate) fn expect_downloads(&self, id: &str, count: u64) {
    self
      .ids
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(id.to_string());
    self.expected.fetch_add(count, Ordering::SeqCst);
    self.arm_sweep();
  }

  /// Cancel-then-schedule: abort the previous sweep task and start a new one
  /// carrying the current expectation as its generation marker. A sweep whose
  /// generation no longer matches must not delete anything.
  fn arm_sweep(&self) {
    let generation = self.expected.load(Ordering::SeqCst);
    let entry = self.weak_self.clone();
    let period = self.ttl;

    let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(old) = slot.take() {
      old.abort();
    }
    *slot = Some(tokio::spawn(async move {
      let mut ticker = interval_at(Instant::now() + period, period);
      loop {
        ticker.tick().await;
        let Some(strong) = entry.upgrade() else {
          break;
        };
        strong.sweep(generation);
      }
    }));
  }

  fn disarm_sweep(&self) {
    let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(timer) = slot.take() {
      timer.abort();
    }
  }

  /// One recurring sweep tick: delete only if no new consumer registered
  /// since this sweep was armed and nothing is being read right now.
  fn sweep(&self, generation: u64) {
    if self.expected.load(Ordering::SeqCst) == generation
      && self.in_flight.load(Ordering::SeqCst) == 0
      && !self.deleted.load(Ordering::SeqCst)
    {
      self.release(true);
    }
  }

  /// Open the backing file for one retrieval.
  ///
  /// A vanished file means the entry can never be served again: it is
  /// abandoned (no unlink attempt) and the caller gets not-found.
  pub(crate) async fn open(&self) -> Result<BlobStream, BlobError> {
    let file = match tokio::fs::File::open(&self.path).await {
      Ok(file) => file,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        self.release(false);
        return Err(BlobError::NotFound);
      }
      Err(e) => return Err(BlobError::Io(e)),
    };
    let Some(entry) = self.weak_self.upgrade() else {
      return Err(BlobError::NotFound);
    };
    self.in_flight.fetch_add(1, Ordering::SeqCst);
    Ok(BlobStream::for_file(
      Box::pin(ReaderStream::new(file)),
      entry,
    ))
  }

  pub(crate) fn content_length(&self) -> Option<u64> {
    std::fs::metadata(&self.path).ok().map(|m| m.len())
  }

  /// End-of-retrieval accounting, called when a retrieval stream is dropped.
  ///
  /// The completion check must run before `in_flight` is decremented, so a
  /// sweep racing in on the same instant cannot observe an idle entry whose
  /// final download has not been counted yet.
  pub(crate) fn finish_retrieval(&self) {
    let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
    if done == self.expected.load(Ordering::SeqCst) {
      self.release(true);
    }
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
  }

  /// The single deletion primitive for every trigger path.
  ///
  /// Whoever wins the compare-and-set unlinks the file (unless the entry is
  /// being abandoned because the file is already gone), evicts the entry from
  /// the registry, and cancels the sweep. If the unlink fails the flag is
  /// rolled back, so the next completed retrieval or sweep tick retries.
  pub(crate) fn release(&self, unlink: bool) {
    if self
      .deleted
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return;
    }
    if unlink {
      if let Err(e) = std::fs::remove_file(&self.path) {
        error!(path = %self.path.display(), error = %e, "failed to remove blob file");
        self.deleted.store(false, Ordering::SeqCst);
        return;
      }
    }
    if let Some(shared) = self.shared.upgrade() {
      shared.remove_file(self);
    }
    self.disarm_sweep();
    info!(path = %self.path.display(), "released file blob");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_temp_file(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(uuid::Uuid::new_v4().to_string());
    std::fs::write(&path, contents).unwrap();
    path
  }

  #[tokio::test]
  async fn test_release_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());

    entry.release(true);
    assert!(entry.is_deleted());
    assert!(!path.exists());

    // The losing trigger is a no-op, not a second unlink attempt.
    entry.release(true);
    assert!(entry.is_deleted());
  }

  #[tokio::test]
  async fn test_failed_unlink_rolls_back_deleted_flag() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-created");
    let entry = FileEntry::new(missing, Duration::from_secs(60), Weak::new());

    entry.release(true);
    assert!(!entry.is_deleted());
  }

  #[tokio::test]
  async fn test_abandonment_skips_unlink() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-created");
    let entry = FileEntry::new(missing, Duration::from_secs(60), Weak::new());

    entry.release(false);
    assert!(entry.is_deleted());
  }

  #[tokio::test]
  async fn test_stale_sweep_is_suppressed_by_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());

    entry.expect_downloads("a", 1);
    entry.expect_downloads("b", 1);

    // A sweep armed when only one download was expected must not fire now.
    entry.sweep(1);
    assert!(!entry.is_deleted());
    assert!(path.exists());

    entry.sweep(2);
    assert!(entry.is_deleted());
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn test_sweep_skips_entries_with_downloads_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());

    entry.expect_downloads("a", 1);
    let stream = entry.open().await.unwrap();

    entry.sweep(1);
    assert!(!entry.is_deleted());

    // Dropping the stream completes the only expected download.
    drop(stream);
    assert!(entry.is_deleted());
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn test_zero_expected_never_completes_by_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());

    entry.expect_downloads("a", 0);
    let stream = entry.open().await.unwrap();
    drop(stream);

    assert!(!entry.is_deleted());
    assert!(path.exists());
  }

  #[tokio::test]
  async fn test_open_on_vanished_file_abandons_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());
    entry.expect_downloads("a", 1);

    std::fs::remove_file(&path).unwrap();

    let result = entry.open().await;
    assert!(matches!(result, Err(BlobError::NotFound)));
    assert!(entry.is_deleted());
  }

  #[tokio::test]
  async fn test_content_length_unknown_once_file_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_file(&dir, b"some contents");
    let entry = FileEntry::new(path.clone(), Duration::from_secs(60), Weak::new());

    assert_eq!(entry.content_length(), Some(13));

    std::fs::remove_file(&path).unwrap();
    assert_eq!(entry.content_length(), None);
  }
}
