//! Stream-backed blob entries.
//!
//! A stream entry wraps a one-shot byte stream for exactly one consumer. The
//! entry closes on whichever comes first: the consumer drops the retrieval
//! stream, or the time-to-live deadline fires. Both triggers funnel through
//! [`StreamEntry::release`], guarded by a compare-and-set so the loser is a
//! no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::entry::{BlobStream, ByteStream};
use crate::error::BlobError;
use crate::registry::Shared;

pub(crate) struct StreamEntry {
  id: String,
  stream: Mutex<Option<ByteStream>>,
  closed: AtomicBool,
  timer: Mutex<Option<JoinHandle<()>>>,
  shared: Weak<Shared>,
  weak_self: Weak<StreamEntry>,
}

impl StreamEntry {
  pub(crate) fn new(id: String, stream: ByteStream, shared: Weak<Shared>) -> Arc<Self> {
    Arc::new_cyclic(|weak_self| Self {
      id,
      stream: Mutex::new(Some(stream)),
      closed: AtomicBool::new(false),
      timer: Mutex::new(None),
      shared,
      weak_self: weak_self.clone(),
    })
  }

  /// Start the one-shot deadline. Armed once, right after the entry has been
  /// inserted into the registry.
  pub(crate) fn arm_deadline(&self, ttl: Duration) {
    let entry = self.weak_self.clone();
    let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(tokio::spawn(async move {
      tokio::time::sleep(ttl).await;
      if let Some(strong) = entry.upgrade() {
        strong.release();
      }
    }));
  }

  fn disarm_deadline(&self) {
    let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(timer) = slot.take() {
      timer.abort();
    }
  }

  pub(crate) fn has_id(&self, id: &str) -> bool {
    self.id == id
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Hand the wrapped stream to its single consumer. The stream can be taken
  /// exactly once; afterwards the entry only waits for its close.
  pub(crate) fn open(&self) -> Result<BlobStream, BlobError> {
    let Some(stream) = self
      .stream
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take()
    else {
      return Err(BlobError::NotFound);
    };
    let Some(entry) = self.weak_self.upgrade() else {
      return Err(BlobError::NotFound);
    };
    Ok(BlobStream::for_stream(stream, entry))
  }

  /// Close exactly once, whichever trigger wins: consumer done or deadline.
  pub(crate) fn release(&self) {
    if self
      .closed
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return;
    }
    // Drop an unconsumed stream along with the registry slot.
    self
      .stream
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take();
    if let Some(shared) = self.shared.upgrade() {
      shared.remove_stream(self);
    }
    self.disarm_deadline();
    info!(id = %self.id, "released stream blob");
  }
}
