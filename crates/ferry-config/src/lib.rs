//! Ferry Config
//!
//! Serializable configuration for blob registration and retrieval. These are
//! plain data types; reading a config file and wiring the values into the
//! registry happens in the binary.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration consumed by the blob registry and the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
  /// Seconds between deletion sweeps for a registered blob.
  pub ttl_secs: u64,

  /// Payloads at or below this many bytes are inlined instead of registered.
  pub min_inline_len: u64,

  /// Public base URL that consumers resolve `/blob/{id}` against.
  pub base_url: Url,

  /// Directory where byte payloads are spooled before serving.
  pub dir: PathBuf,
}

impl BlobConfig {
  /// The sweep interval as a `Duration`.
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

impl Default for BlobConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 300,
      min_inline_len: 1024 * 1024,
      base_url: Url::parse("http://localhost:8080").expect("default base url is valid"),
      dir: env::temp_dir(),
    }
  }
}
