//! Ferry Registry
//!
//! This crate tracks locally produced artifacts that have been handed off for
//! remote retrieval. Each artifact gets one entry with an unguessable
//! identifier per promised retrieval; the entry counts retrievals as they
//! start and finish and releases the artifact exactly once, either when every
//! promised retrieval has completed or when a time-to-live sweep finds it
//! idle.
//!
//! Two entry kinds exist: file-backed entries support any number of repeated
//! retrievals of the same file, stream-backed entries hand a one-shot byte
//! stream to exactly one consumer. The [`BlobRegistry`] is the process-wide
//! table of live entries; nothing is persisted across restarts.

mod entry;
mod error;
mod file_entry;
mod payload;
mod registry;
mod stream_entry;

pub use entry::{Blob, BlobStream, ByteStream};
pub use error::BlobError;
pub use payload::Payload;
pub use registry::BlobRegistry;
