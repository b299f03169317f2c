//! Error types for the heap module.

use std::fmt;

use super::page::PageId;
use crate::buffer::BufferError;
use crate::tuple::SerializationError;

/// Errors from heap storage operations.
#[derive(Debug)]
pub enum HeapError {
    /// Page number lies beyond the backing store's current length.
    PageNotFound(PageId),
    /// Page has no free slot for an insert.
    PageFull(PageId),
    /// Tuple schema does not match the table schema.
    SchemaMismatch,
    /// No live tuple at the recorded location.
    TupleNotFound {
        /// Page the tuple claimed as home.
        page_id: PageId,
        /// Slot the tuple claimed.
        slot: usize,
    },
    /// Tuple carries no stored location to delete through.
    MissingRecordId,
    /// Backing store has an invalid layout.
    Corrupted(String),
    /// Stored bytes failed to decode.
    Serialization(SerializationError),
    /// I/O failure against the backing store.
    Io(std::io::Error),
    /// Failure surfaced by the page cache, including transaction aborts.
    Buffer(BufferError),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::PageNotFound(pid) => write!(f, "page not found: {}", pid),
            HeapError::PageFull(pid) => write!(f, "page {} has no free slot", pid),
            HeapError::SchemaMismatch => f.write_str("tuple schema does not match table schema"),
            HeapError::TupleNotFound { page_id, slot } => {
                write!(f, "no tuple at page {} slot {}", page_id, slot)
            }
            HeapError::MissingRecordId => f.write_str("tuple has no stored location"),
            HeapError::Corrupted(msg) => write!(f, "heap file corrupted: {}", msg),
            HeapError::Serialization(err) => write!(f, "serialization error: {}", err),
            HeapError::Io(err) => write!(f, "I/O error: {}", err),
            HeapError::Buffer(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for HeapError {}

impl From<SerializationError> for HeapError {
    fn from(err: SerializationError) -> Self {
        HeapError::Serialization(err)
    }
}

impl From<std::io::Error> for HeapError {
    fn from(err: std::io::Error) -> Self {
        HeapError::Io(err)
    }
}

impl From<BufferError> for HeapError {
    fn from(err: BufferError) -> Self {
        HeapError::Buffer(err)
    }
}
