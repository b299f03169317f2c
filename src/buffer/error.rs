//! Error types for the page cache.

use std::fmt;

use crate::heap::{HeapError, TableId};
use crate::tx::TransactionId;

/// Errors from page cache operations.
#[derive(Debug)]
pub enum BufferError {
    /// The transaction waited too long for a conflicting page lock and must
    /// abort. Surfaced verbatim to callers; never retried internally.
    TransactionAborted(TransactionId),
    /// Every cached page is dirty; nothing can be evicted to make room.
    PoolFull,
    /// No backing file is registered for the table.
    UnknownTable(TableId),
    /// Materializing or flushing a page failed in the heap layer.
    Heap(Box<HeapError>),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::TransactionAborted(tid) => {
                write!(f, "transaction {} aborted waiting for a page lock", tid)
            }
            BufferError::PoolFull => f.write_str("buffer pool full: all pages dirty"),
            BufferError::UnknownTable(table) => {
                write!(f, "no file registered for table {}", table)
            }
            BufferError::Heap(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for BufferError {}

impl From<HeapError> for BufferError {
    fn from(err: HeapError) -> Self {
        BufferError::Heap(Box::new(err))
    }
}
