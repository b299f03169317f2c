//! Error type for query operators.

use std::fmt;

use crate::catalog::CatalogError;
use crate::heap::HeapError;

/// Errors from operator execution.
#[derive(Debug)]
pub enum ExecError {
    /// Registry lookup failed.
    Catalog(CatalogError),
    /// Storage-layer failure, including transaction aborts propagated from
    /// the page cache.
    Heap(HeapError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Catalog(err) => write!(f, "{}", err),
            ExecError::Heap(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<CatalogError> for ExecError {
    fn from(err: CatalogError) -> Self {
        ExecError::Catalog(err)
    }
}

impl From<HeapError> for ExecError {
    fn from(err: HeapError) -> Self {
        ExecError::Heap(err)
    }
}
