//! Transaction identity and page access permissions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a transaction (64-bit).
///
/// Every storage-layer operation runs on behalf of a transaction; the page
/// cache keys its locks by this identity. Fresh ids are allocated from a
/// process-wide counter starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocates a fresh, process-unique transaction id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuilds a transaction id from its raw value.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access intent declared when fetching a page through the cache.
///
/// The permission drives the lock manager's lock mode: `ReadOnly` requests a
/// shared lock, `ReadWrite` an exclusive one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Shared access for scans.
    ReadOnly,
    /// Exclusive access for insert/delete.
    ReadWrite,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::ReadOnly => f.write_str("READ_ONLY"),
            Permission::ReadWrite => f.write_str("READ_WRITE"),
        }
    }
}
