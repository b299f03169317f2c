//! Buffer pool: cached pages, file registry, and transaction completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

use super::error::BufferError;
use super::lock::LockTable;
use crate::heap::{HeapFile, HeapPage, PageId, TableId};
use crate::tx::{Permission, TransactionId};

/// Default number of pages the pool holds in memory.
pub const DEFAULT_POOL_CAPACITY: usize = 50;

/// Default time a fetch may wait on a conflicting page lock before the
/// requesting transaction is told to abort.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(300);

/// The capability the heap layer depends on for every query-time page
/// access. Implemented by [`BufferPool`]; injected into heap files, cursors,
/// and scan operators rather than baked in.
pub trait PageCache: Send + Sync {
    /// Fetches a page on behalf of a transaction, blocking until the
    /// requested lock mode is granted.
    ///
    /// # Errors
    ///
    /// - `BufferError::TransactionAborted` if the lock wait times out
    /// - `BufferError::UnknownTable` if no file is registered for the page's
    ///   table
    /// - `BufferError::PoolFull` if nothing clean can be evicted
    /// - `BufferError::Heap` if reading the page from disk fails
    fn fetch_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> Result<Arc<PageSlot>, BufferError>;
}

/// A cached page: the in-memory image plus its dirty state.
///
/// The inner `RwLock` is a short-lived latch protecting the page bytes;
/// transaction-level isolation comes from the pool's lock table, not from
/// holding this latch.
#[derive(Debug)]
pub struct PageSlot {
    pid: PageId,
    page: RwLock<HeapPage>,
    dirty: Mutex<Option<TransactionId>>,
}

impl PageSlot {
    fn new(page: HeapPage) -> Self {
        Self {
            pid: page.id(),
            page: RwLock::new(page),
            dirty: Mutex::new(None),
        }
    }

    /// Returns this page's identity.
    pub fn id(&self) -> PageId {
        self.pid
    }

    /// Latches the page for reading.
    pub fn page(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    /// Latches the page for writing.
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, HeapPage> {
        self.page.write()
    }

    /// Records that `tid` mutated this page.
    pub fn mark_dirty(&self, tid: TransactionId) {
        *self.dirty.lock() = Some(tid);
    }

    /// Returns true if the page has unflushed mutations.
    pub fn is_dirty(&self) -> bool {
        self.dirty.lock().is_some()
    }

    fn dirtied_by(&self) -> Option<TransactionId> {
        *self.dirty.lock()
    }

    fn clear_dirty(&self) {
        *self.dirty.lock() = None;
    }
}

struct PoolState {
    pages: HashMap<PageId, Arc<PageSlot>>,
    files: HashMap<TableId, Arc<HeapFile>>,
}

/// The process-wide page cache.
///
/// Holds up to `capacity` pages keyed by [`PageId`], resolves cache misses
/// through its own table-file registry (so catalog mutations never strand an
/// in-flight cursor), and enforces the locking discipline described in the
/// [module docs](crate::buffer).
///
/// Policy is NO-STEAL / FORCE: only clean pages are evicted, a committing
/// transaction's dirty pages are flushed at commit, and an aborting
/// transaction's dirty pages are discarded so the next fetch re-reads the
/// last flushed image.
pub struct BufferPool {
    capacity: usize,
    state: Mutex<PoolState>,
    locks: LockTable,
}

impl BufferPool {
    /// Creates a pool holding up to `capacity` pages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self::with_lock_timeout(capacity, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a pool with an explicit lock-wait timeout.
    pub fn with_lock_timeout(capacity: usize, lock_timeout: Duration) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(capacity),
                files: HashMap::new(),
            }),
            locks: LockTable::new(lock_timeout),
        }
    }

    /// Registers the backing file for a table so its pages can be
    /// materialized and flushed. Idempotent per table id.
    pub fn register_file(&self, file: Arc<HeapFile>) {
        let mut state = self.state.lock();
        state.files.insert(file.id(), file);
    }

    /// Returns the registered backing file for a table.
    pub fn file(&self, table: TableId) -> Option<Arc<HeapFile>> {
        self.state.lock().files.get(&table).cloned()
    }

    /// Returns true if `tid` holds a lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds_lock(tid, pid)
    }

    /// Writes one page back to its file if dirty.
    pub fn flush_page(&self, pid: PageId) -> Result<(), BufferError> {
        let state = self.state.lock();
        Self::flush_slot_locked(&state, pid)
    }

    /// Writes every dirty page back to its file.
    pub fn flush_all(&self) -> Result<(), BufferError> {
        let state = self.state.lock();
        let pids: Vec<PageId> = state.pages.keys().copied().collect();
        for pid in pids {
            Self::flush_slot_locked(&state, pid)?;
        }
        Ok(())
    }

    fn flush_slot_locked(state: &PoolState, pid: PageId) -> Result<(), BufferError> {
        let Some(slot) = state.pages.get(&pid) else {
            return Ok(());
        };
        if !slot.is_dirty() {
            return Ok(());
        }
        let file = state
            .files
            .get(&pid.table())
            .ok_or(BufferError::UnknownTable(pid.table()))?;
        file.write_page(&slot.page())?;
        slot.clear_dirty();
        trace!(%pid, "flushed page");
        Ok(())
    }

    /// Completes a transaction: on commit its dirty pages are flushed, on
    /// abort they are discarded. Either way every page lock it holds is
    /// released.
    pub fn complete_transaction(
        &self,
        tid: TransactionId,
        commit: bool,
    ) -> Result<(), BufferError> {
        let result = {
            let mut state = self.state.lock();
            let touched: Vec<PageId> = state
                .pages
                .iter()
                .filter(|(_, slot)| slot.dirtied_by() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect();

            let mut result = Ok(());
            for pid in touched {
                if commit {
                    if let Err(err) = Self::flush_slot_locked(&state, pid) {
                        result = Err(err);
                        break;
                    }
                } else {
                    // Dropping the cached image reverts to the last flushed
                    // copy on the next fetch.
                    state.pages.remove(&pid);
                }
            }
            result
        };
        self.locks.release_all(tid);
        debug!(%tid, commit, "transaction complete");
        result
    }

    /// Commits `tid`, flushing its dirty pages and releasing its locks.
    pub fn commit(&self, tid: TransactionId) -> Result<(), BufferError> {
        self.complete_transaction(tid, true)
    }

    /// Aborts `tid`, discarding its dirty pages and releasing its locks.
    pub fn abort(&self, tid: TransactionId) -> Result<(), BufferError> {
        self.complete_transaction(tid, false)
    }

    /// Evicts one clean, unreferenced page to make room. NO-STEAL: dirty
    /// pages are never written out on eviction, so a pool of nothing but
    /// dirty or pinned pages cannot grow.
    fn evict_locked(state: &mut PoolState) -> Result<(), BufferError> {
        let victim = state
            .pages
            .iter()
            .find(|(_, slot)| !slot.is_dirty() && Arc::strong_count(slot) == 1)
            .map(|(pid, _)| *pid)
            .ok_or(BufferError::PoolFull)?;
        state.pages.remove(&victim);
        trace!(pid = %victim, "evicted clean page");
        Ok(())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl PageCache for BufferPool {
    fn fetch_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> Result<Arc<PageSlot>, BufferError> {
        // The transaction lock is taken before any frame state is touched;
        // this is the call that may block or abort.
        self.locks.acquire(tid, pid, perm)?;

        let mut state = self.state.lock();
        if let Some(slot) = state.pages.get(&pid) {
            return Ok(Arc::clone(slot));
        }

        let file = state
            .files
            .get(&pid.table())
            .ok_or(BufferError::UnknownTable(pid.table()))?
            .clone();

        if state.pages.len() >= self.capacity {
            Self::evict_locked(&mut state)?;
        }

        let page = file.read_page(pid)?;
        let slot = Arc::new(PageSlot::new(page));
        state.pages.insert(pid, Arc::clone(&slot));
        trace!(%tid, %pid, %perm, "page materialized");
        Ok(slot)
    }
}
