//! Transaction-scoped page lock table.
//!
//! Grants shared/exclusive locks keyed by [`PageId`], held until released in
//! bulk at transaction completion. Conflicting requests block on a condvar;
//! a request that outlives the configured timeout fails with
//! [`BufferError::TransactionAborted`], which stands in for the lock
//! manager's deadlock detection.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use super::error::BufferError;
use crate::heap::PageId;
use crate::tx::{Permission, TransactionId};

#[derive(Default)]
struct PageLock {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl PageLock {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    /// Whether `tid` may take the lock in the requested mode right now.
    /// Re-entrant: a holder is always compatible with itself, and a sole
    /// shared holder may upgrade to exclusive.
    fn grantable(&self, tid: TransactionId, perm: Permission) -> bool {
        match perm {
            Permission::ReadOnly => self.exclusive.is_none() || self.exclusive == Some(tid),
            Permission::ReadWrite => match self.exclusive {
                Some(holder) => holder == tid,
                None => {
                    self.shared.is_empty()
                        || (self.shared.len() == 1 && self.shared.contains(&tid))
                }
            },
        }
    }

    fn grant(&mut self, tid: TransactionId, perm: Permission) {
        match perm {
            Permission::ReadOnly => {
                // An exclusive holder already covers shared access.
                if self.exclusive != Some(tid) {
                    self.shared.insert(tid);
                }
            }
            Permission::ReadWrite => {
                self.shared.remove(&tid);
                self.exclusive = Some(tid);
            }
        }
    }
}

pub(super) struct LockTable {
    state: Mutex<HashMap<PageId, PageLock>>,
    available: Condvar,
    timeout: Duration,
}

impl LockTable {
    pub(super) fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            available: Condvar::new(),
            timeout,
        }
    }

    /// Acquires a page lock for `tid`, blocking while a conflicting holder
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::TransactionAborted` if the wait exceeds the
    /// table's timeout.
    pub(super) fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> Result<(), BufferError> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.state.lock();
        loop {
            let entry = state.entry(pid).or_default();
            if entry.grantable(tid, perm) {
                entry.grant(tid, perm);
                trace!(%tid, %pid, %perm, "page lock granted");
                return Ok(());
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                warn!(%tid, %pid, %perm, "page lock wait timed out, aborting transaction");
                return Err(BufferError::TransactionAborted(tid));
            }
        }
    }

    /// Returns true if `tid` holds any lock on `pid`.
    pub(super) fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        let state = self.state.lock();
        state
            .get(&pid)
            .is_some_and(|l| l.exclusive == Some(tid) || l.shared.contains(&tid))
    }

    /// Releases every lock held by `tid` and wakes all waiters.
    pub(super) fn release_all(&self, tid: TransactionId) {
        let mut state = self.state.lock();
        state.retain(|_, lock| {
            lock.shared.remove(&tid);
            if lock.exclusive == Some(tid) {
                lock.exclusive = None;
            }
            !lock.is_free()
        });
        drop(state);
        self.available.notify_all();
    }
}
