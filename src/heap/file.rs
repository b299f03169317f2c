//! Heap file: page addressing, free-slot discovery, and file growth.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use super::error::HeapError;
use super::page::{HeapPage, PageId, TableId, PAGE_SIZE};
use crate::buffer::PageCache;
use crate::schema::SchemaRef;
use crate::tuple::Tuple;
use crate::tx::{Permission, TransactionId};

/// A table's on-disk representation: a densely packed sequence of
/// [`PAGE_SIZE`] pages.
///
/// The file owns page addressing and growth but never caches page bytes;
/// every tuple-level operation fetches its pages through the injected
/// [`PageCache`] so the cache's locking discipline mediates concurrent
/// transactions. The raw [`read_page`](Self::read_page) /
/// [`write_page`](Self::write_page) IO paths exist for the cache alone.
///
/// # Identity
///
/// The table id is the xxh3 hash of the canonicalized backing path, computed
/// once at open. Re-opening the same path in any process yields the same id,
/// which is what lets cache keys, catalog keys, and tuple location tags
/// survive restarts.
pub struct HeapFile {
    path: PathBuf,
    /// Serializes raw IO and, critically, file growth: appending is the one
    /// operation where two racing inserters could otherwise both extend the
    /// file or tear its page alignment.
    file: Mutex<File>,
    schema: SchemaRef,
    id: TableId,
    /// Page number that last had a free slot, or -1 for none. A single-page
    /// hint, not a free list; stale values are discarded on first miss.
    last_empty_page: AtomicI64,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating it empty if absent.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::Corrupted` if the existing file's length is not a
    /// whole number of pages, or `HeapError::Io` on any IO failure.
    pub fn open(path: impl Into<PathBuf>, schema: SchemaRef) -> Result<Self, HeapError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(HeapError::Corrupted(format!(
                "file length {} is not a multiple of page size {}",
                len, PAGE_SIZE
            )));
        }

        // Canonicalization requires the file to exist, which it does by now.
        let canonical = path.canonicalize()?;
        let id = TableId::new(xxh3_64(canonical.to_string_lossy().as_bytes()));

        Ok(Self {
            path,
            file: Mutex::new(file),
            schema,
            id,
            last_empty_page: AtomicI64::new(-1),
        })
    }

    /// Returns the stable table id derived from the backing path.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema of the tuples stored in this file.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the number of pages in the file.
    ///
    /// Recomputed from the backing length on every call so growth performed
    /// by this object or by any concurrent writer is always visible.
    pub fn page_count(&self) -> Result<u64, HeapError> {
        let len = self.file.lock().metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64))
    }

    /// Reads one page directly from the backing store.
    ///
    /// This is the cache's materialization path; query-time logic never
    /// calls it.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::PageNotFound` if the page lies beyond the current
    /// file length, or `HeapError::Io` on read failure.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage, HeapError> {
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        if pid.byte_offset() + PAGE_SIZE as u64 > len {
            return Err(HeapError::PageNotFound(pid));
        }

        file.seek(SeekFrom::Start(pid.byte_offset()))?;
        let mut buf = vec![0u8; PAGE_SIZE].into_boxed_slice();
        file.read_exact(&mut buf)?;
        Ok(HeapPage::from_bytes(pid, self.schema.clone(), buf))
    }

    /// Writes one page back to the backing store at its page-aligned offset.
    ///
    /// Exactly one page's worth of bytes is written; neighbouring pages are
    /// untouched.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), HeapError> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page.id().byte_offset()))?;
        file.write_all(page.as_bytes())?;
        Ok(())
    }

    /// Appends one zeroed (fully empty) page, returning its id.
    ///
    /// Runs entirely under the file mutex: concurrent inserters that both
    /// find the file full must not both extend it for the same missing slot.
    fn append_empty_page(&self) -> Result<PageId, HeapError> {
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(len))?;
        file.write_all(&[0u8; PAGE_SIZE])?;
        let pid = PageId::new(self.id, len / PAGE_SIZE as u64);
        debug!(table = %self.id, page = pid.page_no(), "extended heap file with an empty page");
        Ok(pid)
    }

    /// Inserts a tuple, choosing a page with a free slot or growing the file
    /// when every existing page is full. Returns the pages dirtied, always
    /// exactly one for a successful insert.
    ///
    /// The scan starts at the hinted page if one is remembered; a stale hint
    /// is discarded and the scan restarts from page 0 rather than skipping
    /// the pages before it. Pages are fetched with write permission, so this
    /// call may block on, or be aborted by, the cache's lock manager.
    pub fn insert_tuple(
        &self,
        cache: &dyn PageCache,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageId>, HeapError> {
        let hint = self.last_empty_page.load(Ordering::Acquire);
        if hint >= 0 && (hint as u64) < self.page_count()? {
            let pid = PageId::new(self.id, hint as u64);
            let slot = cache.fetch_page(tid, pid, Permission::ReadWrite)?;
            let mut page = slot.page_mut();
            if page.empty_slot_count() > 0 {
                page.insert_tuple(tuple)?;
                drop(page);
                slot.mark_dirty(tid);
                return Ok(vec![pid]);
            }
            drop(page);
            trace!(table = %self.id, page = hint, "free-slot hint was stale");
            self.last_empty_page.store(-1, Ordering::Release);
        }

        let mut page_no = 0u64;
        while page_no < self.page_count()? {
            let pid = PageId::new(self.id, page_no);
            trace!(table = %self.id, page = page_no, "checking for free slots");
            let slot = cache.fetch_page(tid, pid, Permission::ReadWrite)?;
            let mut page = slot.page_mut();
            if page.empty_slot_count() == 0 {
                drop(page);
                page_no += 1;
                continue;
            }
            page.insert_tuple(tuple)?;
            drop(page);
            slot.mark_dirty(tid);
            self.last_empty_page.store(page_no as i64, Ordering::Release);
            return Ok(vec![pid]);
        }

        // Every existing page is full (or the file is empty): grow by one
        // page, then take it through the cache like any other page; another
        // transaction may have seen the new length already and be holding a
        // lock on it.
        self.append_empty_page()?;
        let last = self.page_count()? - 1;
        let pid = PageId::new(self.id, last);
        let slot = cache.fetch_page(tid, pid, Permission::ReadWrite)?;
        let mut page = slot.page_mut();
        page.insert_tuple(tuple)?;
        drop(page);
        slot.mark_dirty(tid);
        self.last_empty_page.store(last as i64, Ordering::Release);
        Ok(vec![pid])
    }

    /// Deletes a tuple from its recorded home page. Returns the pages
    /// dirtied: exactly the one page the tuple lived on.
    ///
    /// # Errors
    ///
    /// Fails with `HeapError::MissingRecordId` if the tuple was never
    /// stored, or propagates `HeapError::TupleNotFound` from the page layer
    /// when the tuple does not actually reside at its recorded location.
    pub fn delete_tuple(
        &self,
        cache: &dyn PageCache,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>, HeapError> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        let pid = PageId::new(self.id, rid.page_id.page_no());
        let slot = cache.fetch_page(tid, pid, Permission::ReadWrite)?;
        let mut page = slot.page_mut();
        page.delete_tuple(tuple)?;
        drop(page);
        slot.mark_dirty(tid);
        // The freed slot makes this page the best next candidate for an
        // insert.
        self.last_empty_page
            .store(pid.page_no() as i64, Ordering::Release);
        Ok(vec![pid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::schema::{Schema, Type};
    use crate::tuple::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn int_schema() -> SchemaRef {
        Arc::new(Schema::new(&[Type::Int4], &["v"]))
    }

    fn int_tuple(schema: &SchemaRef, v: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![Value::Int(v)])
    }

    struct Fixture {
        _dir: TempDir,
        file: Arc<HeapFile>,
        pool: Arc<BufferPool>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("t.dat"), int_schema()).unwrap());
        let pool = Arc::new(BufferPool::new(DEFAULT_TEST_POOL));
        pool.register_file(Arc::clone(&file));
        Fixture {
            _dir: dir,
            file,
            pool,
        }
    }

    const DEFAULT_TEST_POOL: usize = 16;

    #[test]
    fn test_open_creates_empty_file() {
        let f = fixture();
        assert_eq!(f.file.page_count().unwrap(), 0);
        assert!(f.file.path().exists());
    }

    #[test]
    fn test_id_is_stable_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dat");
        let a = HeapFile::open(&path, int_schema()).unwrap();
        let b = HeapFile::open(&path, int_schema()).unwrap();
        assert_eq!(a.id(), b.id());

        let other = HeapFile::open(dir.path().join("u.dat"), int_schema()).unwrap();
        assert_ne!(a.id(), other.id());
    }

    #[test]
    fn test_open_rejects_misaligned_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dat");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(matches!(
            HeapFile::open(&path, int_schema()),
            Err(HeapError::Corrupted(_))
        ));
    }

    #[test]
    fn test_read_page_beyond_length_fails() {
        let f = fixture();
        let err = f
            .file
            .read_page(PageId::new(f.file.id(), 0))
            .unwrap_err();
        assert!(matches!(err, HeapError::PageNotFound(_)));
    }

    #[test]
    fn test_insert_into_empty_file_creates_page_zero() {
        let f = fixture();
        let tid = TransactionId::new();

        let mut tuple = int_tuple(f.file.schema(), 42);
        let dirty = f.file.insert_tuple(&*f.pool, tid, &mut tuple).unwrap();

        assert_eq!(f.file.page_count().unwrap(), 1);
        assert_eq!(dirty, vec![PageId::new(f.file.id(), 0)]);
        let rid = tuple.record_id().unwrap();
        assert_eq!(rid.page_id.page_no(), 0);
        assert_eq!(rid.slot, 0);
    }

    #[test]
    fn test_write_page_roundtrip() {
        let f = fixture();
        let tid = TransactionId::new();
        let mut tuple = int_tuple(f.file.schema(), 7);
        f.file.insert_tuple(&*f.pool, tid, &mut tuple).unwrap();
        f.pool.commit(tid).unwrap();

        let page = f.file.read_page(PageId::new(f.file.id(), 0)).unwrap();
        assert_eq!(page.tuples().count(), 1);
    }

    #[test]
    fn test_successful_insert_dirties_exactly_one_page() {
        let f = fixture();
        let tid = TransactionId::new();
        for i in 0..10 {
            let mut tuple = int_tuple(f.file.schema(), i);
            let dirty = f.file.insert_tuple(&*f.pool, tid, &mut tuple).unwrap();
            assert_eq!(dirty.len(), 1);
        }
    }

    #[test]
    fn test_delete_then_reinsert_reuses_slot() {
        let f = fixture();
        let tid = TransactionId::new();

        let mut a = int_tuple(f.file.schema(), 1);
        f.file.insert_tuple(&*f.pool, tid, &mut a).unwrap();
        let rid = a.record_id().unwrap();

        f.file.delete_tuple(&*f.pool, tid, &a).unwrap();

        let mut b = int_tuple(f.file.schema(), 2);
        f.file.insert_tuple(&*f.pool, tid, &mut b).unwrap();
        assert_eq!(b.record_id().unwrap(), rid);
        assert_eq!(f.file.page_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_unstored_tuple_fails() {
        let f = fixture();
        let tid = TransactionId::new();
        let tuple = int_tuple(f.file.schema(), 1);
        assert!(matches!(
            f.file.delete_tuple(&*f.pool, tid, &tuple),
            Err(HeapError::MissingRecordId)
        ));
    }
}
