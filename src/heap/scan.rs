//! Forward-only, page-crossing tuple cursor over one heap file.

use std::sync::Arc;

use super::error::HeapError;
use super::file::HeapFile;
use super::page::PageId;
use crate::buffer::PageCache;
use crate::tuple::Tuple;
use crate::tx::{Permission, TransactionId};

/// A lazy cursor over every live tuple in a heap file, scoped to one
/// transaction.
///
/// Pages are fetched one at a time with read permission as the cursor
/// crosses them, so a scan never holds more than the current page and each
/// fetch is mediated by the cache's lock manager. Callers see one flat tuple
/// sequence; page boundaries (including wholly empty pages) are invisible.
///
/// The cursor starts closed: [`has_next`](Self::has_next) is `false` and
/// [`next`](Self::next) yields nothing until [`open`](Self::open) is called.
/// [`rewind`](Self::rewind) is defined as close followed by open.
pub struct HeapScan {
    file: Arc<HeapFile>,
    cache: Arc<dyn PageCache>,
    tid: TransactionId,
    state: Option<ScanState>,
}

struct ScanState {
    /// Page the buffered tuples came from.
    page_no: u64,
    /// Live tuples of the current page, in slot order.
    tuples: Vec<Tuple>,
    /// Next tuple to yield from `tuples`.
    pos: usize,
}

impl HeapScan {
    /// Creates a closed cursor over `file` on behalf of `tid`.
    pub fn new(file: Arc<HeapFile>, cache: Arc<dyn PageCache>, tid: TransactionId) -> Self {
        Self {
            file,
            cache,
            tid,
            state: None,
        }
    }

    /// Opens the cursor at page 0.
    ///
    /// A zero-page file opens onto the empty sequence. Fetch failures
    /// (including transaction aborts) propagate.
    pub fn open(&mut self) -> Result<(), HeapError> {
        self.state = None;
        let tuples = if self.file.page_count()? == 0 {
            Vec::new()
        } else {
            self.page_tuples(0)?
        };
        self.state = Some(ScanState {
            page_no: 0,
            tuples,
            pos: 0,
        });
        Ok(())
    }

    /// Returns true if another tuple remains, advancing over empty pages if
    /// needed to find out. Lookahead never consumes a tuple. Returns false
    /// if the cursor was never opened.
    pub fn has_next(&mut self) -> Result<bool, HeapError> {
        if self.state.is_none() {
            return Ok(false);
        }
        loop {
            let (pos, len, page_no) = {
                let state = self.state.as_ref().expect("checked above");
                (state.pos, state.tuples.len(), state.page_no)
            };
            if pos < len {
                return Ok(true);
            }
            if page_no + 1 >= self.file.page_count()? {
                return Ok(false);
            }
            let tuples = self.page_tuples(page_no + 1)?;
            let state = self.state.as_mut().expect("checked above");
            state.page_no = page_no + 1;
            state.tuples = tuples;
            state.pos = 0;
        }
    }

    /// Yields the next tuple, crossing page boundaries transparently.
    /// Returns `None` once the table is exhausted or if the cursor is
    /// closed.
    pub fn next(&mut self) -> Result<Option<Tuple>, HeapError> {
        if !self.has_next()? {
            return Ok(None);
        }
        let state = self.state.as_mut().expect("has_next guaranteed an open state");
        let tuple = state.tuples[state.pos].clone();
        state.pos += 1;
        Ok(Some(tuple))
    }

    /// Restarts the cursor from the beginning of the table: close followed
    /// by open.
    pub fn rewind(&mut self) -> Result<(), HeapError> {
        self.close();
        self.open()
    }

    /// Closes the cursor, releasing its buffered page.
    pub fn close(&mut self) {
        self.state = None;
    }

    /// Fetches one page through the cache and buffers its live tuples.
    fn page_tuples(&self, page_no: u64) -> Result<Vec<Tuple>, HeapError> {
        let pid = PageId::new(self.file.id(), page_no);
        let slot = self.cache.fetch_page(self.tid, pid, Permission::ReadOnly)?;
        let page = slot.page();
        page.tuples()
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::schema::{Schema, SchemaRef, Type};
    use crate::tuple::Value;
    use tempfile::TempDir;

    fn int_schema() -> SchemaRef {
        Arc::new(Schema::new(&[Type::Int4], &["v"]))
    }

    struct Fixture {
        _dir: TempDir,
        file: Arc<HeapFile>,
        pool: Arc<BufferPool>,
    }

    fn fixture_with_values(values: &[i32]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("t.dat"), int_schema()).unwrap());
        let pool = Arc::new(BufferPool::new(16));
        pool.register_file(Arc::clone(&file));

        let tid = TransactionId::new();
        for &v in values {
            let mut tuple = Tuple::new(file.schema().clone(), vec![Value::Int(v)]);
            file.insert_tuple(&*pool, tid, &mut tuple).unwrap();
        }
        pool.commit(tid).unwrap();

        Fixture {
            _dir: dir,
            file,
            pool,
        }
    }

    fn scan(f: &Fixture) -> HeapScan {
        HeapScan::new(
            Arc::clone(&f.file),
            f.pool.clone() as Arc<dyn PageCache>,
            TransactionId::new(),
        )
    }

    fn collect_ints(scan: &mut HeapScan) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(tuple) = scan.next().unwrap() {
            match tuple.value(0) {
                Value::Int(v) => out.push(*v),
                other => panic!("unexpected value {:?}", other),
            }
        }
        out
    }

    #[test]
    fn test_unopened_cursor_is_empty() {
        let f = fixture_with_values(&[1, 2, 3]);
        let mut scan = scan(&f);
        assert!(!scan.has_next().unwrap());
        assert!(scan.next().unwrap().is_none());
    }

    #[test]
    fn test_scan_returns_all_tuples() {
        let f = fixture_with_values(&[1, 2, 3, 4, 5]);
        let mut scan = scan(&f);
        scan.open().unwrap();
        assert_eq!(collect_ints(&mut scan), vec![1, 2, 3, 4, 5]);
        assert!(!scan.has_next().unwrap());
    }

    #[test]
    fn test_scan_empty_file() {
        let f = fixture_with_values(&[]);
        let mut scan = scan(&f);
        scan.open().unwrap();
        assert!(!scan.has_next().unwrap());
        assert!(scan.next().unwrap().is_none());
    }

    #[test]
    fn test_has_next_is_idempotent() {
        let f = fixture_with_values(&[7]);
        let mut scan = scan(&f);
        scan.open().unwrap();
        assert!(scan.has_next().unwrap());
        assert!(scan.has_next().unwrap());
        assert_eq!(collect_ints(&mut scan), vec![7]);
    }

    #[test]
    fn test_rewind_after_partial_consume() {
        let f = fixture_with_values(&[1, 2, 3, 4]);
        let mut scan = scan(&f);
        scan.open().unwrap();

        scan.next().unwrap();
        scan.next().unwrap();

        scan.rewind().unwrap();
        assert_eq!(collect_ints(&mut scan), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_scan_crosses_page_boundaries() {
        // 992 int tuples fit on one page; 2000 need three.
        let values: Vec<i32> = (0..2000).collect();
        let f = fixture_with_values(&values);
        assert_eq!(f.file.page_count().unwrap(), 3);

        let mut scan = scan(&f);
        scan.open().unwrap();
        let read = collect_ints(&mut scan);
        assert_eq!(read.len(), 2000);

        let mut sorted = read;
        sorted.sort_unstable();
        assert_eq!(sorted, values);
    }

    #[test]
    fn test_scan_skips_pages_emptied_by_deletes() {
        // Fill two pages, then delete every tuple on page 0.
        let values: Vec<i32> = (0..1000).collect();
        let f = fixture_with_values(&values);
        assert_eq!(f.file.page_count().unwrap(), 2);

        let tid = TransactionId::new();
        let mut scan0 = HeapScan::new(
            Arc::clone(&f.file),
            f.pool.clone() as Arc<dyn PageCache>,
            tid,
        );
        scan0.open().unwrap();
        let mut on_page_zero = Vec::new();
        while let Some(tuple) = scan0.next().unwrap() {
            if tuple.record_id().unwrap().page_id.page_no() == 0 {
                on_page_zero.push(tuple);
            }
        }
        scan0.close();
        for tuple in &on_page_zero {
            f.file.delete_tuple(&*f.pool, tid, tuple).unwrap();
        }
        f.pool.commit(tid).unwrap();

        let mut scan = scan(&f);
        scan.open().unwrap();
        let read = collect_ints(&mut scan);
        assert_eq!(read.len(), 1000 - on_page_zero.len());
    }
}
