//! Heap page codec: slot bitmap plus fixed-width tuple slots.
//!
//! Every page is exactly [`PAGE_SIZE`] bytes with the layout:
//!
//! ```text
//! +--------------------+ offset 0
//! | Slot bitmap        |  ceil(slots / 8) bytes, LSB-first
//! +--------------------+ offset header_size
//! | Slot 0             |  tuple_size bytes each
//! | Slot 1             |
//! | ...                |
//! +--------------------+
//! | Padding            |  unused remainder
//! +--------------------+ offset 4096
//! ```
//!
//! With `t = tuple_size` bytes per tuple, a page holds
//! `floor(PAGE_SIZE * 8 / (t * 8 + 1))` slots: each tuple costs its own bits
//! plus one bitmap bit. Bit `i % 8` of bitmap byte `i / 8` marks slot `i`
//! occupied. The owned byte buffer *is* the on-disk representation, so the
//! raw IO path reads and writes it verbatim; this layout is load-bearing and
//! stable across restarts.

use std::fmt;

use super::error::HeapError;
use crate::schema::SchemaRef;
use crate::tuple::{RecordId, SerializationError, Tuple};

/// Fixed page size in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Identity of a table, derived deterministically from the canonical path of
/// its backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl TableId {
    /// Creates a table id from its raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identity of a page: its table plus a zero-based page number.
///
/// This pair is the page cache's key; it is deterministic and stable for the
/// lifetime of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    table: TableId,
    page_no: u64,
}

impl PageId {
    /// Creates a new page id.
    pub const fn new(table: TableId, page_no: u64) -> Self {
        Self { table, page_no }
    }

    /// Returns the owning table's id.
    pub const fn table(&self) -> TableId {
        self.table
    }

    /// Returns the zero-based page number.
    pub const fn page_no(&self) -> u64 {
        self.page_no
    }

    /// Returns the byte offset of this page within its backing file.
    pub const fn byte_offset(&self) -> u64 {
        self.page_no * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.page_no)
    }
}

/// A heap page holding fixed-width tuples behind an occupancy bitmap.
#[derive(Debug)]
pub struct HeapPage {
    pid: PageId,
    schema: SchemaRef,
    data: Box<[u8]>,
}

impl HeapPage {
    /// Creates a fresh page with every slot free.
    pub fn empty(pid: PageId, schema: SchemaRef) -> Self {
        Self {
            pid,
            schema,
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Wraps existing page bytes read from the backing store.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not exactly [`PAGE_SIZE`] bytes; the raw IO path
    /// always produces full pages, so anything else is an internal bug.
    pub fn from_bytes(pid: PageId, schema: SchemaRef, data: Box<[u8]>) -> Self {
        assert_eq!(
            data.len(),
            PAGE_SIZE,
            "heap page requires exactly {} bytes, got {}",
            PAGE_SIZE,
            data.len()
        );
        Self { pid, schema, data }
    }

    /// Returns this page's identity.
    pub fn id(&self) -> PageId {
        self.pid
    }

    /// Returns the schema of the tuples on this page.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the serialized form of this page (the buffer itself).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of tuple slots this page holds.
    ///
    /// Each tuple costs `tuple_size * 8` bits of slot space plus one bitmap
    /// bit, so `slots = floor(PAGE_SIZE * 8 / (tuple_size * 8 + 1))`.
    pub fn slot_count(&self) -> usize {
        (PAGE_SIZE * 8) / (self.schema.byte_size() * 8 + 1)
    }

    /// Returns the size of the slot bitmap header in bytes.
    fn header_size(&self) -> usize {
        self.slot_count().div_ceil(8)
    }

    /// Returns the byte offset of slot `slot` within the page.
    fn slot_offset(&self, slot: usize) -> usize {
        self.header_size() + slot * self.schema.byte_size()
    }

    /// Returns true if slot `slot` holds a live tuple.
    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.slot_count() && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    /// Returns the number of free slots on this page.
    pub fn empty_slot_count(&self) -> usize {
        (0..self.slot_count()).filter(|&s| !self.is_slot_used(s)).count()
    }

    /// Inserts a tuple into the first free slot and stamps its record id.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::SchemaMismatch` if the tuple's schema differs from
    /// the page's, or `HeapError::PageFull` if no slot is free.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<usize, HeapError> {
        if **tuple.schema() != *self.schema {
            return Err(HeapError::SchemaMismatch);
        }
        let slot = (0..self.slot_count())
            .find(|&s| !self.is_slot_used(s))
            .ok_or(HeapError::PageFull(self.pid))?;

        let offset = self.slot_offset(slot);
        let width = self.schema.byte_size();
        tuple.write_to(&mut self.data[offset..offset + width])?;
        self.set_slot_used(slot, true);
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(slot)
    }

    /// Deletes a tuple resolved through its recorded location.
    ///
    /// The slot bytes are left in place; clearing the bitmap bit frees the
    /// slot for reuse.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::MissingRecordId` if the tuple was never stored,
    /// and `HeapError::TupleNotFound` if its recorded location is not a live
    /// slot on this page.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), HeapError> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        if rid.page_id != self.pid || !self.is_slot_used(rid.slot) {
            return Err(HeapError::TupleNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        self.set_slot_used(rid.slot, false);
        Ok(())
    }

    /// Parses the tuple in slot `slot`, which must be occupied.
    fn tuple_at(&self, slot: usize) -> Result<Tuple, SerializationError> {
        let offset = self.slot_offset(slot);
        let width = self.schema.byte_size();
        let mut tuple = Tuple::read_from(self.schema.clone(), &self.data[offset..offset + width])?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(tuple)
    }

    /// Returns a restartable iterator over the live tuples on this page.
    ///
    /// Each yielded tuple carries the [`RecordId`] of the slot it was read
    /// from. Free slots are skipped.
    pub fn tuples(&self) -> impl Iterator<Item = Result<Tuple, SerializationError>> + '_ {
        (0..self.slot_count())
            .filter(|&s| self.is_slot_used(s))
            .map(|s| self.tuple_at(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, Type};
    use crate::tuple::Value;
    use std::sync::Arc;

    fn int_schema() -> SchemaRef {
        Arc::new(Schema::new(&[Type::Int4], &["v"]))
    }

    fn int_tuple(schema: &SchemaRef, v: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![Value::Int(v)])
    }

    fn test_page(schema: &SchemaRef) -> HeapPage {
        HeapPage::empty(PageId::new(TableId::new(1), 0), schema.clone())
    }

    #[test]
    fn test_page_id_byte_offset() {
        let table = TableId::new(7);
        assert_eq!(PageId::new(table, 0).byte_offset(), 0);
        assert_eq!(PageId::new(table, 1).byte_offset(), 4096);
        assert_eq!(PageId::new(table, 100).byte_offset(), 409600);
    }

    #[test]
    fn test_slot_capacity_formula() {
        // 4-byte tuples: floor(4096 * 8 / 33) = 992 slots, 124 header bytes.
        let page = test_page(&int_schema());
        assert_eq!(page.slot_count(), 992);
        assert_eq!(page.header_size(), 124);
        assert!(page.header_size() + page.slot_count() * 4 <= PAGE_SIZE);
    }

    #[test]
    fn test_fresh_page_is_all_free() {
        let page = test_page(&int_schema());
        assert_eq!(page.empty_slot_count(), page.slot_count());
    }

    #[test]
    fn test_insert_stamps_record_id() {
        let schema = int_schema();
        let mut page = test_page(&schema);

        let mut tuple = int_tuple(&schema, 42);
        let slot = page.insert_tuple(&mut tuple).unwrap();

        assert_eq!(slot, 0);
        assert_eq!(tuple.record_id(), Some(RecordId::new(page.id(), 0)));
        assert_eq!(page.empty_slot_count(), page.slot_count() - 1);
    }

    #[test]
    fn test_insert_until_full() {
        let schema = int_schema();
        let mut page = test_page(&schema);
        let capacity = page.slot_count();

        for i in 0..capacity {
            page.insert_tuple(&mut int_tuple(&schema, i as i32)).unwrap();
        }
        assert_eq!(page.empty_slot_count(), 0);

        let err = page.insert_tuple(&mut int_tuple(&schema, -1)).unwrap_err();
        assert!(matches!(err, HeapError::PageFull(_)));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let mut page = test_page(&int_schema());
        let other = Arc::new(Schema::new(&[Type::Varchar], &["s"]));
        let mut tuple = Tuple::new(other, vec![Value::Varchar("x".to_string())]);
        assert!(matches!(
            page.insert_tuple(&mut tuple),
            Err(HeapError::SchemaMismatch)
        ));
    }

    #[test]
    fn test_delete_frees_slot_for_reuse() {
        let schema = int_schema();
        let mut page = test_page(&schema);

        let mut a = int_tuple(&schema, 1);
        let mut b = int_tuple(&schema, 2);
        page.insert_tuple(&mut a).unwrap();
        page.insert_tuple(&mut b).unwrap();

        let before = page.empty_slot_count();
        page.delete_tuple(&a).unwrap();
        assert_eq!(page.empty_slot_count(), before + 1);

        // Next insert reuses the freed slot 0.
        let mut c = int_tuple(&schema, 3);
        let slot = page.insert_tuple(&mut c).unwrap();
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_delete_requires_valid_location() {
        let schema = int_schema();
        let mut page = test_page(&schema);

        // No record id at all.
        let unstored = int_tuple(&schema, 1);
        assert!(matches!(
            page.delete_tuple(&unstored),
            Err(HeapError::MissingRecordId)
        ));

        // Wrong page.
        let mut other_page = HeapPage::empty(PageId::new(TableId::new(1), 9), schema.clone());
        let mut elsewhere = int_tuple(&schema, 2);
        other_page.insert_tuple(&mut elsewhere).unwrap();
        assert!(matches!(
            page.delete_tuple(&elsewhere),
            Err(HeapError::TupleNotFound { .. })
        ));

        // Already-freed slot.
        let mut tuple = int_tuple(&schema, 3);
        page.insert_tuple(&mut tuple).unwrap();
        page.delete_tuple(&tuple).unwrap();
        assert!(matches!(
            page.delete_tuple(&tuple),
            Err(HeapError::TupleNotFound { .. })
        ));
    }

    #[test]
    fn test_tuples_iterates_live_slots_only() {
        let schema = int_schema();
        let mut page = test_page(&schema);

        let mut a = int_tuple(&schema, 10);
        let mut b = int_tuple(&schema, 20);
        let mut c = int_tuple(&schema, 30);
        page.insert_tuple(&mut a).unwrap();
        page.insert_tuple(&mut b).unwrap();
        page.insert_tuple(&mut c).unwrap();
        page.delete_tuple(&b).unwrap();

        let values: Vec<i32> = page
            .tuples()
            .map(|t| match t.unwrap().value(0) {
                Value::Int(v) => *v,
                other => panic!("unexpected value {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![10, 30]);

        // The iterator is restartable.
        assert_eq!(page.tuples().count(), 2);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_layout() {
        let schema = int_schema();
        let mut page = test_page(&schema);
        for i in 0..5 {
            page.insert_tuple(&mut int_tuple(&schema, i)).unwrap();
        }

        let bytes: Box<[u8]> = page.as_bytes().into();
        let reread = HeapPage::from_bytes(page.id(), schema, bytes);
        assert_eq!(reread.empty_slot_count(), page.empty_slot_count());
        assert_eq!(reread.tuples().count(), 5);
    }
}
