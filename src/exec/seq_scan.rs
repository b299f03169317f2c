//! Sequential scan: reads every tuple of a table in storage order.

use std::sync::Arc;

use super::error::ExecError;
use super::TupleSource;
use crate::buffer::PageCache;
use crate::catalog::Catalog;
use crate::heap::{HeapScan, TableId};
use crate::schema::{Field, Schema, SchemaRef};
use crate::tuple::Tuple;
use crate::tx::TransactionId;

/// Sequential scan access method over one table.
///
/// The scan resolves its table through the catalog *at open time*, so it
/// always runs against the registry's current entry: re-registering a table
/// under the same name between constructing and opening a scan redirects the
/// scan to the new physical table.
///
/// The exposed schema qualifies every field name with the scan's alias as
/// `alias.field`. A field with no name of its own contributes the literal
/// `null` token instead, so a nameless column still yields a usable
/// qualified name.
pub struct SeqScan {
    catalog: Arc<Catalog>,
    cache: Arc<dyn PageCache>,
    tid: TransactionId,
    table_id: TableId,
    alias: String,
    scan: Option<HeapScan>,
    schema: Option<SchemaRef>,
}

impl SeqScan {
    /// Creates a scan over `table_id` as part of transaction `tid`, exposing
    /// fields under `alias`.
    pub fn new(
        catalog: Arc<Catalog>,
        cache: Arc<dyn PageCache>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> Self {
        Self {
            catalog,
            cache,
            tid,
            table_id,
            alias: alias.to_string(),
            scan: None,
            schema: None,
        }
    }

    /// Re-targets the scan at a different table and alias. The scan is
    /// closed; call [`open`](TupleSource::open) to resolve the new target.
    pub fn reset(&mut self, table_id: TableId, alias: &str) {
        self.close();
        self.table_id = table_id;
        self.alias = alias.to_string();
        self.schema = None;
    }

    /// Returns the scanned table's current display name in the catalog.
    pub fn table_name(&self) -> Result<String, ExecError> {
        Ok(self.catalog.name_of(self.table_id)?)
    }

    /// Returns the alias fields are qualified with.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn qualified_schema(&self, base: &Schema) -> Schema {
        let fields = base
            .fields()
            .iter()
            .map(|f| {
                let name = format!("{}.{}", self.alias, f.name().unwrap_or("null"));
                Field::new(f.ty(), name)
            })
            .collect();
        Schema::from_fields(fields)
    }
}

impl TupleSource for SeqScan {
    fn open(&mut self) -> Result<(), ExecError> {
        let file = self.catalog.file_of(self.table_id)?;
        let base = self.catalog.schema_of(self.table_id)?;
        self.schema = Some(Arc::new(self.qualified_schema(&base)));

        let mut scan = HeapScan::new(file, Arc::clone(&self.cache), self.tid);
        scan.open()?;
        self.scan = Some(scan);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecError> {
        match &mut self.scan {
            Some(scan) => Ok(scan.has_next()?),
            None => Ok(false),
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        match &mut self.scan {
            Some(scan) => Ok(scan.next()?),
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if let Some(scan) = &mut self.scan {
            scan.rewind()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut scan) = self.scan.take() {
            scan.close();
        }
    }

    fn schema(&self) -> Result<SchemaRef, ExecError> {
        match &self.schema {
            Some(schema) => Ok(schema.clone()),
            None => {
                // Not yet opened: derive from the current catalog entry.
                let base = self.catalog.schema_of(self.table_id)?;
                Ok(Arc::new(self.qualified_schema(&base)))
            }
        }
    }
}
