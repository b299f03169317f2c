//! Query-facing operators over heap storage.
//!
//! The only operator here is [`SeqScan`], the sequential scan access method.
//! Operators implement [`TupleSource`], the open/next/rewind/close protocol
//! higher layers compose.

mod error;
mod seq_scan;

pub use error::ExecError;
pub use seq_scan::SeqScan;

use crate::schema::SchemaRef;
use crate::tuple::Tuple;

/// The operator protocol: a restartable source of tuples.
pub trait TupleSource {
    /// Opens the source. Must be called before tuples flow.
    fn open(&mut self) -> Result<(), ExecError>;

    /// Returns true if another tuple remains. False before `open`.
    fn has_next(&mut self) -> Result<bool, ExecError>;

    /// Yields the next tuple, or `None` when exhausted or closed.
    fn next(&mut self) -> Result<Option<Tuple>, ExecError>;

    /// Restarts the source from the beginning.
    fn rewind(&mut self) -> Result<(), ExecError>;

    /// Closes the source, releasing its resources.
    fn close(&mut self);

    /// Returns the schema of the tuples this source produces.
    fn schema(&self) -> Result<SchemaRef, ExecError>;
}
