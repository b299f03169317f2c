//! Tuples, typed values, and their fixed-width serialization.
//!
//! A [`Tuple`] is a row of [`Value`]s conforming to a [`Schema`]. Because
//! every field type has a fixed width, a tuple's serialized form is exactly
//! `schema.byte_size()` bytes, written field after field:
//!
//! ```text
//! +-----------+-----------+------
//! | Value[0]  | Value[1]  | ...     each value at its fixed width
//! +-----------+-----------+------
//! ```
//!
//! Integers are 4-byte little-endian. Strings are a 4-byte little-endian
//! length prefix followed by [`VARCHAR_LEN`] payload bytes, zero-padded
//! (over-long strings are truncated on write).
//!
//! A tuple read from, or inserted into, a heap page carries a [`RecordId`]
//! naming its home page and slot; deletion resolves the tuple through it.
//!
//! [`Schema`]: crate::schema::Schema

use std::fmt;

use crate::heap::PageId;
use crate::schema::{SchemaRef, Type, VARCHAR_LEN};

/// Errors from value serialization/deserialization.
#[derive(Debug)]
pub enum SerializationError {
    /// Buffer does not match the field's fixed width.
    BufferSizeMismatch {
        /// Bytes required by the field type.
        required: usize,
        /// Bytes provided.
        available: usize,
    },
    /// Stored bytes do not decode to a valid value.
    InvalidFormat(String),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::BufferSizeMismatch { required, available } => {
                write!(f, "buffer size mismatch: need {} bytes, have {}", required, available)
            }
            SerializationError::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for SerializationError {}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// 4-byte signed integer.
    Int(i32),
    /// Fixed-width string (truncated to [`VARCHAR_LEN`] bytes on write).
    Varchar(String),
}

impl Value {
    /// Returns the [`Type`] of this value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int4,
            Value::Varchar(_) => Type::Varchar,
        }
    }

    /// Serializes this value into `buf`, which must be exactly the field's
    /// fixed width.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), SerializationError> {
        let required = self.type_of().size();
        if buf.len() != required {
            return Err(SerializationError::BufferSizeMismatch {
                required,
                available: buf.len(),
            });
        }
        match self {
            Value::Int(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Value::Varchar(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(VARCHAR_LEN);
                buf[0..4].copy_from_slice(&(len as u32).to_le_bytes());
                buf[4..4 + len].copy_from_slice(&bytes[..len]);
                buf[4 + len..].fill(0);
            }
        }
        Ok(())
    }

    /// Deserializes a value of type `ty` from `buf`, which must be exactly
    /// the field's fixed width.
    pub fn read_from(ty: Type, buf: &[u8]) -> Result<Self, SerializationError> {
        let required = ty.size();
        if buf.len() != required {
            return Err(SerializationError::BufferSizeMismatch {
                required,
                available: buf.len(),
            });
        }
        match ty {
            Type::Int4 => {
                let bytes: [u8; 4] = buf.try_into().map_err(|_| {
                    SerializationError::InvalidFormat("short integer field".to_string())
                })?;
                Ok(Value::Int(i32::from_le_bytes(bytes)))
            }
            Type::Varchar => {
                let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
                if len > VARCHAR_LEN {
                    return Err(SerializationError::InvalidFormat(format!(
                        "string length {} exceeds maximum {}",
                        len, VARCHAR_LEN
                    )));
                }
                let s = std::str::from_utf8(&buf[4..4 + len]).map_err(|e| {
                    SerializationError::InvalidFormat(format!("invalid utf-8 payload: {}", e))
                })?;
                Ok(Value::Varchar(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "{:?}", s),
        }
    }
}

/// Stable location of a stored tuple: its home page plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page containing the tuple.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot: usize,
}

impl RecordId {
    /// Creates a new record identifier.
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A row of values conforming to a schema.
///
/// Freshly built tuples have no [`RecordId`]; the heap page codec stamps one
/// when the tuple is inserted, and every tuple surfaced by a scan carries the
/// location it was read from.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: SchemaRef,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple from a schema and a matching row of values.
    ///
    /// # Panics
    ///
    /// Panics if the value count or any value type disagrees with the
    /// schema. Both are caller bugs, mirroring the stance of
    /// [`Schema::new`](crate::schema::Schema::new).
    pub fn new(schema: SchemaRef, values: Vec<Value>) -> Self {
        assert_eq!(
            schema.num_fields(),
            values.len(),
            "tuple arity must match its schema"
        );
        for (i, value) in values.iter().enumerate() {
            let expected = schema.field_type(i).expect("index checked above");
            assert_eq!(
                value.type_of(),
                expected,
                "value type mismatch at field {}",
                i
            );
        }
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Returns the tuple's schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value of field `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn value(&self, i: usize) -> &Value {
        &self.values[i]
    }

    /// Returns the tuple's stored location, if it has one.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Stamps the tuple's stored location. Used by the heap page codec when
    /// the tuple is inserted or parsed out of a page.
    pub(crate) fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Serializes this tuple into `buf`, which must be exactly
    /// `schema.byte_size()` bytes.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), SerializationError> {
        let required = self.schema.byte_size();
        if buf.len() != required {
            return Err(SerializationError::BufferSizeMismatch {
                required,
                available: buf.len(),
            });
        }
        let mut offset = 0;
        for value in &self.values {
            let width = value.type_of().size();
            value.write_to(&mut buf[offset..offset + width])?;
            offset += width;
        }
        Ok(())
    }

    /// Deserializes a tuple from `buf`, which must be exactly
    /// `schema.byte_size()` bytes. The result carries no record id.
    pub fn read_from(schema: SchemaRef, buf: &[u8]) -> Result<Self, SerializationError> {
        let required = schema.byte_size();
        if buf.len() != required {
            return Err(SerializationError::BufferSizeMismatch {
                required,
                available: buf.len(),
            });
        }
        let mut values = Vec::with_capacity(schema.num_fields());
        let mut offset = 0;
        for i in 0..schema.num_fields() {
            let ty = schema
                .field_type(i)
                .expect("field index bounded by num_fields");
            let width = ty.size();
            values.push(Value::read_from(ty, &buf[offset..offset + width])?);
            offset += width;
        }
        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
