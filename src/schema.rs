//! Tuple schema descriptors.
//!
//! A [`Schema`] is an immutable, ordered list of typed fields describing the
//! shape of every tuple in a table. Field widths are fixed, so the byte size
//! of a tuple is known from its schema alone; the heap page codec relies on
//! this to carve a page into equal-sized slots.
//!
//! Field names are optional display metadata: they may be absent or
//! duplicated, and two schemas compare equal whenever their field *types*
//! match pairwise, regardless of names.

use std::fmt;
use std::sync::Arc;

/// Fixed payload length of a [`Type::Varchar`] field in bytes.
///
/// Strings are stored as a 4-byte length prefix followed by exactly this many
/// payload bytes, zero-padded. Longer strings are truncated on write.
pub const VARCHAR_LEN: usize = 128;

/// Errors from schema lookups.
#[derive(Debug)]
pub enum SchemaError {
    /// Field index is outside the schema.
    FieldIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of fields in the schema.
        num_fields: usize,
    },
    /// No field carries the requested name.
    FieldNotFound(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::FieldIndexOutOfRange { index, num_fields } => {
                write!(f, "field index {} out of range for {} fields", index, num_fields)
            }
            SchemaError::FieldNotFound(name) => {
                write!(f, "no field named {:?}", name)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Field data type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 4-byte signed integer.
    Int4,
    /// Fixed-width string: 4-byte length prefix + [`VARCHAR_LEN`] payload bytes.
    Varchar,
}

impl Type {
    /// Returns the serialized width of a value of this type in bytes.
    pub const fn size(self) -> usize {
        match self {
            Type::Int4 => 4,
            Type::Varchar => 4 + VARCHAR_LEN,
        }
    }

    /// Returns the SQL-ish display name for this type.
    pub const fn display_name(self) -> &'static str {
        match self {
            Type::Int4 => "INT",
            Type::Varchar => "VARCHAR",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single schema field: a type plus an optional display name.
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    ty: Type,
}

impl Field {
    /// Creates a named field.
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Creates a field with no display name.
    pub fn anonymous(ty: Type) -> Self {
        Self { name: None, ty }
    }

    /// Returns the field's display name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the field's type.
    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// An immutable, ordered tuple schema.
///
/// # Example
///
/// ```
/// use heapstore::schema::{Schema, Type};
///
/// let schema = Schema::new(&[Type::Int4, Type::Varchar], &["id", "name"]);
/// assert_eq!(schema.num_fields(), 2);
/// assert_eq!(schema.index_of("name").unwrap(), 1);
/// assert_eq!(schema.byte_size(), 4 + 4 + 128);
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
}

/// Shared handle to a schema.
///
/// Schemas are immutable after construction, so they are shared freely
/// between the catalog, heap files, pages, and tuples.
pub type SchemaRef = Arc<Schema>;

impl Schema {
    /// Creates a schema from parallel type and name sequences.
    ///
    /// # Panics
    ///
    /// Panics if the sequences differ in length or are empty. Both are caller
    /// bugs, not runtime conditions.
    pub fn new(types: &[Type], names: &[&str]) -> Self {
        assert_eq!(
            types.len(),
            names.len(),
            "schema type/name sequences must have equal length"
        );
        let fields = types
            .iter()
            .zip(names)
            .map(|(&ty, &name)| Field::new(ty, name))
            .collect();
        Self::from_fields(fields)
    }

    /// Creates a schema of anonymous (unnamed) fields.
    ///
    /// # Panics
    ///
    /// Panics if `types` is empty.
    pub fn from_types(types: &[Type]) -> Self {
        Self::from_fields(types.iter().map(|&ty| Field::anonymous(ty)).collect())
    }

    /// Creates a schema from pre-built fields.
    ///
    /// # Panics
    ///
    /// Panics if `fields` is empty.
    pub fn from_fields(fields: Vec<Field>) -> Self {
        assert!(!fields.is_empty(), "schema must have at least one field");
        Self { fields }
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the name of field `i`, or `None` if the field is anonymous.
    pub fn field_name(&self, i: usize) -> Result<Option<&str>, SchemaError> {
        self.field(i).map(Field::name)
    }

    /// Returns the type of field `i`.
    pub fn field_type(&self, i: usize) -> Result<Type, SchemaError> {
        self.field(i).map(Field::ty)
    }

    fn field(&self, i: usize) -> Result<&Field, SchemaError> {
        self.fields.get(i).ok_or(SchemaError::FieldIndexOutOfRange {
            index: i,
            num_fields: self.fields.len(),
        })
    }

    /// Returns the index of the first field named `name`.
    ///
    /// Names carry no uniqueness invariant; with duplicates the first match
    /// wins. Anonymous fields never match.
    pub fn index_of(&self, name: &str) -> Result<usize, SchemaError> {
        self.fields
            .iter()
            .position(|f| f.name() == Some(name))
            .ok_or_else(|| SchemaError::FieldNotFound(name.to_string()))
    }

    /// Returns the serialized size in bytes of a tuple with this schema.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }

    /// Concatenates two schemas into a new one, `self`'s fields first.
    ///
    /// Neither operand is modified.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut fields = Vec::with_capacity(self.fields.len() + other.fields.len());
        fields.extend(self.fields.iter().cloned());
        fields.extend(other.fields.iter().cloned());
        Schema { fields }
    }
}

/// Structural equality: same field count and pairwise-equal field *types*.
/// Names are display metadata and do not participate.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.ty == b.ty)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}({})", field.ty, field.name().unwrap_or(""))?;
        }
        Ok(())
    }
}
