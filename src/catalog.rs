//! Table registry: maps table names and ids to files and schemas.
//!
//! The [`Catalog`] is process-wide, read-mostly shared state. One
//! authoritative id-keyed store of entries plus a derived name index live
//! under a single lock, so a registration is observed either completely or
//! not at all, so the maps can never disagree.
//!
//! Registering a file under a display name that is already taken evicts the
//! previous entry entirely: the old table becomes unreachable by id as well
//! as by name. Last registration wins.
//!
//! Every registered file is also handed to the buffer pool's file registry,
//! which is what actually materializes pages. [`Catalog::clear`] therefore
//! only drops the name/id mappings; already-opened files and in-flight
//! cursors over them keep working.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::buffer::BufferPool;
use crate::heap::{HeapError, HeapFile, TableId};
use crate::schema::{Schema, SchemaRef, Type};

/// Errors from catalog operations.
#[derive(Debug)]
pub enum CatalogError {
    /// No table registered under the name.
    TableNotFoundByName(String),
    /// No table registered under the id.
    TableNotFound(TableId),
    /// A schema file line failed to parse. The registry is untouched when
    /// this is returned.
    MalformedSchema {
        /// 1-based line number within the schema file.
        line: usize,
        /// What was wrong with it.
        message: String,
    },
    /// Opening a table's backing file failed.
    Heap(HeapError),
    /// Reading the schema file failed.
    Io(std::io::Error),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::TableNotFoundByName(name) => {
                write!(f, "no table named {:?}", name)
            }
            CatalogError::TableNotFound(id) => write!(f, "no table with id {}", id),
            CatalogError::MalformedSchema { line, message } => {
                write!(f, "malformed schema file at line {}: {}", line, message)
            }
            CatalogError::Heap(err) => write!(f, "{}", err),
            CatalogError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<HeapError> for CatalogError {
    fn from(err: HeapError) -> Self {
        CatalogError::Heap(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: String,
    schema: SchemaRef,
}

#[derive(Default)]
struct CatalogState {
    /// Authoritative store, keyed by table id.
    tables: HashMap<TableId, Arc<TableEntry>>,
    /// Derived name index into `tables`.
    names: HashMap<String, TableId>,
}

/// The table registry.
pub struct Catalog {
    pool: Arc<BufferPool>,
    state: RwLock<CatalogState>,
}

impl Catalog {
    /// Creates an empty catalog backed by the given buffer pool.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Returns the buffer pool this catalog feeds registered files into.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Registers a table. The id and schema come from the file itself.
    ///
    /// If `name` is already registered, the previous entry is evicted in the
    /// same critical section that installs the new one: its id stops
    /// resolving everywhere, and `name` resolves to `file` from now on.
    pub fn register(&self, file: Arc<HeapFile>, name: &str, primary_key: &str) -> TableId {
        let id = file.id();
        let schema = file.schema().clone();
        self.pool.register_file(Arc::clone(&file));

        let entry = Arc::new(TableEntry {
            file,
            name: name.to_string(),
            primary_key: primary_key.to_string(),
            schema,
        });

        let mut state = self.state.write();
        if let Some(old_id) = state.names.get(name).copied() {
            state.tables.remove(&old_id);
        }
        state.names.insert(name.to_string(), id);
        state.tables.insert(id, entry);
        drop(state);

        debug!(table = %id, name, "registered table");
        id
    }

    /// Registers a table with an empty primary-key field.
    pub fn register_with_name(&self, file: Arc<HeapFile>, name: &str) -> TableId {
        self.register(file, name, "")
    }

    /// Registers a table under a generated, currently-unused random name.
    pub fn register_unnamed(&self, file: Arc<HeapFile>) -> TableId {
        let name = loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();
            if !self.state.read().names.contains_key(&candidate) {
                break candidate;
            }
        };
        self.register_with_name(file, &name)
    }

    /// Returns the id of the table registered under `name`.
    pub fn id_of(&self, name: &str) -> Result<TableId, CatalogError> {
        self.state
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFoundByName(name.to_string()))
    }

    fn entry(&self, id: TableId) -> Result<Arc<TableEntry>, CatalogError> {
        self.state
            .read()
            .tables
            .get(&id)
            .cloned()
            .ok_or(CatalogError::TableNotFound(id))
    }

    /// Returns the schema of table `id`.
    pub fn schema_of(&self, id: TableId) -> Result<SchemaRef, CatalogError> {
        Ok(self.entry(id)?.schema.clone())
    }

    /// Returns the backing file of table `id`.
    pub fn file_of(&self, id: TableId) -> Result<Arc<HeapFile>, CatalogError> {
        Ok(Arc::clone(&self.entry(id)?.file))
    }

    /// Returns the primary-key field name of table `id` (possibly empty).
    pub fn primary_key_of(&self, id: TableId) -> Result<String, CatalogError> {
        Ok(self.entry(id)?.primary_key.clone())
    }

    /// Returns the display name of table `id`.
    pub fn name_of(&self, id: TableId) -> Result<String, CatalogError> {
        Ok(self.entry(id)?.name.clone())
    }

    /// Returns a snapshot of all registered table ids.
    pub fn table_ids(&self) -> Vec<TableId> {
        self.state.read().tables.keys().copied().collect()
    }

    /// Drops every registration. Already-opened files and cursors over them
    /// are unaffected; only name/id resolution is reset.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.tables.clear();
        state.names.clear();
    }

    /// Loads table definitions from a schema text file and registers them.
    ///
    /// Format, one table per line:
    ///
    /// ```text
    /// users (id int pk, name string)
    /// orders (id int pk, user_id int)
    /// ```
    ///
    /// Each table's backing file is `<name>.dat` next to the schema file.
    /// The whole file is parsed and every backing file opened before any
    /// table is registered, so a malformed line or unopenable file leaves
    /// the registry exactly as it was.
    pub fn load_schema(&self, path: impl AsRef<Path>) -> Result<Vec<TableId>, CatalogError> {
        let path = path.as_ref();
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let text = std::fs::read_to_string(path)?;

        let mut staged = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            staged.push(parse_schema_line(line, line_no)?);
        }

        // Open every backing file before touching the registry.
        let mut opened = Vec::with_capacity(staged.len());
        for (name, schema, primary_key) in staged {
            let file = HeapFile::open(base.join(format!("{}.dat", name)), Arc::new(schema))?;
            opened.push((Arc::new(file), name, primary_key));
        }

        let mut ids = Vec::with_capacity(opened.len());
        for (file, name, primary_key) in opened {
            ids.push(self.register(file, &name, &primary_key));
        }
        Ok(ids)
    }
}

/// Parses one `name (field type[ pk], ...)` schema line.
fn parse_schema_line(
    line: &str,
    line_no: usize,
) -> Result<(String, Schema, String), CatalogError> {
    let malformed = |message: String| CatalogError::MalformedSchema {
        line: line_no,
        message,
    };

    let open = line
        .find('(')
        .ok_or_else(|| malformed("missing '('".to_string()))?;
    let close = line
        .rfind(')')
        .ok_or_else(|| malformed("missing ')'".to_string()))?;
    if close < open {
        return Err(malformed("')' precedes '('".to_string()));
    }

    let name = line[..open].trim();
    if name.is_empty() {
        return Err(malformed("missing table name".to_string()));
    }

    let mut types = Vec::new();
    let mut names = Vec::new();
    let mut primary_key = String::new();
    for field_spec in line[open + 1..close].split(',') {
        let mut parts = field_spec.split_whitespace();
        let field_name = parts
            .next()
            .ok_or_else(|| malformed("empty field declaration".to_string()))?;
        let type_name = parts
            .next()
            .ok_or_else(|| malformed(format!("field {:?} has no type", field_name)))?;
        let ty = match type_name.to_ascii_lowercase().as_str() {
            "int" => Type::Int4,
            "string" => Type::Varchar,
            other => return Err(malformed(format!("unknown type {:?}", other))),
        };
        match parts.next() {
            None => {}
            Some("pk") => primary_key = field_name.to_string(),
            Some(other) => {
                return Err(malformed(format!("unknown annotation {:?}", other)));
            }
        }
        types.push(ty);
        names.push(field_name.to_string());
    }
    if types.is_empty() {
        return Err(malformed("table has no fields".to_string()));
    }

    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    Ok((name.to_string(), Schema::new(&types, &name_refs), primary_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::schema::Type;
    use tempfile::TempDir;

    fn int_schema() -> SchemaRef {
        Arc::new(Schema::new(&[Type::Int4], &["v"]))
    }

    struct Fixture {
        dir: TempDir,
        catalog: Catalog,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(Arc::new(BufferPool::new(16)));
        Fixture { dir, catalog }
    }

    fn open_file(f: &Fixture, name: &str) -> Arc<HeapFile> {
        Arc::new(HeapFile::open(f.dir.path().join(name), int_schema()).unwrap())
    }

    #[test]
    fn test_register_and_lookup() {
        let f = fixture();
        let file = open_file(&f, "users.dat");
        let id = f.catalog.register(Arc::clone(&file), "users", "id");

        assert_eq!(id, file.id());
        assert_eq!(f.catalog.id_of("users").unwrap(), id);
        assert_eq!(f.catalog.name_of(id).unwrap(), "users");
        assert_eq!(f.catalog.primary_key_of(id).unwrap(), "id");
        assert_eq!(*f.catalog.schema_of(id).unwrap(), *int_schema());
        assert_eq!(f.catalog.file_of(id).unwrap().id(), id);
    }

    #[test]
    fn test_lookups_fail_when_absent() {
        let f = fixture();
        assert!(matches!(
            f.catalog.id_of("ghost"),
            Err(CatalogError::TableNotFoundByName(_))
        ));

        let bogus = TableId::new(0xdead);
        assert!(matches!(f.catalog.schema_of(bogus), Err(CatalogError::TableNotFound(_))));
        assert!(matches!(f.catalog.file_of(bogus), Err(CatalogError::TableNotFound(_))));
        assert!(matches!(f.catalog.name_of(bogus), Err(CatalogError::TableNotFound(_))));
        assert!(matches!(
            f.catalog.primary_key_of(bogus),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_same_name_reregistration_evicts_old_id() {
        let f = fixture();
        let first = open_file(&f, "a.dat");
        let second = open_file(&f, "b.dat");
        let first_id = f.catalog.register(first, "t", "");
        let second_id = f.catalog.register(second, "t", "");

        assert_ne!(first_id, second_id);
        assert_eq!(f.catalog.id_of("t").unwrap(), second_id);

        // The old physical table is unreachable by id as well as by name.
        assert!(matches!(
            f.catalog.schema_of(first_id),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            f.catalog.file_of(first_id),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            f.catalog.primary_key_of(first_id),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_register_with_name_defaults_primary_key_to_empty() {
        let f = fixture();
        let file = open_file(&f, "t.dat");
        let id = f.catalog.register_with_name(file, "t");
        assert_eq!(f.catalog.primary_key_of(id).unwrap(), "");
    }

    #[test]
    fn test_register_unnamed_generates_unique_names() {
        let f = fixture();
        let a = f.catalog.register_unnamed(open_file(&f, "a.dat"));
        let b = f.catalog.register_unnamed(open_file(&f, "b.dat"));

        let name_a = f.catalog.name_of(a).unwrap();
        let name_b = f.catalog.name_of(b).unwrap();
        assert_ne!(name_a, name_b);
        assert_eq!(f.catalog.id_of(&name_a).unwrap(), a);
        assert_eq!(f.catalog.id_of(&name_b).unwrap(), b);
    }

    #[test]
    fn test_table_ids_snapshot() {
        let f = fixture();
        let a = f.catalog.register_with_name(open_file(&f, "a.dat"), "a");
        let b = f.catalog.register_with_name(open_file(&f, "b.dat"), "b");

        let mut ids = f.catalog.table_ids();
        ids.sort_unstable();
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_clear_drops_all_mappings() {
        let f = fixture();
        let id = f.catalog.register_with_name(open_file(&f, "a.dat"), "a");
        f.catalog.clear();

        assert!(f.catalog.table_ids().is_empty());
        assert!(f.catalog.id_of("a").is_err());
        assert!(f.catalog.schema_of(id).is_err());
    }

    #[test]
    fn test_load_schema() {
        let f = fixture();
        let schema_path = f.dir.path().join("catalog.schema");
        std::fs::write(
            &schema_path,
            "users (id int pk, name string)\norders (id int pk, user_id int)\n",
        )
        .unwrap();

        let ids = f.catalog.load_schema(&schema_path).unwrap();
        assert_eq!(ids.len(), 2);

        let users = f.catalog.id_of("users").unwrap();
        assert_eq!(f.catalog.primary_key_of(users).unwrap(), "id");
        let schema = f.catalog.schema_of(users).unwrap();
        assert_eq!(schema.num_fields(), 2);
        assert_eq!(schema.field_type(1).unwrap(), Type::Varchar);
        assert!(f.dir.path().join("users.dat").exists());
    }

    #[test]
    fn test_malformed_schema_leaves_registry_untouched() {
        let f = fixture();
        let schema_path = f.dir.path().join("catalog.schema");
        std::fs::write(
            &schema_path,
            "users (id int pk, name string)\nbroken (id frob)\n",
        )
        .unwrap();

        let err = f.catalog.load_schema(&schema_path).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedSchema { line: 2, .. }));
        assert!(f.catalog.table_ids().is_empty());
        assert!(f.catalog.id_of("users").is_err());
    }
}
