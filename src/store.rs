//! Store handles: the read-side [`EventStore`] and the single-writer
//! [`StoreWriter`].
//!
//! A store is a directory holding two index files and one column folder
//! per event type. `records.idx` is the global chronological index: one
//! 2-byte little-endian type id per event, in cross-type write order.
//! `types.idx` maps type names to those ids and only ever grows.
//!
//! Exactly one writer may append to a store at a time; readers replay a
//! fixed prefix of it and never coordinate with the writer.

use std::any::TypeId;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::codec::{CodecRegistry, CustomCodec, read_varint, write_varint};
use crate::column::RecordWriter;
use crate::error::{Error, Result};
use crate::schema::Persist;
use crate::storage::StoreLayout;

/// In-memory view of `types.idx`: name-to-id in both directions.
///
/// Ids are assigned in first-append order and are never reused or
/// reassigned; the registry file is append-only.
#[derive(Debug, Default)]
pub(crate) struct TypeRegistry {
    ids: HashMap<String, u16>,
    names: HashMap<u16, String>,
    next_id: u32,
}

impl TypeRegistry {
    /// Parses the registry file into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] for a truncated entry, a non-UTF-8
    /// name, or a duplicate id or name.
    fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path)?;
        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let mut registry = Self::default();

        while cursor.position() < len {
            let mut id_bytes = [0u8; 2];
            cursor
                .read_exact(&mut id_bytes)
                .map_err(|_| corrupt("truncated type id".to_string()))?;
            let id = u16::from_le_bytes(id_bytes);

            let name_len = read_varint(&mut cursor)
                .map_err(|e| corrupt(format!("bad name length: {e}")))? as usize;
            let mut name_bytes = vec![0u8; name_len];
            cursor
                .read_exact(&mut name_bytes)
                .map_err(|_| corrupt(format!("truncated name for type id {id}")))?;
            let name = String::from_utf8(name_bytes)
                .map_err(|_| corrupt(format!("non-UTF-8 name for type id {id}")))?;

            if registry.names.contains_key(&id) {
                return Err(corrupt(format!("type id {id} registered twice")));
            }
            if registry.ids.contains_key(&name) {
                return Err(corrupt(format!("type `{name}` registered twice")));
            }

            registry.next_id = registry.next_id.max(u32::from(id) + 1);
            registry.ids.insert(name.clone(), id);
            registry.names.insert(id, name);
        }
        Ok(registry)
    }

    /// Id of a registered type name, if any.
    pub(crate) fn id_of(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    /// Number of registered types.
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    /// Assigns the next free id to `name` and records the pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeSpaceExhausted`] once all 65536 ids are taken.
    fn assign(&mut self, name: &str) -> Result<u16> {
        let id = u16::try_from(self.next_id).map_err(|_| Error::TypeSpaceExhausted)?;
        self.next_id += 1;
        self.ids.insert(name.to_string(), id);
        self.names.insert(id, name.to_string());
        Ok(id)
    }
}

/// Read-side handle to an existing store.
///
/// Opening validates the directory layout and loads the type registry;
/// replay itself happens through [`EventStore::project`]. The handle is
/// independent of any writer and sees the store as it was at open time
/// plus whatever has been flushed since.
///
/// # Examples
///
/// ```no_run
/// use eventcol::EventStore;
///
/// # fn main() -> eventcol::Result<()> {
/// let store = EventStore::open("/var/lib/myapp/events")?;
/// assert!(store.type_id("bank.Deposited").is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EventStore {
    pub(crate) layout: StoreLayout,
    pub(crate) codecs: CodecRegistry,
    pub(crate) types: TypeRegistry,
}

impl EventStore {
    /// Opens the store rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotFound`] if either index file is missing,
    /// [`Error::CorruptIndex`] if the type registry does not parse, and
    /// propagates I/O failures.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let layout = StoreLayout::new(base_dir.as_ref());
        if !layout.records_path().is_file() || !layout.types_path().is_file() {
            return Err(Error::StoreNotFound(layout.base_dir().to_path_buf()));
        }

        // Every index entry is exactly two bytes; an odd length means a
        // torn trailing append.
        let records_len = std::fs::metadata(layout.records_path())?.len();
        if records_len % 2 != 0 {
            return Err(Error::CorruptIndex {
                path: layout.records_path(),
                reason: format!("odd byte count {records_len}"),
            });
        }

        let types = TypeRegistry::load(&layout.types_path())?;
        tracing::debug!(
            base_dir = %layout.base_dir().display(),
            registered_types = types.len(),
            "opened event store"
        );

        Ok(Self {
            layout,
            codecs: CodecRegistry::default(),
            types,
        })
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        self.layout.base_dir()
    }

    /// Registers a custom codec under `name` for this handle.
    ///
    /// Must cover every [`ColumnType::Custom`](crate::ColumnType::Custom)
    /// column of every type a later projection run touches; missing codecs
    /// fail the run at construction.
    pub fn register_codec(&mut self, name: &'static str, codec: CustomCodec) {
        self.codecs.insert(name, codec);
    }

    /// Id under which a type name was registered, if it ever was.
    pub fn type_id(&self, name: &str) -> Option<u16> {
        self.types.id_of(name)
    }

    /// Names of all registered types, in id order.
    pub fn type_names(&self) -> Vec<&str> {
        let mut pairs: Vec<(u16, &str)> = self
            .types
            .names
            .iter()
            .map(|(id, name)| (*id, name.as_str()))
            .collect();
        pairs.sort_unstable_by_key(|(id, _)| *id);
        pairs.into_iter().map(|(_, name)| name).collect()
    }

    /// Starts configuring a projection replay over this store.
    ///
    /// See [`Projection`](crate::Projection) for handler registration and
    /// execution.
    pub fn project<M: Default>(&self) -> crate::projection::Projection<'_, M> {
        crate::projection::Projection::new(self)
    }
}

/// Single-writer append handle.
///
/// Creates the store on first open. Each appended event writes one value
/// to every column file of its type and one type id to the global index,
/// keeping all files in positional lockstep. Writers for a type are
/// created lazily on its first append and reused for the handle's
/// lifetime.
///
/// Buffered data is made durable by [`StoreWriter::flush`]; dropping the
/// writer flushes as a fallback and logs any failure.
pub struct StoreWriter {
    layout: StoreLayout,
    codecs: CodecRegistry,
    types: TypeRegistry,
    records: BufWriter<File>,
    types_file: File,
    writers: HashMap<TypeId, (u16, RecordWriter)>,
    poisoned: bool,
}

// Manual `Debug`: column writers hold open files and no printable state.
impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("base_dir", &self.layout.base_dir())
            .field("registered_types", &self.types.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl StoreWriter {
    /// Opens (creating as needed) the store rooted at `base_dir` for
    /// appending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if an existing type registry does
    /// not parse, and propagates I/O failures.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let layout = StoreLayout::new(base_dir.as_ref());
        layout.ensure_store()?;
        let types = TypeRegistry::load(&layout.types_path())?;

        let records = BufWriter::new(
            OpenOptions::new()
                .append(true)
                .open(layout.records_path())?,
        );
        let types_file = OpenOptions::new().append(true).open(layout.types_path())?;

        tracing::debug!(
            base_dir = %layout.base_dir().display(),
            registered_types = types.len(),
            "opened store writer"
        );

        Ok(Self {
            layout,
            codecs: CodecRegistry::default(),
            types,
            records,
            types_file,
            writers: HashMap::new(),
            poisoned: false,
        })
    }

    /// Registers a custom codec under `name` for this handle.
    ///
    /// Must happen before the first append of any type that declares a
    /// column under that codec name.
    pub fn register_codec(&mut self, name: &'static str, codec: CustomCodec) {
        self.codecs.insert(name, codec);
    }

    /// Appends one event.
    ///
    /// On the first append of a type this validates its schema, registers
    /// it (assigning the next free id and persisting the registry entry
    /// immediately), and creates its column folder. Every append then
    /// writes one value per column plus one id to the global index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedColumn`] for an invalid schema,
    /// [`Error::TypeSpaceExhausted`] past 65536 distinct types, and
    /// propagates I/O failures. A failed append can leave the type's
    /// column files at unequal lengths, so it poisons the handle: every
    /// later append returns [`Error::WriterPoisoned`]. Discard the writer
    /// and open a fresh one.
    pub fn append<E: Persist>(&mut self, event: &E) -> Result<()> {
        if self.poisoned {
            return Err(Error::WriterPoisoned);
        }
        let result = self.append_inner(event);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn append_inner<E: Persist>(&mut self, event: &E) -> Result<()> {
        let key = TypeId::of::<E>();
        if !self.writers.contains_key(&key) {
            let schema = E::schema();
            let id = match self.types.id_of(schema.name()) {
                Some(id) => id,
                None => {
                    let id = self.types.assign(schema.name())?;
                    // One write_all per entry so a crash can tear at most
                    // the trailing entry, which load reports as corrupt.
                    let mut entry = Vec::with_capacity(schema.name().len() + 4);
                    entry.extend_from_slice(&id.to_le_bytes());
                    write_varint(&mut entry, schema.name().len() as u64)?;
                    entry.extend_from_slice(schema.name().as_bytes());
                    self.types_file.write_all(&entry)?;
                    tracing::debug!(type_name = schema.name(), id, "registered event type");
                    id
                }
            };

            let dir = self.layout.ensure_type_dir(schema.name())?;
            let writer = RecordWriter::create(&dir, &schema, &self.codecs)?;
            self.writers.insert(key, (id, writer));
        }

        // Lookup cannot fail after the insert above.
        if let Some((id, writer)) = self.writers.get_mut(&key) {
            writer.append(event)?;
            self.records.write_all(&id.to_le_bytes())?;
        }
        Ok(())
    }

    /// Drains all buffered column and index data to disk.
    ///
    /// After a successful flush, a fresh [`EventStore`] sees every append
    /// made so far.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures.
    pub fn flush(&mut self) -> Result<()> {
        for (_, writer) in self.writers.values_mut() {
            writer.flush()?;
        }
        self.records.flush()?;
        Ok(())
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(
                base_dir = %self.layout.base_dir().display(),
                error = %e,
                "flush on drop failed; trailing appends may be lost"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, TypeSchema};
    use crate::value::Value;

    #[derive(Debug, Default)]
    struct Deposited {
        account: u32,
        amount_cents: i64,
    }

    impl Persist for Deposited {
        fn schema() -> TypeSchema {
            TypeSchema::builder("bank.Deposited")
                .column("Account", ColumnType::U32)
                .column("AmountCents", ColumnType::I64)
                .build()
        }

        fn get(&self, column: usize) -> Value {
            match column {
                0 => Value::U32(self.account),
                _ => Value::I64(self.amount_cents),
            }
        }

        fn set(&mut self, column: usize, value: Value) {
            match (column, value) {
                (0, Value::U32(v)) => self.account = v,
                (1, Value::I64(v)) => self.amount_cents = v,
                _ => {}
            }
        }
    }

    #[derive(Debug, Default)]
    struct Withdrawn {
        account: u32,
    }

    impl Persist for Withdrawn {
        fn schema() -> TypeSchema {
            TypeSchema::builder("bank.Withdrawn")
                .column("Account", ColumnType::U32)
                .build()
        }

        fn get(&self, _column: usize) -> Value {
            Value::U32(self.account)
        }

        fn set(&mut self, _column: usize, value: Value) {
            if let Value::U32(v) = value {
                self.account = v;
            }
        }
    }

    #[test]
    fn open_missing_store_fails_with_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = EventStore::open(tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[test]
    fn writer_creates_store_and_reader_opens_it() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&Deposited { account: 1, amount_cents: 500 }).unwrap();
        writer.flush().unwrap();

        let store = EventStore::open(tmp.path()).unwrap();
        assert_eq!(store.type_id("bank.Deposited"), Some(0));
        assert_eq!(store.type_names(), ["bank.Deposited"]);
    }

    #[test]
    fn type_ids_assigned_in_first_append_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&Withdrawn { account: 9 }).unwrap();
        writer.append(&Deposited { account: 1, amount_cents: 500 }).unwrap();
        writer.append(&Withdrawn { account: 9 }).unwrap();
        writer.flush().unwrap();

        let store = EventStore::open(tmp.path()).unwrap();
        assert_eq!(store.type_id("bank.Withdrawn"), Some(0));
        assert_eq!(store.type_id("bank.Deposited"), Some(1));
    }

    #[test]
    fn type_ids_are_stable_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Deposited::default()).unwrap();
        }
        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Withdrawn::default()).unwrap();
            writer.append(&Deposited::default()).unwrap();
        }

        let store = EventStore::open(tmp.path()).unwrap();
        assert_eq!(store.type_id("bank.Deposited"), Some(0));
        assert_eq!(store.type_id("bank.Withdrawn"), Some(1));
    }

    #[test]
    fn records_index_holds_one_id_per_event_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        writer.append(&Deposited::default()).unwrap();
        writer.append(&Withdrawn::default()).unwrap();
        writer.append(&Deposited::default()).unwrap();
        writer.flush().unwrap();

        let bytes = std::fs::read(tmp.path().join("records.idx")).unwrap();
        assert_eq!(bytes, [0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn drop_flushes_pending_appends() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Deposited::default()).unwrap();
        }
        let bytes = std::fs::read(tmp.path().join("records.idx")).unwrap();
        assert_eq!(bytes.len(), 2);
    }

    #[test]
    fn corrupt_type_registry_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Deposited::default()).unwrap();
        }
        // Tear the trailing registry entry: id present, name cut short.
        let path = tmp.path().join("types.idx");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, bytes).unwrap();

        let err = EventStore::open(tmp.path()).unwrap_err();
        match err {
            Error::CorruptIndex { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected CorruptIndex, got {other:?}"),
        }
    }

    #[test]
    fn odd_length_record_index_is_rejected_at_open() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Deposited::default()).unwrap();
        }
        let path = tmp.path().join("records.idx");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.push(0);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            EventStore::open(tmp.path()).unwrap_err(),
            Error::CorruptIndex { .. }
        ));
    }

    #[test]
    fn failed_append_poisons_the_writer() {
        #[derive(Debug, Default)]
        struct Transfer {
            account: u32,
            memo: Option<String>,
        }
        impl Persist for Transfer {
            fn schema() -> TypeSchema {
                TypeSchema::builder("bank.Transfer")
                    .column("Account", ColumnType::U32)
                    .column("Memo", ColumnType::Str)
                    .build()
            }
            fn get(&self, column: usize) -> Value {
                match column {
                    0 => Value::U32(self.account),
                    _ => self.memo.clone().map_or(Value::Null, Value::Str),
                }
            }
            fn set(&mut self, column: usize, value: Value) {
                match (column, value) {
                    (0, Value::U32(v)) => self.account = v,
                    (1, Value::Str(v)) => self.memo = Some(v),
                    _ => {}
                }
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::open(tmp.path()).unwrap();
        let ok = Transfer { account: 1, memo: Some("rent".to_string()) };
        writer.append(&ok).unwrap();

        // Null in a non-nullable column fails mid-record, leaving the
        // account column one value ahead of the memo column.
        let bad = Transfer { account: 2, memo: None };
        assert!(matches!(
            writer.append(&bad).unwrap_err(),
            Error::ColumnTypeMismatch { .. }
        ));

        // From here on the handle refuses everything, even valid events.
        assert!(matches!(
            writer.append(&ok).unwrap_err(),
            Error::WriterPoisoned
        ));
    }

    #[test]
    fn registry_roundtrips_multibyte_names() {
        let tmp = tempfile::tempdir().unwrap();

        #[derive(Debug, Default)]
        struct Unicode;
        impl Persist for Unicode {
            fn schema() -> TypeSchema {
                TypeSchema::builder("bank.Überweisung")
                    .column("Account", ColumnType::U32)
                    .build()
            }
            fn get(&self, _column: usize) -> Value {
                Value::U32(0)
            }
            fn set(&mut self, _column: usize, _value: Value) {}
        }

        {
            let mut writer = StoreWriter::open(tmp.path()).unwrap();
            writer.append(&Unicode).unwrap();
        }
        let store = EventStore::open(tmp.path()).unwrap();
        assert_eq!(store.type_id("bank.Überweisung"), Some(0));
    }
}
