//! Projection replay: fold the whole store, in write order, into a model.
//!
//! A [`Projection`] is a one-shot builder obtained from
//! [`EventStore::project`]. Handlers are registered per event type; a
//! proxy view type may stand in for the stored type, reading a subset of
//! its columns. [`Projection::run`] then walks the global chronological
//! index once and applies each handled event to the model in exact write
//! order, across types. Types without a handler are skipped for free.
//!
//! All registration problems (a type name the store has never seen, an
//! incompatible proxy, a missing codec) surface at registration, before
//! a single record is read.

use crate::column::RecordReader;
use crate::dispatch::{Dispatcher, IndexReader, Slot};
use crate::error::{Error, Result};
use crate::schema::{Persist, TypeSchema, check_proxy};
use crate::store::EventStore;

/// One-shot builder for replaying a store into a model of type `M`.
///
/// # Examples
///
/// ```no_run
/// use eventcol::{ColumnType, EventStore, Persist, TypeSchema, Value};
///
/// #[derive(Debug, Default)]
/// struct Deposited {
///     amount_cents: i64,
/// }
///
/// impl Persist for Deposited {
///     fn schema() -> TypeSchema {
///         TypeSchema::builder("bank.Deposited")
///             .column("AmountCents", ColumnType::I64)
///             .build()
///     }
///     fn get(&self, _column: usize) -> Value {
///         Value::I64(self.amount_cents)
///     }
///     fn set(&mut self, _column: usize, value: Value) {
///         if let Value::I64(v) = value {
///             self.amount_cents = v;
///         }
///     }
/// }
///
/// #[derive(Debug, Default)]
/// struct Balance {
///     cents: i64,
/// }
///
/// # fn main() -> eventcol::Result<()> {
/// let store = EventStore::open("/var/lib/myapp/events")?;
/// let balance = store
///     .project::<Balance>()
///     .on::<Deposited>(|model, event| model.cents += event.amount_cents)?
///     .run()?;
/// # Ok(())
/// # }
/// ```
pub struct Projection<'s, M: Default> {
    store: &'s EventStore,
    handlers: Vec<(u16, Slot<M>)>,
}

// Manual `Debug`: handler slots hold closures and open column files.
impl<M: Default> std::fmt::Debug for Projection<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("base_dir", &self.store.base_dir())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<'s, M: Default> Projection<'s, M> {
    pub(crate) fn new(store: &'s EventStore) -> Self {
        Self {
            store,
            handlers: Vec::new(),
        }
    }

    /// Registers a handler for events of type `E`.
    ///
    /// The handler runs once per stored `E`, in global write order
    /// relative to every other handled event. One scratch instance of `E`
    /// is reused for the whole run; the handler must copy out anything it
    /// wants to keep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHandledType`] if the store has never
    /// recorded an event under `E`'s type name, and propagates reader
    /// construction failures (invalid schema, missing codec, missing
    /// column file).
    pub fn on<E: Persist>(self, mut apply: impl FnMut(&mut M, &E) + 'static) -> Result<Self> {
        let schema = E::schema();
        let mut scratch = E::default();
        self.register(
            schema.name(),
            &schema,
            Box::new(move |model, reader| {
                reader.read_into(&mut scratch)?;
                apply(model, &scratch);
                Ok(())
            }),
        )
    }

    /// Registers a handler that reads stored events of type `O` through
    /// the proxy view type `V`.
    ///
    /// `V` declares a subset of `O`'s columns, in any order; only those
    /// column files are opened and decoded. Each view column must match
    /// the stored column exactly in name, type, and nullability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHandledType`] if `O`'s type name is not in
    /// the store, [`Error::ProxyMismatch`] if `V` declares a column `O`
    /// does not store compatibly, and propagates reader construction
    /// failures.
    pub fn on_proxy<V: Persist, O: Persist>(
        self,
        mut apply: impl FnMut(&mut M, &V) + 'static,
    ) -> Result<Self> {
        let storage = O::schema();
        let view = V::schema();
        check_proxy(&view, &storage)?;

        let mut scratch = V::default();
        self.register(
            storage.name(),
            &view,
            Box::new(move |model, reader| {
                reader.read_into(&mut scratch)?;
                apply(model, &scratch);
                Ok(())
            }),
        )
    }

    fn register(
        mut self,
        storage_name: &str,
        read_schema: &TypeSchema,
        apply: Box<dyn FnMut(&mut M, &mut RecordReader) -> Result<()>>,
    ) -> Result<Self> {
        let id = self
            .store
            .types
            .id_of(storage_name)
            .ok_or_else(|| Error::UnknownHandledType(storage_name.to_string()))?;

        let dir = self.store.layout.type_dir(storage_name);
        let reader = RecordReader::open(&dir, read_schema, &self.store.codecs)?;
        self.handlers.push((id, Slot { reader, apply }));
        Ok(self)
    }

    /// Replays the store and returns the folded model.
    ///
    /// Starts from `M::default()`, walks the global index once, and
    /// applies every handled event in write order. Handlers see events of
    /// different types interleaved exactly as they were appended.
    ///
    /// # Errors
    ///
    /// Propagates index corruption, decode failures, and I/O errors; the
    /// run stops at the first one.
    pub fn run(self) -> Result<M> {
        tracing::debug!(
            base_dir = %self.store.base_dir().display(),
            handled_types = self.handlers.len(),
            "starting projection replay"
        );

        let mut dispatcher = Dispatcher::new();
        for (id, slot) in self.handlers {
            dispatcher.register(id, slot);
        }

        let mut index = IndexReader::open(self.store.layout.records_path())?;
        let mut model = M::default();
        dispatcher.run(&mut model, &mut index)?;
        Ok(model)
    }
}
