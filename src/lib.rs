//! An embedded, append-only columnar event store with projection replay.
//!
//! Events are plain structs persisted column-by-column: every property of
//! every event type gets its own append-only file, and a record exists
//! only as the i-th value of each of its type's column files. Two small
//! index files tie the store together: a registry mapping type names to
//! 2-byte ids, and a global chronological index holding one id per event
//! in cross-type write order. Replaying that index reconstructs the exact
//! interleaving of all events, which is what CQRS-style read models fold
//! over.
//!
//! # Overview
//!
//! - [`StoreWriter`] is the single append handle: it registers event
//!   types on first use and keeps every column file in positional
//!   lockstep.
//! - [`EventStore`] is the read handle: it opens an existing store and
//!   spawns [`Projection`] replays.
//! - [`Persist`] is the contract an event type implements: an explicit
//!   column schema plus positional accessors, no runtime reflection.
//! - Proxy view types let a projection decode only the columns it needs
//!   from a stored type, validated up front.
//!
//! # Quick start
//!
//! ```no_run
//! use eventcol::{ColumnType, EventStore, Persist, StoreWriter, TypeSchema, Value};
//!
//! #[derive(Debug, Default)]
//! struct Deposited {
//!     amount_cents: i64,
//! }
//!
//! impl Persist for Deposited {
//!     fn schema() -> TypeSchema {
//!         TypeSchema::builder("bank.Deposited")
//!             .column("AmountCents", ColumnType::I64)
//!             .build()
//!     }
//!     fn get(&self, _column: usize) -> Value {
//!         Value::I64(self.amount_cents)
//!     }
//!     fn set(&mut self, _column: usize, value: Value) {
//!         if let Value::I64(v) = value {
//!             self.amount_cents = v;
//!         }
//!     }
//! }
//!
//! # fn main() -> eventcol::Result<()> {
//! let mut writer = StoreWriter::open("/var/lib/myapp/events")?;
//! writer.append(&Deposited { amount_cents: 1250 })?;
//! writer.flush()?;
//!
//! let store = EventStore::open("/var/lib/myapp/events")?;
//! let total = store
//!     .project::<i64>()
//!     .on::<Deposited>(|sum, e| *sum += e.amount_cents)?
//!     .run()?;
//! assert_eq!(total, 1250);
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! One writer per store; any number of readers may replay concurrently,
//! each over the flushed prefix it observed at open time. Handles are not
//! shared across threads while in use; open one per thread instead.

mod codec;
mod column;
mod decimal;
mod dispatch;
mod error;
mod projection;
mod schema;
mod storage;
mod store;
mod value;

pub use codec::{CustomCodec, DecodeFn, EncodeFn};
pub use column::MAX_SEQUENCE_LEN;
pub use decimal::{DEFAULT_BUFFER_SIZE, DecimalReader};
pub use error::{Error, Result};
pub use projection::Projection;
pub use schema::{ColumnDef, ColumnType, Persist, TypeSchema, TypeSchemaBuilder};
pub use storage::StoreLayout;
pub use store::{EventStore, StoreWriter};
pub use value::{TICKS_PER_SECOND, Timestamp, TimestampTz, UNIX_EPOCH_TICKS, Value};

// The decimal and uuid value types are part of the public API surface.
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
