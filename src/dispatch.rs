//! Replay dispatch: the global index scanner and the per-type slot table.
//!
//! `records.idx` fixes the one true ordering of the store: one 2-byte
//! little-endian type id per event, in cross-type append order. Replay
//! walks that file once and routes each id through a dense table indexed
//! by the id itself, so per-event dispatch is an array load. Types with no
//! handler have no readers at all, so skipping them advances nothing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use crate::column::RecordReader;
use crate::error::{Error, Result};

const INDEX_BUFFER_SIZE: usize = 64 * 1024;

/// Total number of addressable type ids; also the slot table's size.
const TYPE_ID_SPACE: usize = 1 << 16;

/// Sequential scanner over the global chronological index.
pub(crate) struct IndexReader {
    path: PathBuf,
    file: BufReader<File>,
}

impl IndexReader {
    pub(crate) fn open(path: PathBuf) -> Result<Self> {
        let file = BufReader::with_capacity(INDEX_BUFFER_SIZE, File::open(&path)?);
        Ok(Self { path, file })
    }

    /// Returns the next type id, or `None` at a clean end of file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if the file ends halfway through an
    /// entry, and propagates I/O failures.
    pub(crate) fn next_id(&mut self) -> Result<Option<u16>> {
        let mut buf = [0u8; 2];
        let mut filled = 0;
        while filled < 2 {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            2 => Ok(Some(u16::from_le_bytes(buf))),
            _ => Err(Error::CorruptIndex {
                path: self.path.clone(),
                reason: "dangling byte at end of record index".to_string(),
            }),
        }
    }
}

/// One registered handler: the type's column readers plus the closure that
/// consumes the next record and applies it to the model.
pub(crate) struct Slot<M> {
    pub(crate) reader: RecordReader,
    pub(crate) apply: Box<dyn FnMut(&mut M, &mut RecordReader) -> Result<()>>,
}

/// Dense dispatch table for one replay run, indexed directly by type id.
pub(crate) struct Dispatcher<M> {
    slots: Vec<Option<Slot<M>>>,
}

impl<M> Dispatcher<M> {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(TYPE_ID_SPACE).collect(),
        }
    }

    /// Installs a slot for a type id, replacing any earlier registration.
    pub(crate) fn register(&mut self, id: u16, slot: Slot<M>) {
        let entry = &mut self.slots[usize::from(id)];
        if entry.is_some() {
            tracing::warn!(id, "replacing existing handler for type id");
        }
        *entry = Some(slot);
    }

    /// Replays the whole index against `model`.
    ///
    /// Every id with a slot consumes exactly one record from that slot's
    /// readers; ids without a slot are passed over. The first handler or
    /// decode error aborts the run.
    pub(crate) fn run(&mut self, model: &mut M, index: &mut IndexReader) -> Result<()> {
        while let Some(id) = index.next_id()? {
            if let Some(slot) = self.slots[usize::from(id)].as_mut() {
                (slot.apply)(model, &mut slot.reader)?;
            }
        }
        Ok(())
    }
}
