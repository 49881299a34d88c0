//! Bulk decoder for dense streams of 16-byte decimal records.
//!
//! Non-nullable decimal columns are a solid run of 16-byte values, which
//! makes one-at-a-time parsing needlessly expensive. [`DecimalReader`]
//! instead refills a fixed staging buffer with one block read, reinterprets
//! it as 32-bit words, and materializes a batch of decoded decimals that
//! subsequent reads consume for free.

use std::io::{self, Read};

use rust_decimal::Decimal;

use crate::codec::decimal_from_words;
use crate::error::Result;

/// Default staging buffer size: 64 KiB, or 4096 decimals per refill.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Batch decoder over a stream of consecutive 16-byte decimal values.
///
/// Each value is four little-endian 32-bit words: low, mid, and high
/// mantissa words followed by a flags word (scale in bits 16-23, sign in
/// bit 31). A refill reads as many whole bytes as the stream yields and
/// stages only fully-formed 16-byte groups; a trailing partial group at end
/// of stream is never surfaced as a value.
///
/// The caller's record count bounds how many reads are valid. Reading past
/// the last staged decimal fails with an `UnexpectedEof` I/O error rather
/// than returning garbage.
#[derive(Debug)]
pub struct DecimalReader<R> {
    stream: R,
    buf: Vec<u8>,
    staged: Vec<Decimal>,
    cursor: usize,
}

impl<R: Read> DecimalReader<R> {
    /// Creates a batch decoder with the default 64 KiB staging buffer.
    ///
    /// Performs the first refill eagerly, so construction does one block
    /// read.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the initial refill.
    pub fn new(stream: R) -> Result<Self> {
        Self::with_capacity(stream, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a batch decoder with a caller-tuned staging buffer.
    ///
    /// The capacity is rounded down to a whole number of 16-byte groups,
    /// with a floor of one group.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the initial refill.
    pub fn with_capacity(stream: R, capacity: usize) -> Result<Self> {
        let capacity = (capacity - capacity % 16).max(16);
        let mut reader = Self {
            stream,
            buf: vec![0u8; capacity],
            staged: Vec::with_capacity(capacity / 16),
            cursor: 0,
        };
        reader.refill()?;
        Ok(reader)
    }

    /// Refills the staging buffer from the stream and decodes whole groups.
    fn refill(&mut self) -> Result<()> {
        let mut filled = 0;
        while filled < self.buf.len() {
            let n = self.stream.read(&mut self.buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        self.staged.clear();
        for group in self.buf[..filled - filled % 16].chunks_exact(16) {
            let mut words = [0u32; 4];
            for (word, bytes) in words.iter_mut().zip(group.chunks_exact(4)) {
                *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            self.staged.push(decimal_from_words(words));
        }
        Ok(())
    }

    /// Returns the next decimal, refilling synchronously when the staged
    /// batch is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an `UnexpectedEof` I/O error when the stream holds no
    /// further fully-formed value, and propagates refill failures.
    pub fn read_decimal(&mut self) -> Result<Decimal> {
        if self.cursor == self.staged.len() {
            self.refill()?;
            self.cursor = 0;
        }
        match self.staged.get(self.cursor) {
            Some(value) => {
                self.cursor += 1;
                Ok(*value)
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no further decimal values in column stream",
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::codec::decimal_to_words;

    /// Encode `count` distinguishable decimals as a raw byte stream.
    fn encode_stream(count: usize) -> (Vec<Decimal>, Vec<u8>) {
        let values: Vec<Decimal> = (0..count)
            .map(|i| Decimal::new(i as i64 * 17 - 50, (i % 5) as u32))
            .collect();
        let mut bytes = Vec::with_capacity(count * 16);
        for value in &values {
            for word in decimal_to_words(value) {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
        }
        (values, bytes)
    }

    /// Decode the whole stream one 16-byte group at a time, no batching.
    fn decode_one_at_a_time(bytes: &[u8]) -> Vec<Decimal> {
        bytes
            .chunks_exact(16)
            .map(|group| {
                let mut words = [0u32; 4];
                for (word, b) in words.iter_mut().zip(group.chunks_exact(4)) {
                    *word = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                crate::codec::decimal_from_words(words)
            })
            .collect()
    }

    #[test]
    fn batch_decoder_matches_single_value_decoding() {
        // Buffer capacity of 64 values; counts straddle the refill boundary.
        for count in [1usize, 63, 64, 65, 200] {
            let (expected, bytes) = encode_stream(count);
            assert_eq!(decode_one_at_a_time(&bytes), expected);

            let mut reader = DecimalReader::with_capacity(Cursor::new(bytes), 64 * 16).unwrap();
            let decoded: Vec<Decimal> = (0..count)
                .map(|_| reader.read_decimal().expect("within record count"))
                .collect();
            assert_eq!(decoded, expected, "count = {count}");
        }
    }

    #[test]
    fn empty_stream_fails_on_first_read() {
        let mut reader = DecimalReader::new(Cursor::new(Vec::new())).unwrap();
        let err = reader.read_decimal().unwrap_err();
        match err {
            crate::Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn read_past_last_value_fails() {
        let (_, bytes) = encode_stream(3);
        let mut reader = DecimalReader::new(Cursor::new(bytes)).unwrap();
        for _ in 0..3 {
            reader.read_decimal().unwrap();
        }
        assert!(reader.read_decimal().is_err());
    }

    #[test]
    fn trailing_partial_group_is_not_surfaced() {
        let (expected, mut bytes) = encode_stream(2);
        bytes.extend_from_slice(&[0xAA; 7]); // 7 stray bytes, not a whole group
        let mut reader = DecimalReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_decimal().unwrap(), expected[0]);
        assert_eq!(reader.read_decimal().unwrap(), expected[1]);
        assert!(reader.read_decimal().is_err());
    }

    #[test]
    fn capacity_rounds_down_to_whole_groups() {
        let (expected, bytes) = encode_stream(5);
        // 40 bytes rounds down to 32, i.e. 2 staged values per refill.
        let mut reader = DecimalReader::with_capacity(Cursor::new(bytes), 40).unwrap();
        for value in &expected {
            assert_eq!(reader.read_decimal().unwrap(), *value);
        }
    }

    #[test]
    fn minimum_capacity_is_one_group() {
        let (expected, bytes) = encode_stream(3);
        let mut reader = DecimalReader::with_capacity(Cursor::new(bytes), 1).unwrap();
        for value in &expected {
            assert_eq!(reader.read_decimal().unwrap(), *value);
        }
    }
}
