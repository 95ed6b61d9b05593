//! Word-oriented cursor over an in-memory byte buffer.
//!
//! All GEMPAK pointers are 1-based 4-byte word indices relative to the start
//! of the file, so every read here is bounds-checked in word units and the
//! byte order is chosen per read rather than baked into the buffer.

use crate::error::GempakError;

/// Unit of all GEMPAK pointer arithmetic.
pub const BYTES_PER_WORD: usize = 4;

/// Byte order used for every structured read after probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the machine running the decode.
    pub fn native() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn swapped(self) -> ByteOrder {
        match self {
            ByteOrder::Big => ByteOrder::Little,
            ByteOrder::Little => ByteOrder::Big,
        }
    }
}

/// Convert a 1-based word index into a byte offset.
pub fn word_to_offset(word: usize) -> usize {
    word.saturating_sub(1) * BYTES_PER_WORD
}

/// A saved cursor position that later jumps are measured from.
#[derive(Debug, Clone, Copy)]
pub struct Mark(usize);

/// Cursor over the raw bytes of one GEMPAK file.
///
/// The buffer is loaded once and never mutated; only the cursor moves. A
/// truncated file surfaces as an [`GempakError::OutOfBounds`] read, never a
/// panic.
#[derive(Debug)]
pub struct WordBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl WordBuffer {
    pub fn new(data: Vec<u8>) -> WordBuffer {
        WordBuffer { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position as a 1-based word index, for error reporting.
    pub fn word_position(&self) -> usize {
        self.pos / BYTES_PER_WORD + 1
    }

    pub fn set_mark(&self) -> Mark {
        Mark(self.pos)
    }

    pub fn jump_to(&mut self, mark: Mark, byte_offset: usize) {
        self.pos = mark.0 + byte_offset;
    }

    pub fn skip(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn take(&mut self, count: usize, table: &'static str) -> Result<&[u8], GempakError> {
        let end = self.pos.checked_add(count).ok_or(GempakError::OutOfBounds {
            word: self.word_position(),
            table,
        })?;
        if end > self.data.len() {
            return Err(GempakError::OutOfBounds {
                word: self.word_position(),
                table,
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, count: usize, table: &'static str) -> Result<&[u8], GempakError> {
        self.take(count, table)
    }

    /// Read one raw word without interpreting its byte order.
    pub fn read_word(&mut self, table: &'static str) -> Result<[u8; 4], GempakError> {
        let bytes = self.take(BYTES_PER_WORD, table)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn read_u32(&mut self, order: ByteOrder, table: &'static str) -> Result<u32, GempakError> {
        let word = self.read_word(table)?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(word),
            ByteOrder::Little => u32::from_le_bytes(word),
        })
    }

    pub fn read_i32(&mut self, order: ByteOrder, table: &'static str) -> Result<i32, GempakError> {
        Ok(self.read_u32(order, table)? as i32)
    }

    pub fn read_f32(&mut self, order: ByteOrder, table: &'static str) -> Result<f32, GempakError> {
        Ok(f32::from_bits(self.read_u32(order, table)?))
    }

    /// Read fixed-width text. GEMPAK text is space-padded ASCII; the caller
    /// decides how much to trim.
    pub fn read_str(&mut self, count: usize, table: &'static str) -> Result<String, GempakError> {
        let bytes = self.take(count, table)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ints_in_both_orders() -> Result<(), GempakError> {
        let mut buffer = WordBuffer::new(vec![0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(buffer.read_i32(ByteOrder::Big, "test")?, 1);
        assert_eq!(buffer.read_i32(ByteOrder::Little, "test")?, 1);
        Ok(())
    }

    #[test]
    fn mark_and_jump_by_word_offset() -> Result<(), GempakError> {
        let mut buffer = WordBuffer::new((0u8..16).collect());
        let start = buffer.set_mark();
        buffer.jump_to(start, word_to_offset(3));
        assert_eq!(buffer.read_word("test")?, [8, 9, 10, 11]);
        buffer.jump_to(start, 0);
        assert_eq!(buffer.read_word("test")?, [0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn truncated_read_reports_word_offset() {
        let mut buffer = WordBuffer::new(vec![0; 6]);
        buffer.skip(4);
        let err = buffer.read_word("row headers").unwrap_err();
        match err {
            GempakError::OutOfBounds { word, table } => {
                assert_eq!(word, 2);
                assert_eq!(table, "row headers");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_int_round_trip() -> Result<(), GempakError> {
        let mut buffer = WordBuffer::new((-9999i32).to_le_bytes().to_vec());
        assert_eq!(buffer.read_i32(ByteOrder::Little, "test")?, -9999);
        Ok(())
    }
}
