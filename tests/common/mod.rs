//! Builder for synthetic GEMPAK archives used by the integration tests.
//!
//! Word indices are 1-based, matching the pointer convention of the format.
#![allow(dead_code)]

pub const MAGIC: &str = "GEMPAK DATA MANAGEMENT FILE ";

pub struct ArchiveBuilder {
    bytes: Vec<u8>,
    big_endian: bool,
}

impl ArchiveBuilder {
    /// Little-endian archive of `words` zeroed words.
    pub fn new(words: usize) -> ArchiveBuilder {
        ArchiveBuilder {
            bytes: vec![0; words * 4],
            big_endian: false,
        }
    }

    /// Big-endian archive, to exercise the byte-order probe.
    pub fn big_endian(words: usize) -> ArchiveBuilder {
        ArchiveBuilder {
            bytes: vec![0; words * 4],
            big_endian: true,
        }
    }

    pub fn set_i32(&mut self, word: usize, value: i32) {
        let offset = (word - 1) * 4;
        let encoded = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.bytes[offset..offset + 4].copy_from_slice(&encoded);
    }

    pub fn set_f32(&mut self, word: usize, value: f32) {
        self.set_i32(word, value.to_bits() as i32);
    }

    /// Write text starting at `word`, space-padded to a word boundary. Text
    /// is a raw byte stream and ignores the byte order.
    pub fn set_str(&mut self, word: usize, text: &str) {
        let offset = (word - 1) * 4;
        let mut padded = text.as_bytes().to_vec();
        while padded.len() % 4 != 0 {
            padded.push(b' ');
        }
        self.bytes[offset..offset + padded.len()].copy_from_slice(&padded);
    }

    pub fn set_magic(&mut self) {
        let magic = MAGIC.as_bytes();
        self.bytes[..magic.len()].copy_from_slice(magic);
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
