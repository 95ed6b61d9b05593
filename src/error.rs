use thiserror::Error;
use tokio::io;

use crate::file::{DataType, FileType};

#[derive(Error, Debug)]
pub enum GempakError {
    #[error("IO Error")]
    IoError(#[from] io::Error),

    #[error("Unknown file format or invalid GEMPAK file")]
    WrongHeader,

    #[error("Expected a {expected:?} file but found {found:?}")]
    WrongFileType { expected: FileType, found: FileType },

    #[error("{block} block declares {found} words, expected {expected}")]
    BlockSize {
        block: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Unknown data type {code} in {table}")]
    UnknownDataType { code: i32, table: &'static str },

    #[error("No method to decode {data_type:?} data in part {part}")]
    UnhandledDataType { data_type: DataType, part: String },

    #[error("No method for unknown grid packing {code}")]
    UnknownPacking { code: i32 },

    #[error("{packing} unpacking is not supported")]
    UnsupportedPacking { packing: &'static str },

    #[error("Unpacking length mismatch: {declared} words is not a multiple of the {stride}-word group stride")]
    LengthMismatch { declared: usize, stride: usize },

    #[error("Tried to read past the end of the buffer at word {word} while reading {table}")]
    OutOfBounds { word: usize, table: &'static str },

    #[error("Could not decode {field} from value {value}")]
    InvalidField { field: &'static str, value: i32 },
}
