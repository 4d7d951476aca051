use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TableError>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("the field '{0}' already exists within the attribute table")]
    DuplicateField(String),
    #[error("the field '{0}' is not defined within the attribute table")]
    UnknownField(String),
    #[error("unsupported field type: {0}")]
    UnsupportedType(&'static str),
    #[error("feature id {fid} is outside the table range 0..{size}")]
    FidOutOfRange { fid: u64, size: u64 },
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("neighbour list of length {requested} exceeds the width limit of {limit}")]
    CapacityExceeded { requested: usize, limit: u32 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
