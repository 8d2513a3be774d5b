//! Error types for evio operations

use thiserror::Error;

/// Result type alias for evio operations
pub type Result<T> = std::result::Result<T, EvioError>;

/// Errors that can occur while reading, writing, or editing evio data
#[derive(Error, Debug)]
pub enum EvioError {
    /// Magic word mismatch even after endian swap
    #[error("bad magic word: expected 0xc0da0100, found {found:#010x} (and swapped {swapped:#010x})")]
    BadMagic { found: u32, swapped: u32 },

    /// Version field outside the accepted set for the chosen reader path
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// Internally inconsistent header or structure
    #[error("bad format: {0}")]
    BadFormat(String),

    /// Cursor read past its limit
    #[error("underflow: tried to read {requested} bytes at position {position}, limit {limit}")]
    Underflow {
        position: usize,
        requested: usize,
        limit: usize,
    },

    /// Cursor write past its limit
    #[error("overflow: tried to write {requested} bytes at position {position}, limit {limit}")]
    Overflow {
        position: usize,
        requested: usize,
        limit: usize,
    },

    /// Absolute position outside the legal range
    #[error("index out of range: {index} (limit {limit})")]
    IndexOutOfRange { index: usize, limit: usize },

    /// A data append or child-open disagreed with the parent/structure's declared type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Writer cannot fit more events into the current record
    #[error("record full")]
    RecordFull,

    /// `add_string_data`/`add_composite_data` called more than once per frame
    #[error("already written: {0}")]
    AlreadyWritten(&'static str),

    /// A byte-level payload whose length is not a multiple of 4 where alignment is required
    #[error("bad alignment: length {0} is not a multiple of 4")]
    BadAlignment(usize),

    /// Attempted edit on a compressed record
    #[error("cannot edit a compressed record in place")]
    CompressedEditForbidden,

    /// `add_structure` input buffer's byte order disagrees with target's
    #[error("wrong endianness: source is {0:?}, target is {1:?}")]
    WrongEndianness(crate::endian::Endian, crate::endian::Endian),

    /// Per-instance block/record sequence check failed
    #[error("block number out of sequence: expected {expected}, found {found}")]
    BlockNumberOutOfSequence { expected: u32, found: u32 },

    /// Underlying compression codec error
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Underlying decompression codec error
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Filesystem error (preserves the underlying OS error)
    #[error("I/O error: {0}")]
    IoFailed(#[from] std::io::Error),

    /// A node descriptor was used after the arena that produced it moved to a new generation
    #[error("stale reference: node was produced by a buffer scan that has since been edited")]
    StaleReference,

    /// The writer has transitioned to a terminal failure state
    #[error("writer is in a failed state: {0}")]
    WriterFailed(String),

    /// `open()` target exists and overwrite was not requested
    #[error("file exists: {0}")]
    FileExists(String),
}
