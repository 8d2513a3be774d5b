//! evio - self-describing binary container format for physics event data.
//!
//! A tagged tree of banks, segments and tagsegments (see [`tree::Structure`])
//! is grouped into records ([`record_output::RecordOutput`] /
//! [`record_input::RecordInput`]), optionally compressed, and framed by a
//! file header, the records themselves, and a trailer (see [`header`]).
//! [`writer::Writer`] assembles a file from scratch; [`reader::Reader`]
//! builds a record table over one and supports both sequential and random
//! event access plus in-place structural edits.
//!
//! # Example
//!
//! ```no_run
//! use evio::endian::Endian;
//! use evio::reader::{Reader, ReaderOptions};
//! use evio::writer::{Writer, WriterOptions};
//! use std::io::Cursor;
//!
//! fn main() -> evio::error::Result<()> {
//!     let mut writer = Writer::new(Cursor::new(Vec::new()), Endian::Big, WriterOptions::default());
//!     writer.write_event(&[0, 0, 0, 1, 0, 0, 0, 0])?;
//!     writer.close()?;
//!     let bytes = writer.into_sink().into_inner();
//!
//!     let mut reader = Reader::from_buffer(bytes, ReaderOptions::default())?;
//!     let _first = reader.event(0)?;
//!     Ok(())
//! }
//! ```

pub mod compact_builder;
pub mod composite;
pub mod compression;
pub mod cursor;
pub mod dictionary;
pub mod endian;
pub mod error;
pub mod header;
pub mod node_index;
pub mod reader;
pub mod record_input;
pub mod record_output;
pub mod swap;
pub mod sync;
pub mod tree;
pub mod types;
pub mod writer;

pub use compact_builder::CompactBuilder;
pub use dictionary::{DictionaryLookup, NullDictionary};
pub use endian::Endian;
pub use error::{EvioError, Result};
pub use node_index::{NodeDescriptor, NodeIndex, NodeRef};
pub use reader::{Reader, ReaderOptions};
pub use sync::Synchronized;
pub use tree::{Payload, PrimitiveArray, Structure};
pub use types::{CompressionType, DataType, EventType, HeaderType, StructureKind};
pub use writer::{FileWriter, Writer, WriterOptions};
