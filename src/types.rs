//! Shared enums: structure kinds, data types, compression/header/event types.

use crate::error::{EvioError, Result};

/// The three structure kinds, distinguished by header width and field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    Bank,
    Segment,
    TagSegment,
}

/// Data type tag carried in every structure header.
///
/// `AlsoBank`/`AlsoSegment` are legacy duplicates of `Bank`/`Segment` and are
/// accepted as equivalent on read (never emitted on write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Unknown32 = 0x0,
    Uint32 = 0x1,
    Float32 = 0x2,
    Char8 = 0x3,
    Short16 = 0x4,
    Ushort16 = 0x5,
    Char8Star = 0x6,
    Int32 = 0x7,
    TagSegment = 0x8,
    Uchar8 = 0x9,
    Double64 = 0xA,
    Long64 = 0xB,
    Ulong64 = 0xC,
    Int64 = 0xD,
    Composite = 0xE,
    Bank = 0xF,
    Segment = 0x10,
    AlsoBank = 0x20,
    AlsoSegment = 0x21,
    Hollerit = 0x22,
    Nvalue = 0x23,
    NvalueLower = 0x24,
    Mvalue = 0x25,
}

impl DataType {
    pub fn from_byte(b: u8) -> Result<Self> {
        use DataType::*;
        Ok(match b {
            0x0 => Unknown32,
            0x1 => Uint32,
            0x2 => Float32,
            0x3 => Char8,
            0x4 => Short16,
            0x5 => Ushort16,
            0x6 => Char8Star,
            0x7 => Int32,
            0x8 => TagSegment,
            0x9 => Uchar8,
            0xA => Double64,
            0xB => Long64,
            0xC => Ulong64,
            0xD => Int64,
            0xE => Composite,
            0xF => Bank,
            0x10 => Segment,
            0x20 => AlsoBank,
            0x21 => AlsoSegment,
            0x22 => Hollerit,
            0x23 => Nvalue,
            0x24 => NvalueLower,
            0x25 => Mvalue,
            other => return Err(EvioError::BadFormat(format!("unknown data type byte {other:#04x}"))),
        })
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Normalize legacy `ALSOBANK`/`ALSOSEGMENT` aliases to their modern equivalents.
    pub fn canonical(self) -> DataType {
        match self {
            DataType::AlsoBank => DataType::Bank,
            DataType::AlsoSegment => DataType::Segment,
            other => other,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self.canonical(), DataType::Bank | DataType::Segment | DataType::TagSegment)
    }

    /// Reserved composite subtypes: ambiguous in the wire format, treated as reserved.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            DataType::Hollerit | DataType::Nvalue | DataType::NvalueLower | DataType::Mvalue
        )
    }

    /// Bit width of one primitive element, for container types this is meaningless.
    pub fn element_width(self) -> Option<usize> {
        use DataType::*;
        match self.canonical() {
            Char8 | Uchar8 | Char8Star => Some(1),
            Short16 | Ushort16 => Some(2),
            Int32 | Uint32 | Unknown32 | Float32 => Some(4),
            Long64 | Ulong64 | Int64 | Double64 => Some(8),
            _ => None,
        }
    }
}

/// Compression applied to a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    #[default]
    None,
    Lz4Fast,
    Lz4Best,
    Gzip,
}

impl CompressionType {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4Fast),
            2 => Ok(CompressionType::Lz4Best),
            3 => Ok(CompressionType::Gzip),
            other => Err(EvioError::BadFormat(format!("unknown compression type {other}"))),
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4Fast => 1,
            CompressionType::Lz4Best => 2,
            CompressionType::Gzip => 3,
        }
    }
}

/// General header type, packed into bits 28-31 of the bit-info word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderType {
    EvioRecord,
    EvioTrailer,
    HipoRecord,
    HipoTrailer,
}

impl HeaderType {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(HeaderType::EvioRecord),
            3 => Ok(HeaderType::EvioTrailer),
            4 => Ok(HeaderType::HipoRecord),
            7 => Ok(HeaderType::HipoTrailer),
            other => Err(EvioError::BadFormat(format!("unknown header type {other}"))),
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            HeaderType::EvioRecord => 0,
            HeaderType::EvioTrailer => 3,
            HeaderType::HipoRecord => 4,
            HeaderType::HipoTrailer => 7,
        }
    }

    pub fn is_trailer(self) -> bool {
        matches!(self, HeaderType::EvioTrailer | HeaderType::HipoTrailer)
    }
}

/// CODA event type, packed into bits 11-14 of the bit-info word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RocRaw,
    Physics,
    PartialPhysics,
    Disentangled,
    User,
    Control,
    Other,
}

impl EventType {
    pub fn from_code(code: u32) -> EventType {
        match code {
            0 => EventType::RocRaw,
            1 => EventType::Physics,
            2 => EventType::PartialPhysics,
            3 => EventType::Disentangled,
            4 => EventType::User,
            5 => EventType::Control,
            _ => EventType::Other,
        }
    }

    pub fn to_code(self) -> u32 {
        match self {
            EventType::RocRaw => 0,
            EventType::Physics => 1,
            EventType::PartialPhysics => 2,
            EventType::Disentangled => 3,
            EventType::User => 4,
            EventType::Control => 5,
            EventType::Other => 15,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::RocRaw => "ROC raw",
            EventType::Physics => "physics",
            EventType::PartialPhysics => "partial physics",
            EventType::Disentangled => "disentangled physics",
            EventType::User => "user",
            EventType::Control => "control",
            EventType::Other => "other",
        };
        f.write_str(s)
    }
}
