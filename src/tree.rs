//! Owning structure tree: banks, segments and tagsegments materialized as a
//! normal Rust tree of [`Structure`] nodes, each holding either child
//! structures or a typed primitive array.
//!
//! Unlike [`crate::compact_builder`], which streams a structure directly
//! into a cursor with deferred length backfill, a [`Structure`] tree has all
//! of its children already in memory, so total length in words can be
//! computed bottom-up before a single byte is written.

use crate::cursor::ByteCursor;
use crate::error::{EvioError, Result};
use crate::header::padding_for_len;
use crate::types::{DataType, StructureKind};

#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Strings(Vec<String>),
    /// Raw payload for `UNKNOWN32`, stored verbatim.
    Unknown32(Vec<u8>),
}

impl PrimitiveArray {
    fn matches(&self, ty: DataType) -> bool {
        matches!(
            (self, ty.canonical()),
            (PrimitiveArray::Int8(_), DataType::Char8)
                | (PrimitiveArray::Uint8(_), DataType::Uchar8)
                | (PrimitiveArray::Int16(_), DataType::Short16)
                | (PrimitiveArray::Uint16(_), DataType::Ushort16)
                | (PrimitiveArray::Int32(_), DataType::Int32)
                | (PrimitiveArray::Uint32(_), DataType::Uint32)
                | (PrimitiveArray::Int64(_), DataType::Int64)
                | (PrimitiveArray::Uint64(_), DataType::Ulong64)
                | (PrimitiveArray::Float32(_), DataType::Float32)
                | (PrimitiveArray::Float64(_), DataType::Double64)
                | (PrimitiveArray::Strings(_), DataType::Char8Star)
                | (PrimitiveArray::Unknown32(_), DataType::Unknown32)
        )
    }

    /// Raw, unpadded byte length of this array's encoding.
    fn byte_len(&self) -> usize {
        match self {
            PrimitiveArray::Int8(v) => v.len(),
            PrimitiveArray::Uint8(v) => v.len(),
            PrimitiveArray::Int16(v) => v.len() * 2,
            PrimitiveArray::Uint16(v) => v.len() * 2,
            PrimitiveArray::Int32(v) => v.len() * 4,
            PrimitiveArray::Uint32(v) => v.len() * 4,
            PrimitiveArray::Int64(v) => v.len() * 8,
            PrimitiveArray::Uint64(v) => v.len() * 8,
            PrimitiveArray::Float32(v) => v.len() * 4,
            PrimitiveArray::Float64(v) => v.len() * 8,
            PrimitiveArray::Unknown32(v) => v.len(),
            PrimitiveArray::Strings(list) => crate::composite::strings_to_format(
                &list.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            )
            .len(),
        }
    }

    fn element_width(&self) -> usize {
        match self {
            PrimitiveArray::Int8(_) | PrimitiveArray::Uint8(_) | PrimitiveArray::Strings(_) => 1,
            PrimitiveArray::Int16(_) | PrimitiveArray::Uint16(_) => 2,
            PrimitiveArray::Int64(_) | PrimitiveArray::Uint64(_) | PrimitiveArray::Float64(_) => 8,
            PrimitiveArray::Int32(_) | PrimitiveArray::Uint32(_) | PrimitiveArray::Float32(_) | PrimitiveArray::Unknown32(_) => 4,
        }
    }

    fn write_into(&self, cursor: &mut ByteCursor) -> Result<()> {
        match self {
            PrimitiveArray::Int8(v) => {
                for x in v {
                    cursor.put_u8(*x as u8)?;
                }
            }
            PrimitiveArray::Uint8(v) => {
                for x in v {
                    cursor.put_u8(*x)?;
                }
            }
            PrimitiveArray::Int16(v) => {
                for x in v {
                    cursor.put_u16(*x as u16)?;
                }
            }
            PrimitiveArray::Uint16(v) => {
                for x in v {
                    cursor.put_u16(*x)?;
                }
            }
            PrimitiveArray::Int32(v) => {
                for x in v {
                    cursor.put_u32(*x as u32)?;
                }
            }
            PrimitiveArray::Uint32(v) => {
                for x in v {
                    cursor.put_u32(*x)?;
                }
            }
            PrimitiveArray::Int64(v) => {
                for x in v {
                    cursor.put_u64(*x as u64)?;
                }
            }
            PrimitiveArray::Uint64(v) => {
                for x in v {
                    cursor.put_u64(*x)?;
                }
            }
            PrimitiveArray::Float32(v) => {
                for x in v {
                    cursor.put_f32(*x)?;
                }
            }
            PrimitiveArray::Float64(v) => {
                for x in v {
                    cursor.put_f64(*x)?;
                }
            }
            PrimitiveArray::Unknown32(bytes) => cursor.put_bytes(bytes)?,
            PrimitiveArray::Strings(list) => {
                cursor.put_bytes(&crate::composite::strings_to_format(list))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Children(Vec<Structure>),
    Primitives(PrimitiveArray),
    /// Opaque composite tabular payload: format string plus its raw tabular
    /// bytes, decoded on demand via [`crate::composite`].
    Composite { format: String, raw: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub kind: StructureKind,
    pub tag: u16,
    pub data_type: DataType,
    pub num: Option<u8>,
    pub pad: u8,
    pub payload: Payload,
}

impl Structure {
    pub fn new_bank(tag: u16, num: u8, data_type: DataType) -> Structure {
        Structure { kind: StructureKind::Bank, tag, data_type, num: Some(num), pad: 0, payload: Payload::Empty }
    }

    pub fn new_segment(tag: u16, data_type: DataType) -> Structure {
        Structure { kind: StructureKind::Segment, tag, data_type, num: None, pad: 0, payload: Payload::Empty }
    }

    pub fn new_tagsegment(tag: u16, data_type: DataType) -> Structure {
        Structure { kind: StructureKind::TagSegment, tag, data_type, num: None, pad: 0, payload: Payload::Empty }
    }

    pub fn children(&self) -> Option<&[Structure]> {
        match &self.payload {
            Payload::Children(c) => Some(c),
            _ => None,
        }
    }

    pub fn push_child(&mut self, child: Structure) -> Result<()> {
        if !self.data_type.is_container() {
            return Err(EvioError::TypeMismatch(format!(
                "cannot add children to a structure of type {:?}",
                self.data_type
            )));
        }
        match &mut self.payload {
            Payload::Empty => self.payload = Payload::Children(vec![child]),
            Payload::Children(c) => c.push(child),
            _ => return Err(EvioError::TypeMismatch("structure already holds a leaf payload".into())),
        }
        Ok(())
    }

    pub fn set_primitives(&mut self, array: PrimitiveArray) -> Result<()> {
        if !matches!(self.payload, Payload::Empty) {
            return Err(EvioError::AlreadyWritten("structure payload"));
        }
        if self.data_type.canonical() == DataType::Composite {
            return Err(EvioError::TypeMismatch("use set_composite for COMPOSITE data type".into()));
        }
        if !array.matches(self.data_type) {
            return Err(EvioError::TypeMismatch(format!(
                "primitive array variant does not match declared type {:?}",
                self.data_type
            )));
        }
        self.pad = padding_for_len(array.byte_len(), array.element_width()) as u8;
        self.payload = Payload::Primitives(array);
        Ok(())
    }

    pub fn set_composite(&mut self, format: String, raw: Vec<u8>) -> Result<()> {
        if !matches!(self.payload, Payload::Empty) {
            return Err(EvioError::AlreadyWritten("structure payload"));
        }
        if self.data_type.canonical() != DataType::Composite {
            return Err(EvioError::TypeMismatch("set_composite requires data_type Composite".into()));
        }
        self.pad = padding_for_len(raw.len(), 1) as u8;
        self.payload = Payload::Composite { format, raw };
        Ok(())
    }

    /// Total length of this structure's own header, in 32-bit words.
    fn header_words(&self) -> u32 {
        match self.kind {
            StructureKind::Bank => 2,
            StructureKind::Segment | StructureKind::TagSegment => 1,
        }
    }

    /// Length of this structure's data payload, in 32-bit words (padded).
    fn data_words(&self) -> u32 {
        match &self.payload {
            Payload::Empty => 0,
            Payload::Children(children) => children.iter().map(|c| c.total_words()).sum(),
            Payload::Primitives(arr) => {
                let padded = arr.byte_len() + padding_for_len(arr.byte_len(), arr.element_width());
                (padded / 4) as u32
            }
            Payload::Composite { format, raw } => {
                let format_bytes = crate::composite::strings_to_format(std::slice::from_ref(format));
                let padded = raw.len() + padding_for_len(raw.len(), 1);
                1 + (format_bytes.len() / 4) as u32 + (padded / 4) as u32
            }
        }
    }

    /// Total words including this structure's own header (what the length
    /// field of a *parent* container must add up).
    pub fn total_words(&self) -> u32 {
        self.header_words() + self.data_words()
    }

    pub fn write(&self, cursor: &mut ByteCursor) -> Result<()> {
        match self.kind {
            StructureKind::Bank => {
                let length_words = 1 + self.data_words();
                cursor.put_u32(length_words)?;
                let word1 = ((self.tag as u32) << 16)
                    | (((self.pad & 0x3) as u32) << 14)
                    | ((self.data_type.to_byte() as u32 & 0x3f) << 8)
                    | (self.num.unwrap_or(0) as u32);
                cursor.put_u32(word1)?;
            }
            StructureKind::Segment => {
                let word0 = ((self.tag as u32 & 0xFF) << 24)
                    | (((self.pad & 0x3) as u32) << 22)
                    | ((self.data_type.to_byte() as u32 & 0x3f) << 16)
                    | (self.data_words() & 0xFFFF);
                cursor.put_u32(word0)?;
            }
            StructureKind::TagSegment => {
                let word0 = ((self.tag as u32 & 0xFFF) << 20)
                    | ((self.data_type.to_byte() as u32 & 0xF) << 16)
                    | (self.data_words() & 0xFFFF);
                cursor.put_u32(word0)?;
            }
        }
        self.write_payload(cursor)
    }

    fn write_payload(&self, cursor: &mut ByteCursor) -> Result<()> {
        match &self.payload {
            Payload::Empty => Ok(()),
            Payload::Children(children) => {
                for c in children {
                    c.write(cursor)?;
                }
                Ok(())
            }
            Payload::Primitives(arr) => {
                arr.write_into(cursor)?;
                for _ in 0..self.pad {
                    cursor.put_u8(0)?;
                }
                Ok(())
            }
            Payload::Composite { format, raw } => {
                // The format string rides ahead of the tabular data as its own
                // tagsegment, mirroring how a composite bank nests a format
                // tagsegment followed by a data bank on the wire.
                let format_bytes = crate::composite::strings_to_format(std::slice::from_ref(format));
                let format_words = (format_bytes.len() / 4) as u32;
                let tagseg_word0 = (DataType::Char8Star.to_byte() as u32 & 0xF) << 16 | (format_words & 0xFFFF);
                cursor.put_u32(tagseg_word0)?;
                cursor.put_bytes(&format_bytes)?;
                cursor.put_bytes(raw)?;
                for _ in 0..self.pad {
                    cursor.put_u8(0)?;
                }
                Ok(())
            }
        }
    }

    /// Parse a top-level bank structure at the cursor's current position.
    pub fn parse_bank(cursor: &mut ByteCursor) -> Result<Structure> {
        let length_words = cursor.get_u32()?;
        let word1 = cursor.get_u32()?;
        let tag = (word1 >> 16) as u16;
        let pad = ((word1 >> 14) & 0x3) as u8;
        let data_type = DataType::from_byte(((word1 >> 8) & 0x3f) as u8)?;
        let num = (word1 & 0xFF) as u8;
        let data_words = length_words.checked_sub(1).ok_or_else(|| {
            EvioError::BadFormat("bank length word underflows its own header word count".into())
        })?;
        let payload = parse_payload(cursor, data_type, pad, data_words)?;
        Ok(Structure { kind: StructureKind::Bank, tag, data_type, num: Some(num), pad, payload })
    }

    pub fn parse_segment(cursor: &mut ByteCursor) -> Result<Structure> {
        let word0 = cursor.get_u32()?;
        let tag = ((word0 >> 24) & 0xFF) as u16;
        let pad = ((word0 >> 22) & 0x3) as u8;
        let data_type = DataType::from_byte(((word0 >> 16) & 0x3f) as u8)?;
        let data_words = word0 & 0xFFFF;
        let payload = parse_payload(cursor, data_type, pad, data_words)?;
        Ok(Structure { kind: StructureKind::Segment, tag, data_type, num: None, pad, payload })
    }

    pub fn parse_tagsegment(cursor: &mut ByteCursor) -> Result<Structure> {
        let word0 = cursor.get_u32()?;
        let tag = ((word0 >> 20) & 0xFFF) as u16;
        let data_type = DataType::from_byte(((word0 >> 16) & 0xF) as u8)?;
        let data_words = word0 & 0xFFFF;
        let payload = parse_payload(cursor, data_type, 0, data_words)?;
        Ok(Structure { kind: StructureKind::TagSegment, tag, data_type, num: None, pad: 0, payload })
    }
}

fn parse_payload(cursor: &mut ByteCursor, data_type: DataType, pad: u8, data_words: u32) -> Result<Payload> {
    if data_type.is_reserved() {
        return Err(EvioError::UnsupportedVersion(data_type.to_byte() as u32));
    }
    let data_bytes = (data_words * 4) as usize;
    if data_words == 0 {
        return Ok(Payload::Empty);
    }
    let start = cursor.position();
    if data_type.canonical().is_container() {
        let end = start + data_bytes;
        let mut children = Vec::new();
        while cursor.position() < end {
            let child = match data_type.canonical() {
                DataType::Bank => Structure::parse_bank(cursor)?,
                DataType::Segment => Structure::parse_segment(cursor)?,
                DataType::TagSegment => Structure::parse_tagsegment(cursor)?,
                _ => unreachable!(),
            };
            children.push(child);
        }
        if cursor.position() != end {
            return Err(EvioError::BadFormat("container contents did not exactly fill the declared length".into()));
        }
        return Ok(Payload::Children(children));
    }
    if data_type.canonical() == DataType::Composite {
        let end = start + data_bytes;
        let tagseg_word0 = cursor.get_u32()?;
        let format_words = (tagseg_word0 & 0xFFFF) as usize;
        let format_bytes = cursor.get_bytes(format_words * 4)?.to_vec();
        let format = crate::composite::string_to_raw_bytes(&format_bytes)
            .into_iter()
            .next()
            .unwrap_or_default();
        let remaining = end - cursor.position();
        let raw = cursor.get_bytes(remaining)?.to_vec();
        let unpadded = remaining - pad as usize;
        return Ok(Payload::Composite { format, raw: raw[..unpadded].to_vec() });
    }
    let pad = pad as usize;
    let array = match data_type.canonical() {
        DataType::Char8 => PrimitiveArray::Int8(
            cursor.get_bytes(data_bytes)?[..data_bytes - pad].iter().map(|b| *b as i8).collect(),
        ),
        DataType::Uchar8 => {
            PrimitiveArray::Uint8(cursor.get_bytes(data_bytes)?[..data_bytes - pad].to_vec())
        }
        DataType::Char8Star => {
            let bytes = cursor.get_bytes(data_bytes)?.to_vec();
            PrimitiveArray::Strings(crate::composite::string_to_raw_bytes(&bytes))
        }
        DataType::Short16 | DataType::Ushort16 => {
            let n = (data_bytes - pad) / 2;
            let mut out16u = Vec::with_capacity(n);
            for _ in 0..n {
                out16u.push(cursor.get_u16()?);
            }
            skip_pad(cursor, pad)?;
            if data_type.canonical() == DataType::Short16 {
                PrimitiveArray::Int16(out16u.into_iter().map(|v| v as i16).collect())
            } else {
                PrimitiveArray::Uint16(out16u)
            }
        }
        DataType::Int32 | DataType::Uint32 | DataType::Float32 | DataType::Unknown32 => {
            let n = (data_bytes - pad) / 4;
            match data_type.canonical() {
                DataType::Int32 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_i32()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Int32(v)
                }
                DataType::Uint32 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_u32()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Uint32(v)
                }
                DataType::Float32 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_f32()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Float32(v)
                }
                _ => {
                    let bytes = cursor.get_bytes(data_bytes)?[..data_bytes - pad].to_vec();
                    PrimitiveArray::Unknown32(bytes)
                }
            }
        }
        DataType::Int64 | DataType::Ulong64 | DataType::Long64 | DataType::Double64 => {
            let n = (data_bytes - pad) / 8;
            match data_type.canonical() {
                DataType::Int64 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_i64()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Int64(v)
                }
                DataType::Ulong64 | DataType::Long64 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_u64()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Uint64(v)
                }
                DataType::Double64 => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(cursor.get_f64()?);
                    }
                    skip_pad(cursor, pad)?;
                    PrimitiveArray::Float64(v)
                }
                _ => unreachable!(),
            }
        }
        other => return Err(EvioError::BadFormat(format!("unhandled leaf data type {other:?}"))),
    };
    Ok(Payload::Primitives(array))
}

fn skip_pad(cursor: &mut ByteCursor, pad: usize) -> Result<()> {
    for _ in 0..pad {
        cursor.get_u8()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endian;

    #[test]
    fn bank_with_int32_payload_round_trips() {
        let mut bank = Structure::new_bank(12, 3, DataType::Int32);
        bank.set_primitives(PrimitiveArray::Int32(vec![1, 2, 3])).unwrap();

        let mut cursor = ByteCursor::with_capacity(64);
        cursor.set_order(Endian::Big);
        bank.write(&mut cursor).unwrap();
        cursor.flip();

        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed, bank);
    }

    #[test]
    fn nested_bank_of_banks_round_trips() {
        let mut inner = Structure::new_bank(1, 0, DataType::Uint32);
        inner.set_primitives(PrimitiveArray::Uint32(vec![0xDEAD_BEEF])).unwrap();
        let mut outer = Structure::new_bank(99, 5, DataType::Bank);
        outer.push_child(inner).unwrap();

        let mut cursor = ByteCursor::with_capacity(64);
        cursor.set_order(Endian::Little);
        outer.write(&mut cursor).unwrap();
        cursor.flip();

        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed, outer);
    }

    #[test]
    fn char8_payload_gets_padded_on_write() {
        let mut bank = Structure::new_bank(1, 0, DataType::Char8);
        bank.set_primitives(PrimitiveArray::Int8(vec![b'h' as i8, b'i' as i8, b'!' as i8])).unwrap();
        assert_eq!(bank.pad, 1);

        let mut cursor = ByteCursor::with_capacity(32);
        cursor.set_order(Endian::Big);
        bank.write(&mut cursor).unwrap();
        assert_eq!(cursor.position() % 4, 0);
    }

    #[test]
    fn reserved_subtype_rejected_on_parse() {
        let mut cursor = ByteCursor::with_capacity(8);
        cursor.set_order(Endian::Big);
        cursor.put_u32(1).unwrap();
        let word1 = (0x22u32 & 0x3f) << 8;
        cursor.put_u32(word1).unwrap();
        cursor.set_position(0).unwrap();
        let err = Structure::parse_bank(&mut cursor);
        assert!(matches!(err, Err(EvioError::UnsupportedVersion(_))));
    }

    #[test]
    fn empty_bank_has_minimum_length() {
        let bank = Structure::new_bank(1, 0, DataType::Int32);
        assert_eq!(bank.total_words(), 2);
    }

    #[test]
    fn string_array_round_trips() {
        let mut bank = Structure::new_bank(7, 0, DataType::Char8Star);
        bank.set_primitives(PrimitiveArray::Strings(vec!["alpha".into(), "beta".into()])).unwrap();
        let mut cursor = ByteCursor::with_capacity(64);
        cursor.set_order(Endian::Big);
        bank.write(&mut cursor).unwrap();
        cursor.flip();
        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed, bank);
    }
}
