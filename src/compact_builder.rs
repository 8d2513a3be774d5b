//! Streaming structure builder: push banks/segments/tagsegments onto an open
//! frame stack, write placeholder length words, and backfill them when each
//! frame closes. Unlike [`crate::tree::Structure`], nothing is buffered in
//! memory as a separate tree — everything lands directly in the output
//! cursor, which is what makes this the right tool for writers that need to
//! avoid a full intermediate allocation per event.

use crate::cursor::ByteCursor;
use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::header::padding_for_len;
use crate::node_index::{NodeIndex, NodeRef};
use crate::tree::Structure;
use crate::types::{DataType, StructureKind};

const DEFAULT_MAX_DEPTH: usize = 50;

macro_rules! numeric_writer {
    ($name:ident, $ty:ty, $data_type:expr, $cast:ty, $put:ident) => {
        pub fn $name(&mut self, values: &[$ty]) -> Result<()> {
            self.check_leaf_type($data_type)?;
            for &v in values {
                self.cursor.$put(v as $cast)?;
            }
            self.current_mut()?.leaf_written = true;
            Ok(())
        }
    };
}

struct Frame {
    kind: StructureKind,
    header_pos: usize,
    data_start: usize,
    tag: u16,
    num: Option<u8>,
    data_type: DataType,
    /// Str/Composite leaves pad themselves; everything else is padded at close.
    self_padded: bool,
    leaf_written: bool,
}

pub struct CompactBuilder {
    cursor: ByteCursor,
    stack: Vec<Frame>,
    max_depth: usize,
}

impl CompactBuilder {
    pub fn new(order: Endian, capacity: usize) -> CompactBuilder {
        let mut cursor = ByteCursor::with_capacity(capacity);
        cursor.set_order(order);
        CompactBuilder { cursor, stack: Vec::new(), max_depth: DEFAULT_MAX_DEPTH }
    }

    fn check_parent_accepts(&self, kind: StructureKind) -> Result<()> {
        if let Some(top) = self.stack.last() {
            if top.leaf_written {
                return Err(EvioError::TypeMismatch("frame already holds leaf data, cannot add children".into()));
            }
            let expected = match top.data_type.canonical() {
                DataType::Bank => StructureKind::Bank,
                DataType::Segment => StructureKind::Segment,
                DataType::TagSegment => StructureKind::TagSegment,
                _ => return Err(EvioError::TypeMismatch("parent structure is not a container type".into())),
            };
            if expected != kind {
                return Err(EvioError::TypeMismatch(format!(
                    "parent declares {expected:?} children, tried to open a {kind:?}"
                )));
            }
        }
        Ok(())
    }

    fn open(&mut self, kind: StructureKind, tag: u16, num: Option<u8>, data_type: DataType) -> Result<()> {
        if self.stack.len() >= self.max_depth {
            return Err(EvioError::BadFormat(format!("structure nesting exceeds max depth {}", self.max_depth)));
        }
        self.check_parent_accepts(kind)?;
        let header_pos = self.cursor.position();
        match kind {
            StructureKind::Bank => {
                self.cursor.put_u32(0)?;
                self.cursor.put_u32(0)?;
            }
            StructureKind::Segment | StructureKind::TagSegment => {
                self.cursor.put_u32(0)?;
            }
        }
        let data_start = self.cursor.position();
        self.stack.push(Frame { kind, header_pos, data_start, tag, num, data_type, self_padded: false, leaf_written: false });
        Ok(())
    }

    pub fn open_bank(&mut self, tag: u16, num: u8, data_type: DataType) -> Result<()> {
        self.open(StructureKind::Bank, tag, Some(num), data_type)
    }

    pub fn open_segment(&mut self, tag: u16, data_type: DataType) -> Result<()> {
        self.open(StructureKind::Segment, tag, None, data_type)
    }

    pub fn open_tag_segment(&mut self, tag: u16, data_type: DataType) -> Result<()> {
        self.open(StructureKind::TagSegment, tag, None, data_type)
    }

    pub fn close_structure(&mut self) -> Result<()> {
        let frame = self.stack.pop().ok_or_else(|| EvioError::BadFormat("close_structure called with no open frame".into()))?;
        let mut total_len = self.cursor.position() - frame.data_start;

        let pad = if frame.self_padded || frame.data_type.canonical().is_container() {
            if total_len % 4 != 0 {
                return Err(EvioError::BadAlignment(total_len));
            }
            0u8
        } else {
            let width = frame.data_type.element_width().unwrap_or(4);
            let pad = padding_for_len(total_len, width);
            for _ in 0..pad {
                self.cursor.put_u8(0)?;
            }
            total_len += pad;
            pad as u8
        };

        let data_words = (total_len / 4) as u32;
        let end_pos = self.cursor.position();

        match frame.kind {
            StructureKind::Bank => {
                let length_words = 1 + data_words;
                self.cursor.put_u32_at(frame.header_pos, length_words)?;
                let word1 = ((frame.tag as u32) << 16)
                    | (((pad & 0x3) as u32) << 14)
                    | ((frame.data_type.to_byte() as u32 & 0x3f) << 8)
                    | (frame.num.unwrap_or(0) as u32);
                self.cursor.put_u32_at(frame.header_pos + 4, word1)?;
            }
            StructureKind::Segment => {
                let word0 = ((frame.tag as u32 & 0xFF) << 24)
                    | (((pad & 0x3) as u32) << 22)
                    | ((frame.data_type.to_byte() as u32 & 0x3f) << 16)
                    | (data_words & 0xFFFF);
                self.cursor.put_u32_at(frame.header_pos, word0)?;
            }
            StructureKind::TagSegment => {
                let word0 = ((frame.tag as u32 & 0xFFF) << 20)
                    | ((frame.data_type.to_byte() as u32 & 0xF) << 16)
                    | (data_words & 0xFFFF);
                self.cursor.put_u32_at(frame.header_pos, word0)?;
            }
        }
        self.cursor.set_position(end_pos)?;
        Ok(())
    }

    pub fn close_all(&mut self) -> Result<()> {
        while !self.stack.is_empty() {
            self.close_structure()?;
        }
        Ok(())
    }

    fn current_mut(&mut self) -> Result<&mut Frame> {
        self.stack.last_mut().ok_or_else(|| EvioError::BadFormat("no open frame to write data into".into()))
    }

    fn check_leaf_type(&self, ty: DataType) -> Result<()> {
        let top = self.stack.last().ok_or_else(|| EvioError::BadFormat("no open frame to write data into".into()))?;
        if top.data_type.canonical() != ty.canonical() {
            return Err(EvioError::TypeMismatch(format!(
                "frame declares {:?}, tried to write {:?} data",
                top.data_type, ty
            )));
        }
        Ok(())
    }

    numeric_writer!(add_i32_data, i32, DataType::Int32, u32, put_u32);
    numeric_writer!(add_u32_data, u32, DataType::Uint32, u32, put_u32);
    numeric_writer!(add_i64_data, i64, DataType::Int64, u64, put_u64);
    numeric_writer!(add_u64_data, u64, DataType::Ulong64, u64, put_u64);

    pub fn add_f32_data(&mut self, values: &[f32]) -> Result<()> {
        self.check_leaf_type(DataType::Float32)?;
        for &v in values {
            self.cursor.put_f32(v)?;
        }
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    pub fn add_f64_data(&mut self, values: &[f64]) -> Result<()> {
        self.check_leaf_type(DataType::Double64)?;
        for &v in values {
            self.cursor.put_f64(v)?;
        }
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    pub fn add_i16_data(&mut self, values: &[i16]) -> Result<()> {
        self.check_leaf_type(DataType::Short16)?;
        for &v in values {
            self.cursor.put_u16(v as u16)?;
        }
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    pub fn add_u16_data(&mut self, values: &[u16]) -> Result<()> {
        self.check_leaf_type(DataType::Ushort16)?;
        for &v in values {
            self.cursor.put_u16(v)?;
        }
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    pub fn add_i8_data(&mut self, values: &[i8]) -> Result<()> {
        self.check_leaf_type(DataType::Char8)?;
        for &v in values {
            self.cursor.put_u8(v as u8)?;
        }
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    pub fn add_u8_data(&mut self, values: &[u8]) -> Result<()> {
        self.check_leaf_type(DataType::Uchar8)?;
        self.cursor.put_bytes(values)?;
        self.current_mut()?.leaf_written = true;
        Ok(())
    }

    /// Write a string array leaf. May only be called once per frame.
    pub fn add_string_data(&mut self, strings: &[String]) -> Result<()> {
        self.check_leaf_type(DataType::Char8Star)?;
        {
            let frame = self.current_mut()?;
            if frame.leaf_written {
                return Err(EvioError::AlreadyWritten("string leaf"));
            }
        }
        let packed = crate::composite::strings_to_format(strings);
        self.cursor.put_bytes(&packed)?;
        let frame = self.current_mut()?;
        frame.leaf_written = true;
        frame.self_padded = true;
        Ok(())
    }

    /// Write a pre-encoded composite tabular leaf. May only be called once per frame.
    pub fn add_composite_data(&mut self, raw: &[u8]) -> Result<()> {
        self.check_leaf_type(DataType::Composite)?;
        {
            let frame = self.current_mut()?;
            if frame.leaf_written {
                return Err(EvioError::AlreadyWritten("composite leaf"));
            }
        }
        let pad = padding_for_len(raw.len(), 1);
        self.cursor.put_bytes(raw)?;
        for _ in 0..pad {
            self.cursor.put_u8(0)?;
        }
        let frame = self.current_mut()?;
        frame.leaf_written = true;
        frame.self_padded = true;
        Ok(())
    }

    /// Bulk-append a whole bank node from a zero-copy arena. Fast path
    /// copies raw bytes verbatim when both sides share byte order;
    /// otherwise the node is parsed and re-serialized in the builder's order.
    pub fn add_evio_node(&mut self, index: &NodeIndex, node_ref: NodeRef) -> Result<()> {
        self.check_parent_accepts(StructureKind::Bank)?;
        let desc = index.node(node_ref)?;
        let start = desc.position;
        let len = (desc.length_words * 4) as usize;
        let raw = index
            .buffer()
            .get(start..start + len)
            .ok_or(EvioError::Underflow { position: start, requested: len, limit: index.buffer().len() })?;

        if index.order() == self.cursor.order() {
            self.cursor.put_bytes(raw)?;
        } else {
            let mut src_cursor = ByteCursor::wrap(raw.to_vec());
            src_cursor.set_order(index.order());
            let structure = Structure::parse_bank(&mut src_cursor)?;
            structure.write(&mut self.cursor)?;
        }
        if let Some(top) = self.stack.last_mut() {
            top.leaf_written = false;
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Finish building: close any still-open frames and return the bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.close_all()?;
        self.cursor.flip();
        Ok(self.cursor.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_flat_bank_with_int32_leaf() {
        let mut b = CompactBuilder::new(Endian::Big, 64);
        b.open_bank(5, 1, DataType::Int32).unwrap();
        b.add_i32_data(&[1, 2, 3]).unwrap();
        b.close_structure().unwrap();
        let bytes = b.finish().unwrap();

        let mut cursor = ByteCursor::wrap(bytes);
        cursor.set_order(Endian::Big);
        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed.tag, 5);
    }

    #[test]
    fn rejects_mismatched_child_kind() {
        let mut b = CompactBuilder::new(Endian::Big, 64);
        b.open_bank(1, 0, DataType::Segment).unwrap();
        let err = b.open_bank(2, 0, DataType::Int32);
        assert!(matches!(err, Err(EvioError::TypeMismatch(_))));
    }

    #[test]
    fn string_leaf_cannot_be_written_twice() {
        let mut b = CompactBuilder::new(Endian::Big, 64);
        b.open_bank(1, 0, DataType::Char8Star).unwrap();
        b.add_string_data(&["a".to_string()]).unwrap();
        let err = b.add_string_data(&["b".to_string()]);
        assert!(matches!(err, Err(EvioError::AlreadyWritten(_))));
    }

    #[test]
    fn nested_banks_close_in_order() {
        let mut b = CompactBuilder::new(Endian::Little, 128);
        b.open_bank(1, 0, DataType::Bank).unwrap();
        b.open_bank(2, 0, DataType::Int32).unwrap();
        b.add_i32_data(&[42]).unwrap();
        b.close_structure().unwrap();
        b.close_structure().unwrap();
        let bytes = b.finish().unwrap();

        let mut cursor = ByteCursor::wrap(bytes);
        cursor.set_order(Endian::Little);
        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed.children().unwrap().len(), 1);
    }

    #[test]
    fn finish_closes_dangling_frames() {
        let mut b = CompactBuilder::new(Endian::Big, 64);
        b.open_bank(9, 0, DataType::Uint32).unwrap();
        b.add_u32_data(&[1, 2]).unwrap();
        let bytes = b.finish().unwrap();
        assert_eq!(bytes.len(), 16);
    }
}
