//! Zero-copy structure arena: a flat scan over an already-decompressed
//! record's bytes that builds index metadata (position, length, tag/type/pad)
//! without materializing a [`crate::tree::Structure`] per node.
//!
//! Every [`NodeRef`] carries the arena's generation counter. Editing the
//! arena (see [`crate::reader`]'s `remove_structure`/`add_structure`) bumps
//! the generation, so a `NodeRef` taken before the edit reads as
//! [`EvioError::StaleReference`] afterward instead of silently returning
//! data that has moved or no longer exists.

use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::types::{DataType, StructureKind};

#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub position: usize,
    pub length_words: u32,
    pub data_position: usize,
    pub data_length_words: u32,
    pub tag: u16,
    pub num: Option<u8>,
    pub data_type: DataType,
    pub pad: u8,
    pub kind: StructureKind,
    pub record_position: usize,
    pub event_place: usize,
    pub parent_index: Option<usize>,
    pub child_indices: Vec<usize>,
}

/// A stable handle into a [`NodeIndex`], valid only for the generation it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    index: usize,
    generation: u64,
}

/// Flat arena of node descriptors over an owned buffer of decompressed record bytes.
pub struct NodeIndex {
    buffer: Vec<u8>,
    order: Endian,
    descriptors: Vec<NodeDescriptor>,
    event_roots: Vec<usize>,
    generation: u64,
}

impl NodeIndex {
    /// Scan every event in `buffer` (each `event_positions[i]` is the byte
    /// offset of a top-level bank) and build a flat descriptor arena.
    pub fn scan(buffer: Vec<u8>, order: Endian, event_positions: &[usize], record_position: usize) -> Result<NodeIndex> {
        let mut descriptors = Vec::new();
        let mut event_roots = Vec::with_capacity(event_positions.len());
        for (event_place, &pos) in event_positions.iter().enumerate() {
            let mut cursor = pos;
            let root = scan_structure(
                &buffer,
                &mut cursor,
                order,
                StructureKind::Bank,
                None,
                record_position,
                event_place,
                &mut descriptors,
            )?;
            event_roots.push(root);
        }
        Ok(NodeIndex { buffer, order, descriptors, event_roots, generation: 0 })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn event_count(&self) -> usize {
        self.event_roots.len()
    }

    pub fn extract_event_node(&self, event_index: usize) -> Result<NodeRef> {
        let idx = *self
            .event_roots
            .get(event_index)
            .ok_or(EvioError::IndexOutOfRange { index: event_index, limit: self.event_roots.len() })?;
        Ok(NodeRef { index: idx, generation: self.generation })
    }

    pub fn node(&self, node_ref: NodeRef) -> Result<&NodeDescriptor> {
        if node_ref.generation != self.generation {
            return Err(EvioError::StaleReference);
        }
        self.descriptors
            .get(node_ref.index)
            .ok_or(EvioError::IndexOutOfRange { index: node_ref.index, limit: self.descriptors.len() })
    }

    pub fn children(&self, node_ref: NodeRef) -> Result<Vec<NodeRef>> {
        let desc = self.node(node_ref)?;
        Ok(desc
            .child_indices
            .iter()
            .map(|&index| NodeRef { index, generation: self.generation })
            .collect())
    }

    /// Raw, still-padded data bytes belonging to this node's own payload
    /// (empty for container nodes; use [`NodeIndex::children`] instead).
    pub fn data(&self, node_ref: NodeRef) -> Result<&[u8]> {
        let desc = self.node(node_ref)?;
        let len = (desc.data_length_words * 4) as usize;
        self.buffer
            .get(desc.data_position..desc.data_position + len)
            .ok_or(EvioError::Underflow { position: desc.data_position, requested: len, limit: self.buffer.len() })
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Invalidate every outstanding [`NodeRef`] and return the new generation.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn descriptors_mut(&mut self) -> &mut Vec<NodeDescriptor> {
        &mut self.descriptors
    }

    pub fn event_roots(&self) -> &[usize] {
        &self.event_roots
    }

    /// Look up a descriptor by its raw arena slot, bypassing the generation
    /// check. Used to walk `parent_index` chains, which are plain indices
    /// rather than `NodeRef`s.
    pub fn descriptor_at(&self, index: usize) -> Option<&NodeDescriptor> {
        self.descriptors.get(index)
    }
}

fn scan_structure(
    buffer: &[u8],
    pos: &mut usize,
    order: Endian,
    kind: StructureKind,
    parent_index: Option<usize>,
    record_position: usize,
    event_place: usize,
    descriptors: &mut Vec<NodeDescriptor>,
) -> Result<usize> {
    let position = *pos;
    let (length_words, tag, num, data_type, pad, header_words) = match kind {
        StructureKind::Bank => {
            let w0 = read_u32(buffer, position, order)?;
            let w1 = read_u32(buffer, position + 4, order)?;
            let tag = (w1 >> 16) as u16;
            let pad = ((w1 >> 14) & 0x3) as u8;
            let data_type = DataType::from_byte(((w1 >> 8) & 0x3f) as u8)?;
            let num = (w1 & 0xFF) as u8;
            (w0, tag, Some(num), data_type, pad, 2u32)
        }
        StructureKind::Segment => {
            let w0 = read_u32(buffer, position, order)?;
            let tag = ((w0 >> 24) & 0xFF) as u16;
            let pad = ((w0 >> 22) & 0x3) as u8;
            let data_type = DataType::from_byte(((w0 >> 16) & 0x3f) as u8)?;
            let length_words = w0 & 0xFFFF;
            (length_words, tag, None, data_type, pad, 1u32)
        }
        StructureKind::TagSegment => {
            let w0 = read_u32(buffer, position, order)?;
            let tag = ((w0 >> 20) & 0xFFF) as u16;
            let data_type = DataType::from_byte(((w0 >> 16) & 0xF) as u8)?;
            let length_words = w0 & 0xFFFF;
            (length_words, tag, None, data_type, 0u8, 1u32)
        }
    };
    if data_type.is_reserved() {
        return Err(EvioError::UnsupportedVersion(data_type.to_byte() as u32));
    }
    let data_words = if kind == StructureKind::Bank {
        length_words.checked_sub(1).ok_or_else(|| EvioError::BadFormat("bank length underflow".into()))?
    } else {
        length_words
    };
    let data_position = position + (header_words as usize) * 4;
    let my_index = descriptors.len();
    descriptors.push(NodeDescriptor {
        position,
        length_words: header_words + data_words,
        data_position,
        data_length_words: data_words,
        tag,
        num,
        data_type,
        pad,
        kind,
        record_position,
        event_place,
        parent_index,
        child_indices: Vec::new(),
    });
    *pos = data_position;
    if data_type.canonical().is_container() {
        let end = data_position + (data_words * 4) as usize;
        let child_kind = data_type.canonical();
        let child_struct_kind = match child_kind {
            DataType::Bank => StructureKind::Bank,
            DataType::Segment => StructureKind::Segment,
            DataType::TagSegment => StructureKind::TagSegment,
            _ => unreachable!(),
        };
        while *pos < end {
            let child_idx = scan_structure(
                buffer,
                pos,
                order,
                child_struct_kind,
                Some(my_index),
                record_position,
                event_place,
                descriptors,
            )?;
            descriptors[my_index].child_indices.push(child_idx);
        }
        if *pos != end {
            return Err(EvioError::BadFormat("container scan overran its declared length".into()));
        }
    } else {
        *pos += (data_words * 4) as usize;
    }
    Ok(my_index)
}

fn read_u32(buffer: &[u8], pos: usize, order: Endian) -> Result<u32> {
    buffer
        .get(pos..pos + 4)
        .map(|b| order.read_u32(b))
        .ok_or(EvioError::Underflow { position: pos, requested: 4, limit: buffer.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteCursor;
    use crate::tree::{PrimitiveArray, Structure};

    fn encode_event(structure: &Structure, order: Endian) -> Vec<u8> {
        let mut cursor = ByteCursor::with_capacity(256);
        cursor.set_order(order);
        structure.write(&mut cursor).unwrap();
        cursor.flip();
        cursor.as_slice().to_vec()
    }

    #[test]
    fn scans_flat_bank() {
        let mut bank = Structure::new_bank(5, 2, DataType::Int32);
        bank.set_primitives(PrimitiveArray::Int32(vec![10, 20, 30])).unwrap();
        let bytes = encode_event(&bank, Endian::Big);

        let index = NodeIndex::scan(bytes, Endian::Big, &[0], 0).unwrap();
        let root = index.extract_event_node(0).unwrap();
        let desc = index.node(root).unwrap();
        assert_eq!(desc.tag, 5);
        assert_eq!(desc.num, Some(2));
        assert!(desc.child_indices.is_empty());
        assert_eq!(index.data(root).unwrap().len(), 12);
    }

    #[test]
    fn scans_nested_bank_and_exposes_children() {
        let mut inner = Structure::new_bank(2, 0, DataType::Uint32);
        inner.set_primitives(PrimitiveArray::Uint32(vec![7])).unwrap();
        let mut outer = Structure::new_bank(1, 9, DataType::Bank);
        outer.push_child(inner).unwrap();
        let bytes = encode_event(&outer, Endian::Little);

        let index = NodeIndex::scan(bytes, Endian::Little, &[0], 0).unwrap();
        let root = index.extract_event_node(0).unwrap();
        let children = index.children(root).unwrap();
        assert_eq!(children.len(), 1);
        let child_desc = index.node(children[0]).unwrap();
        assert_eq!(child_desc.tag, 2);
    }

    #[test]
    fn stale_reference_after_generation_bump() {
        let mut bank = Structure::new_bank(1, 0, DataType::Int32);
        bank.set_primitives(PrimitiveArray::Int32(vec![1])).unwrap();
        let bytes = encode_event(&bank, Endian::Big);
        let mut index = NodeIndex::scan(bytes, Endian::Big, &[0], 0).unwrap();
        let root = index.extract_event_node(0).unwrap();
        index.bump_generation();
        assert!(matches!(index.node(root), Err(EvioError::StaleReference)));
    }
}
