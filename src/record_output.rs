//! Record assembly: accumulate already-serialized event byte blobs and emit
//! a complete, optionally-compressed record (header + index + user header +
//! data).

use crate::cursor::ByteCursor;
use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::header::{padding_for_len, words_for_bytes, BitInfo, RecordHeader, HEADER_SIZE_BYTES, HEADER_SIZE_WORDS};
use crate::node_index::{NodeIndex, NodeRef};
use crate::types::{CompressionType, EventType, HeaderType};

pub struct RecordOutput {
    order: Endian,
    events: Vec<Vec<u8>>,
    user_header: Vec<u8>,
    max_event_count: u32,
    max_bytes: usize,
    record_number: u32,
}

impl RecordOutput {
    pub fn new(order: Endian, max_event_count: u32, max_bytes: usize) -> RecordOutput {
        RecordOutput { order, events: Vec::new(), user_header: Vec::new(), max_event_count, max_bytes, record_number: 1 }
    }

    pub fn record_number(&self) -> u32 {
        self.record_number
    }

    pub fn set_record_number(&mut self, n: u32) {
        self.record_number = n;
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True once this record has reached its configured event-count limit.
    /// `Writer::write_event` uses this to flush a record the moment it fills
    /// rather than waiting to discover `RecordFull` on the next event.
    pub fn is_full(&self) -> bool {
        self.max_event_count != 0 && self.events.len() as u32 >= self.max_event_count
    }

    fn projected_bytes(&self, additional: usize) -> usize {
        let data: usize = self.events.iter().map(|e| e.len()).sum::<usize>() + additional;
        HEADER_SIZE_BYTES + 4 * self.events.len() + self.user_header.len() + data
    }

    /// Append one event's raw, already word-aligned bytes. Fails with
    /// `RecordFull` rather than silently growing past configured limits.
    pub fn add_event(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() % 4 != 0 {
            return Err(EvioError::BadAlignment(bytes.len()));
        }
        if self.events.len() as u32 >= self.max_event_count && self.max_event_count != 0 {
            return Err(EvioError::RecordFull);
        }
        if self.max_bytes != 0 && self.projected_bytes(bytes.len()) > self.max_bytes && !self.events.is_empty() {
            return Err(EvioError::RecordFull);
        }
        self.events.push(bytes.to_vec());
        Ok(())
    }

    /// Append a whole node's byte range straight out of a zero-copy arena.
    pub fn add_event_node(&mut self, index: &NodeIndex, node_ref: NodeRef) -> Result<()> {
        let desc = index.node(node_ref)?;
        let start = desc.position;
        let len = (desc.length_words * 4) as usize;
        let bytes = index
            .buffer()
            .get(start..start + len)
            .ok_or(EvioError::Underflow { position: start, requested: len, limit: index.buffer().len() })?
            .to_vec();
        self.add_event(&bytes)
    }

    pub fn set_user_header(&mut self, bytes: Vec<u8>) {
        self.user_header = bytes;
    }

    pub fn reset(&mut self) {
        self.events.clear();
        self.user_header.clear();
    }

    /// Serialize this record, applying `compression` to the event-data region only.
    pub fn build(&self, compression: CompressionType) -> Result<Vec<u8>> {
        let mut index_bytes = Vec::with_capacity(4 * self.events.len());
        let mut uncompressed = Vec::new();
        for event in &self.events {
            let mut lenbuf = [0u8; 4];
            self.order.write_u32(&mut lenbuf, event.len() as u32);
            index_bytes.extend_from_slice(&lenbuf);
            uncompressed.extend_from_slice(event);
        }

        let compressed = crate::compression::compress(compression, &uncompressed)?;
        let compressed_pad = padding_for_len(compressed.len(), 1);
        let user_header_pad = padding_for_len(self.user_header.len(), 1);

        let header_length_words = HEADER_SIZE_WORDS;
        let index_words = words_for_bytes(index_bytes.len());
        let user_header_words = words_for_bytes(self.user_header.len());
        let compressed_words = words_for_bytes(compressed.len());
        let record_length_words = header_length_words + index_words + user_header_words + compressed_words;

        let header = RecordHeader {
            record_length_words,
            record_number: self.record_number,
            header_length_words,
            entries: self.events.len() as u32,
            index_length: index_bytes.len() as u32,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioRecord,
                has_dictionary: false,
                has_first_event: false,
                is_last_or_has_trailer_index: false,
                event_type: EventType::Physics,
                user_header_pad: user_header_pad as u8,
                data_pad: 0,
                compressed_pad: compressed_pad as u8,
            },
            user_header_length: self.user_header.len() as u32,
            uncompressed_data_length: uncompressed.len() as u32,
            compression_type: compression,
            compressed_data_length_words: compressed_words,
            user_register_1: 0,
            user_register_2: 0,
        };

        let mut cursor = ByteCursor::with_capacity((record_length_words * 4) as usize);
        cursor.set_order(self.order);
        let mut raw = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut raw, 0, self.order)?;
        cursor.put_bytes(&raw)?;
        cursor.put_bytes(&index_bytes)?;
        cursor.put_bytes(&self.user_header)?;
        for _ in 0..user_header_pad {
            cursor.put_u8(0)?;
        }
        cursor.put_bytes(&compressed)?;
        for _ in 0..compressed_pad {
            cursor.put_u8(0)?;
        }
        cursor.flip();
        Ok(cursor.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_has_minimum_size() {
        let record = RecordOutput::new(Endian::Big, 0, 0);
        let bytes = record.build(CompressionType::None).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE_BYTES);
    }

    #[test]
    fn record_full_on_event_count_limit() {
        let mut record = RecordOutput::new(Endian::Big, 1, 0);
        record.add_event(&[0, 0, 0, 0]).unwrap();
        let err = record.add_event(&[0, 0, 0, 0]);
        assert!(matches!(err, Err(EvioError::RecordFull)));
    }

    #[test]
    fn rejects_misaligned_event_bytes() {
        let mut record = RecordOutput::new(Endian::Big, 0, 0);
        let err = record.add_event(&[0, 0, 0]);
        assert!(matches!(err, Err(EvioError::BadAlignment(3))));
    }

    #[test]
    fn build_roundtrips_entry_count_and_index() {
        let mut record = RecordOutput::new(Endian::Little, 0, 0);
        record.add_event(&[1, 2, 3, 4]).unwrap();
        record.add_event(&[5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        let bytes = record.build(CompressionType::None).unwrap();
        let (header, order) = RecordHeader::read(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(order, Endian::Little);
        assert_eq!(header.entries, 2);
        assert_eq!(header.index_length, 8);
    }
}
