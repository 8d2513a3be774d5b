//! Record parsing: header + index + user header, with event data
//! decompressed lazily on first access.

use std::cell::RefCell;

use crate::cursor::ByteCursor;
use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::header::{RecordHeader, HEADER_SIZE_BYTES};

pub struct RecordInput {
    pub header: RecordHeader,
    order: Endian,
    index: Vec<u32>,
    user_header: Vec<u8>,
    compressed_data: Vec<u8>,
    data: RefCell<Option<Vec<u8>>>,
}

impl RecordInput {
    /// Parse the record starting at `offset`, autodetecting byte order from `guess`.
    pub fn parse(bytes: &[u8], offset: usize, guess: Endian) -> Result<RecordInput> {
        let (header, order) = RecordHeader::read(bytes, offset, guess)?;
        let mut pos = offset + HEADER_SIZE_BYTES;

        let index_len = header.index_length as usize;
        let index_slice = bytes
            .get(pos..pos + index_len)
            .ok_or(EvioError::Underflow { position: pos, requested: index_len, limit: bytes.len() })?;
        let index = index_slice.chunks_exact(4).map(|c| order.read_u32(c)).collect();
        pos += index_len;

        let user_header_len = header.user_header_length as usize;
        let user_header = bytes
            .get(pos..pos + user_header_len)
            .ok_or(EvioError::Underflow { position: pos, requested: user_header_len, limit: bytes.len() })?
            .to_vec();
        pos += user_header_len + header.bit_info.user_header_pad as usize;

        let region_len = (header.compressed_data_length_words * 4) as usize;
        let region = bytes
            .get(pos..pos + region_len)
            .ok_or(EvioError::Underflow { position: pos, requested: region_len, limit: bytes.len() })?;
        let true_len = region_len.saturating_sub(header.bit_info.compressed_pad as usize);
        let compressed_data = region[..true_len].to_vec();

        Ok(RecordInput { header, order, index, user_header, compressed_data, data: RefCell::new(None) })
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn user_header(&self) -> &[u8] {
        &self.user_header
    }

    pub fn entries(&self) -> u32 {
        self.header.entries
    }

    /// Total on-disk size of this record, in bytes, as claimed by its header.
    pub fn total_bytes(&self) -> usize {
        (self.header.record_length_words * 4) as usize
    }

    fn ensure_decompressed(&self) -> Result<()> {
        if self.data.borrow().is_some() {
            return Ok(());
        }
        let decompressed = crate::compression::decompress(
            self.header.compression_type,
            &self.compressed_data,
            self.header.uncompressed_data_length as usize,
        )?;
        *self.data.borrow_mut() = Some(decompressed);
        Ok(())
    }

    /// Byte offsets (start, length) of every event within the decompressed
    /// data blob, preferring the index array and falling back to reading
    /// each bank's own length word sequentially.
    fn offsets(&self) -> Result<Vec<(usize, usize)>> {
        self.ensure_decompressed()?;
        let guard = self.data.borrow();
        let data = guard.as_ref().expect("ensure_decompressed just populated this");
        let mut out = Vec::with_capacity(self.header.entries as usize);
        if !self.index.is_empty() {
            let mut pos = 0usize;
            for &len in &self.index {
                out.push((pos, len as usize));
                pos += len as usize;
            }
            return Ok(out);
        }
        let mut pos = 0usize;
        for _ in 0..self.header.entries {
            let word = data
                .get(pos..pos + 4)
                .ok_or(EvioError::Underflow { position: pos, requested: 4, limit: data.len() })?;
            let length_words = self.order.read_u32(word);
            let len = ((length_words + 1) * 4) as usize;
            out.push((pos, len));
            pos += len;
        }
        Ok(out)
    }

    pub fn event_length(&self, i: usize) -> Result<usize> {
        let offsets = self.offsets()?;
        offsets.get(i).map(|(_, len)| *len).ok_or(EvioError::IndexOutOfRange { index: i, limit: offsets.len() })
    }

    /// Copy of event `i`'s raw bytes (bank header included) from the
    /// decompressed data blob.
    pub fn event(&self, i: usize) -> Result<Vec<u8>> {
        let offsets = self.offsets()?;
        let (start, len) =
            *offsets.get(i).ok_or(EvioError::IndexOutOfRange { index: i, limit: offsets.len() })?;
        self.ensure_decompressed()?;
        let guard = self.data.borrow();
        let data = guard.as_ref().expect("ensure_decompressed just populated this");
        data.get(start..start + len)
            .map(|s| s.to_vec())
            .ok_or(EvioError::Underflow { position: start, requested: len, limit: data.len() })
    }

    pub fn get_event_into(&self, i: usize, out: &mut ByteCursor) -> Result<()> {
        let bytes = self.event(i)?;
        out.put_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_output::RecordOutput;
    use crate::types::CompressionType;

    #[test]
    fn round_trips_uncompressed_events_via_index() {
        let mut out = RecordOutput::new(Endian::Big, 0, 0);
        out.add_event(&[1, 2, 3, 4]).unwrap();
        out.add_event(&[5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        let bytes = out.build(CompressionType::None).unwrap();

        let input = RecordInput::parse(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(input.entries(), 2);
        assert_eq!(input.event(0).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(input.event(1).unwrap(), vec![5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn round_trips_gzip_compressed_events() {
        let mut out = RecordOutput::new(Endian::Little, 0, 0);
        let payload = vec![9u8; 200];
        out.add_event(&payload).unwrap();
        let bytes = out.build(CompressionType::Gzip).unwrap();

        let input = RecordInput::parse(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(input.event(0).unwrap(), payload);
    }

    #[test]
    fn event_index_out_of_range() {
        let out = RecordOutput::new(Endian::Big, 0, 0);
        let bytes = out.build(CompressionType::None).unwrap();
        let input = RecordInput::parse(&bytes, 0, Endian::NATIVE).unwrap();
        assert!(matches!(input.event(0), Err(EvioError::IndexOutOfRange { .. })));
    }
}
