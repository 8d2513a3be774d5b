//! Record-table construction, sequential/random event access, and in-place
//! structural edits over an owned buffer of evio bytes.
//!
//! Unlike [`crate::writer::Writer`], which stays generic over `Write + Seek`
//! sinks, `Reader` owns its bytes outright (`Vec<u8>`) rather than staying
//! generic over a `Read + Seek` source. `remove_structure`/`add_structure`
//! splice bytes in place and shift everything after the edit, which needs a
//! mutable contiguous buffer rather than a stream cursor; keeping the type
//! generic over `R` would just mean materializing the same `Vec<u8>` at the
//! first edit anyway. `open`/`from_buffer` are the two ways to get one.

use std::fs;
use std::path::Path;

use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::header::{BlockHeaderV4, FileHeader, RecordHeader, HEADER_SIZE_BYTES, LEGACY_HEADER_SIZE_BYTES};
use crate::node_index::{NodeIndex, NodeRef};
use crate::record_input::RecordInput;
use crate::types::{CompressionType, StructureKind};

/// Construction-time knobs governing how the record table is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Ignore any trailer/file-header index and walk every record header
    /// end to end. Slower, but tolerates a truncated or lying index.
    pub force_scan: bool,
    /// For legacy (v1-4) input, verify that block numbers increase by one
    /// with no gaps and fail `BlockNumberOutOfSequence` otherwise.
    pub check_block_sequence: bool,
}

#[derive(Debug, Clone)]
struct RecordEntry {
    position: usize,
    length_words: u32,
    event_count: u32,
}

/// A parsed evio file or buffer: a table of record positions plus lazy,
/// per-record event decoding. Not safe to share across threads without
/// [`crate::sync::Synchronized`].
pub struct Reader {
    buffer: Vec<u8>,
    order: Endian,
    options: ReaderOptions,
    file_header: Option<FileHeader>,
    legacy: bool,
    records: Vec<RecordEntry>,
    dictionary_xml: Option<String>,
    first_event: Option<Vec<u8>>,
    cursor: Option<usize>,
    cached: Option<(usize, RecordInput)>,
}

impl Reader {
    /// Read an entire file into memory and parse it as a v6 evio file (file
    /// header, then records, then trailer) or, if the header reports a
    /// version below 6, as a legacy block stream.
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Reader> {
        let buffer = fs::read(path)?;
        Reader::from_file_bytes(buffer, options)
    }

    /// Parse `bytes` as a raw record stream with no file header: the first
    /// record header starts at offset 0. Always scan-indexed, since there is
    /// no file-level index or trailer to consult.
    pub fn from_buffer(bytes: Vec<u8>, options: ReaderOptions) -> Result<Reader> {
        match RecordHeader::read(&bytes, 0, Endian::NATIVE) {
            Ok((_, order)) => {
                let records = scan_records(&bytes, order, 0)?;
                Ok(Reader {
                    buffer: bytes,
                    order,
                    options,
                    file_header: None,
                    legacy: false,
                    records,
                    dictionary_xml: None,
                    first_event: None,
                    cursor: None,
                    cached: None,
                })
            }
            Err(EvioError::UnsupportedVersion(_)) => Reader::from_legacy_bytes(bytes, options, 0),
            Err(e) => Err(e),
        }
    }

    fn from_file_bytes(buffer: Vec<u8>, options: ReaderOptions) -> Result<Reader> {
        match FileHeader::read(&buffer, 0, Endian::NATIVE) {
            Ok((file_header, order)) => Reader::from_file_header(buffer, file_header, order, options),
            Err(EvioError::UnsupportedVersion(_)) | Err(EvioError::BadFormat(_)) => {
                Reader::from_legacy_bytes(buffer, options, 0)
            }
            Err(e) => Err(e),
        }
    }

    fn from_file_header(buffer: Vec<u8>, file_header: FileHeader, order: Endian, options: ReaderOptions) -> Result<Reader> {
        let index_bytes = file_header.index_length as usize;
        let user_header_bytes =
            file_header.user_header_length as usize + file_header.bit_info.user_header_pad as usize;
        let data_start = HEADER_SIZE_BYTES + index_bytes + user_header_bytes;

        let records = if options.force_scan {
            scan_records(&buffer, order, data_start)?
        } else if file_header.has_trailer_with_index() && file_header.trailer_position >= 1 {
            let trailer_pos = file_header.trailer_position as usize;
            let (trailer_header, _) = RecordHeader::read(&buffer, trailer_pos, order)?;
            records_from_index_pairs(&buffer, order, trailer_pos + HEADER_SIZE_BYTES, trailer_header.index_length as usize, data_start)?
        } else if index_bytes > 0 {
            records_from_index_pairs(&buffer, order, HEADER_SIZE_BYTES, index_bytes, data_start)?
        } else {
            scan_records(&buffer, order, data_start)?
        };

        let mut dictionary_xml = None;
        let mut first_event = None;
        if file_header.bit_info.has_dictionary || file_header.bit_info.has_first_event {
            let user_start = HEADER_SIZE_BYTES + index_bytes;
            let user_bytes = buffer
                .get(user_start..user_start + file_header.user_header_length as usize)
                .ok_or(EvioError::Underflow { position: user_start, requested: file_header.user_header_length as usize, limit: buffer.len() })?;
            let mut cut = 0usize;
            if file_header.bit_info.has_dictionary {
                let nul = user_bytes.iter().position(|&b| b == 0).unwrap_or(user_bytes.len());
                dictionary_xml = Some(String::from_utf8_lossy(&user_bytes[..nul]).into_owned());
                cut = nul + 1;
                while cut % 4 != 0 {
                    cut += 1;
                }
            }
            if file_header.bit_info.has_first_event {
                first_event = Some(user_bytes[cut.min(user_bytes.len())..].to_vec());
            }
        }

        Ok(Reader {
            buffer,
            order,
            options,
            file_header: Some(file_header),
            legacy: false,
            records,
            dictionary_xml,
            first_event,
            cursor: None,
            cached: None,
        })
    }

    fn from_legacy_bytes(buffer: Vec<u8>, options: ReaderOptions, start: usize) -> Result<Reader> {
        let (first_block, order) = BlockHeaderV4::read(&buffer, start, Endian::NATIVE)?;
        let mut records = scan_legacy_blocks(&buffer, order, start, options.check_block_sequence)?;

        let mut dictionary_xml = None;
        let mut first_event = None;
        if let Some(first) = records.first_mut() {
            if first_block.has_dictionary() && first.event_count > 0 {
                let w0 = order.read_u32(&buffer[first.position..first.position + 4]);
                let len = ((w0 + 1) * 4) as usize;
                let text = &buffer[first.position + 8..first.position + len];
                let nul = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                dictionary_xml = Some(String::from_utf8_lossy(&text[..nul]).into_owned());
                first.position += len;
                first.event_count -= 1;
            }
            if first_block.has_first_event() && first.event_count > 0 {
                let w0 = order.read_u32(&buffer[first.position..first.position + 4]);
                let len = ((w0 + 1) * 4) as usize;
                first_event = Some(buffer[first.position..first.position + len].to_vec());
            }
        }

        Ok(Reader {
            buffer,
            order,
            options,
            file_header: None,
            legacy: true,
            records,
            dictionary_xml,
            first_event,
            cursor: None,
            cached: None,
        })
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn dictionary_xml(&self) -> Option<&str> {
        self.dictionary_xml.as_deref()
    }

    pub fn first_event(&self) -> Option<&[u8]> {
        self.first_event.as_deref()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn event_count(&self) -> usize {
        self.records.iter().map(|r| r.event_count as usize).sum()
    }

    /// The buffer as it currently stands, including any edits applied by
    /// `remove_structure`/`add_structure`.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn locate_event(&self, index: usize) -> Result<(usize, usize)> {
        let mut remaining = index;
        for (record_idx, entry) in self.records.iter().enumerate() {
            let count = entry.event_count as usize;
            if remaining < count {
                return Ok((record_idx, remaining));
            }
            remaining -= count;
        }
        Err(EvioError::IndexOutOfRange { index, limit: self.event_count() })
    }

    fn legacy_event_offsets(&self, record_idx: usize) -> Vec<usize> {
        let entry = &self.records[record_idx];
        let mut offsets = Vec::with_capacity(entry.event_count as usize);
        let mut pos = entry.position;
        for _ in 0..entry.event_count {
            offsets.push(pos);
            let w0 = self.order.read_u32(&self.buffer[pos..pos + 4]);
            pos += ((w0 + 1) * 4) as usize;
        }
        offsets
    }

    /// Event `index`, 0-based across the whole file/buffer. Updates the
    /// cursor used by [`Reader::next_event`]/[`Reader::previous_event`].
    pub fn event(&mut self, index: usize) -> Result<Vec<u8>> {
        let (record_idx, local) = self.locate_event(index)?;
        let bytes = if self.legacy {
            let offsets = self.legacy_event_offsets(record_idx);
            let start = offsets[local];
            let w0 = self.order.read_u32(&self.buffer[start..start + 4]);
            let len = ((w0 + 1) * 4) as usize;
            self.buffer[start..start + len].to_vec()
        } else {
            let entry = self.records[record_idx].clone();
            if self.cached.as_ref().map(|(i, _)| *i) != Some(record_idx) {
                let input = RecordInput::parse(&self.buffer, entry.position, self.order)?;
                self.cached = Some((record_idx, input));
            }
            let (_, input) = self.cached.as_ref().expect("just populated above");
            input.event(local)?
        };
        self.cursor = Some(index);
        Ok(bytes)
    }

    /// 1-based legacy-style accessor: `event_legacy(1)` is `event(0)`.
    pub fn event_legacy(&mut self, one_based: usize) -> Result<Vec<u8>> {
        if one_based == 0 {
            return Err(EvioError::IndexOutOfRange { index: 0, limit: self.event_count() });
        }
        self.event(one_based - 1)
    }

    /// Next event after the cursor left by the last `event`/`next_event`/
    /// `previous_event` call, or the first event if nothing has been read
    /// yet. `None` past the last event.
    pub fn next_event(&mut self) -> Result<Option<Vec<u8>>> {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.event_count() {
            return Ok(None);
        }
        Ok(Some(self.event(next)?))
    }

    pub fn previous_event(&mut self) -> Result<Option<Vec<u8>>> {
        match self.cursor {
            None | Some(0) => Ok(None),
            Some(i) => Ok(Some(self.event(i - 1)?)),
        }
    }

    fn record_header_at(&self, record_idx: usize) -> Result<RecordHeader> {
        let position = self.records[record_idx].position;
        let (header, _) = RecordHeader::read(&self.buffer, position, self.order)?;
        Ok(header)
    }

    fn payload_bounds(&self, record_idx: usize, header: &RecordHeader) -> (usize, usize) {
        let position = self.records[record_idx].position;
        let index_bytes = header.index_length as usize;
        let user_header_bytes = header.user_header_length as usize + header.bit_info.user_header_pad as usize;
        let payload_start = position + HEADER_SIZE_BYTES + index_bytes + user_header_bytes;
        (position, payload_start)
    }

    fn event_offsets_within_record(&self, record_idx: usize, header: &RecordHeader, payload_start: usize) -> Vec<usize> {
        let record_position = self.records[record_idx].position;
        let index_bytes = header.index_length as usize;
        let mut offsets = Vec::with_capacity(header.entries as usize);
        if index_bytes > 0 {
            let index_start = record_position + HEADER_SIZE_BYTES;
            let mut pos = 0usize;
            for chunk in self.buffer[index_start..index_start + index_bytes].chunks_exact(4) {
                offsets.push(pos);
                pos += self.order.read_u32(chunk) as usize;
            }
        } else {
            let mut pos = 0usize;
            for _ in 0..header.entries {
                let w0 = self.order.read_u32(&self.buffer[payload_start + pos..payload_start + pos + 4]);
                offsets.push(pos);
                pos += ((w0 + 1) * 4) as usize;
            }
        }
        offsets
    }

    /// Build a fresh structure arena for one record's events. Decompresses
    /// the record's payload if needed; the returned index's node positions
    /// are relative to that payload, i.e. `payload_start` in this record.
    pub fn node_index_for_record(&self, record_idx: usize) -> Result<NodeIndex> {
        let header = self.record_header_at(record_idx)?;
        let (record_position, payload_start) = self.payload_bounds(record_idx, &header);
        let region_len = (header.compressed_data_length_words * 4) as usize;
        let region = self
            .buffer
            .get(payload_start..payload_start + region_len)
            .ok_or(EvioError::Underflow { position: payload_start, requested: region_len, limit: self.buffer.len() })?;
        let true_len = region_len.saturating_sub(header.bit_info.compressed_pad as usize);
        let payload = crate::compression::decompress(header.compression_type, &region[..true_len], header.uncompressed_data_length as usize)?;
        let offsets = self.event_offsets_within_record(record_idx, &header, payload_start);
        NodeIndex::scan(payload, self.order, &offsets, record_position)
    }

    /// Remove `node` (and everything nested under it) from the record it
    /// belongs to, shifting every later byte down and fixing up the length
    /// words of every ancestor, the record header, and the record table.
    /// Fails [`EvioError::CompressedEditForbidden`] if the record is
    /// compressed. Invalidates every `NodeRef` issued by `index`; the caller
    /// must re-scan with [`Reader::node_index_for_record`] to keep browsing.
    ///
    /// Does not rewrite the file-level trailer index, if one was used to
    /// build the record table; re-open with `force_scan` after persisting an
    /// edited buffer to pick up accurate positions. Removing an entire
    /// top-level event similarly leaves a zeroed, uncompacted slot in the
    /// record's own event-index array rather than shrinking it; re-open with
    /// `force_scan` for a fully compacted table.
    pub fn remove_structure(&mut self, record_idx: usize, index: &mut NodeIndex, node: NodeRef) -> Result<()> {
        let desc = index.node(node)?.clone();
        let mut header = self.record_header_at(record_idx)?;
        if header.compression_type != CompressionType::None {
            return Err(EvioError::CompressedEditForbidden);
        }
        let (record_position, payload_start) = self.payload_bounds(record_idx, &header);
        let total_words = desc.length_words;
        let total_bytes = (total_words * 4) as usize;
        let abs_start = payload_start + desc.position;
        let abs_end = abs_start + total_bytes;

        self.buffer.drain(abs_start..abs_end);

        let mut current = desc.parent_index;
        while let Some(anc_idx) = current {
            let anc = index
                .descriptor_at(anc_idx)
                .ok_or(EvioError::IndexOutOfRange { index: anc_idx, limit: 0 })?
                .clone();
            let anc_abs = payload_start + anc.position;
            match anc.kind {
                StructureKind::Bank => {
                    let old = self.order.read_u32(&self.buffer[anc_abs..anc_abs + 4]);
                    self.order.write_u32(&mut self.buffer[anc_abs..anc_abs + 4], old - total_words);
                }
                StructureKind::Segment | StructureKind::TagSegment => {
                    let old = self.order.read_u32(&self.buffer[anc_abs..anc_abs + 4]);
                    let old_len16 = old & 0xFFFF;
                    let new_word = (old & 0xFFFF_0000) | ((old_len16 - total_words) & 0xFFFF);
                    self.order.write_u32(&mut self.buffer[anc_abs..anc_abs + 4], new_word);
                }
            }
            current = anc.parent_index;
        }

        if header.index_length > 0 {
            let index_abs = record_position + HEADER_SIZE_BYTES + (desc.event_place * 4);
            let old_len = self.order.read_u32(&self.buffer[index_abs..index_abs + 4]);
            self.order.write_u32(&mut self.buffer[index_abs..index_abs + 4], old_len - total_bytes as u32);
        }

        if desc.parent_index.is_none() {
            header.entries = header.entries.saturating_sub(1);
            self.records[record_idx].event_count = self.records[record_idx].event_count.saturating_sub(1);
        }
        header.record_length_words -= total_words;
        header.uncompressed_data_length -= total_bytes as u32;
        header.compressed_data_length_words -= total_words;
        let mut hbuf = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut hbuf, 0, self.order)?;
        self.buffer[record_position..record_position + HEADER_SIZE_BYTES].copy_from_slice(&hbuf);

        self.records[record_idx].length_words -= total_words;
        self.shift_positions_after(abs_start, -(total_bytes as i64), record_idx);
        self.cached = None;
        index.bump_generation();
        Ok(())
    }

    /// Append `bytes` (already in `source_order`, word-aligned) to the end
    /// of event `event_index`'s data, growing its own length word and the
    /// containing record's header. Fails [`EvioError::BadAlignment`] if
    /// `bytes` isn't a multiple of 4 long, [`EvioError::WrongEndianness`] if
    /// `source_order` disagrees with the reader's detected order, and
    /// [`EvioError::CompressedEditForbidden`] if the record is compressed.
    pub fn add_structure(&mut self, event_index: usize, bytes: &[u8], source_order: Endian) -> Result<()> {
        if bytes.len() % 4 != 0 {
            return Err(EvioError::BadAlignment(bytes.len()));
        }
        if source_order != self.order {
            return Err(EvioError::WrongEndianness(source_order, self.order));
        }
        let (record_idx, local) = self.locate_event(event_index)?;
        let mut header = self.record_header_at(record_idx)?;
        if header.compression_type != CompressionType::None {
            return Err(EvioError::CompressedEditForbidden);
        }
        let (record_position, payload_start) = self.payload_bounds(record_idx, &header);
        let offsets = self.event_offsets_within_record(record_idx, &header, payload_start);
        let event_pos = *offsets.get(local).ok_or(EvioError::IndexOutOfRange { index: local, limit: offsets.len() })?;
        let event_abs = payload_start + event_pos;
        let w0 = self.order.read_u32(&self.buffer[event_abs..event_abs + 4]);
        let old_total_bytes = ((w0 + 1) * 4) as usize;
        let insert_abs = event_abs + old_total_bytes;

        self.buffer.splice(insert_abs..insert_abs, bytes.iter().copied());

        let added_words = (bytes.len() / 4) as u32;
        self.order.write_u32(&mut self.buffer[event_abs..event_abs + 4], w0 + added_words);

        if header.index_length > 0 {
            let index_abs = record_position + HEADER_SIZE_BYTES + (local * 4);
            let old_len = self.order.read_u32(&self.buffer[index_abs..index_abs + 4]);
            self.order.write_u32(&mut self.buffer[index_abs..index_abs + 4], old_len + bytes.len() as u32);
        }

        header.record_length_words += added_words;
        header.uncompressed_data_length += bytes.len() as u32;
        header.compressed_data_length_words += added_words;
        let mut hbuf = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut hbuf, 0, self.order)?;
        self.buffer[record_position..record_position + HEADER_SIZE_BYTES].copy_from_slice(&hbuf);

        self.records[record_idx].length_words += added_words;
        self.shift_positions_after(insert_abs, bytes.len() as i64, record_idx);
        self.cached = None;
        Ok(())
    }

    fn shift_positions_after(&mut self, threshold: usize, delta: i64, skip: usize) {
        for (i, entry) in self.records.iter_mut().enumerate() {
            if i != skip && entry.position > threshold {
                entry.position = (entry.position as i64 + delta) as usize;
            }
        }
        if let Some(fh) = &mut self.file_header {
            if fh.trailer_position as usize > threshold {
                fh.trailer_position = (fh.trailer_position as i64 + delta) as u64;
            }
        }
    }
}

fn scan_records(buffer: &[u8], order: Endian, mut pos: usize) -> Result<Vec<RecordEntry>> {
    let mut out = Vec::new();
    while pos < buffer.len() {
        let (header, _) = RecordHeader::read(buffer, pos, order)?;
        let is_trailer = header.bit_info.header_type.is_trailer();
        if !is_trailer {
            out.push(RecordEntry { position: pos, length_words: header.record_length_words, event_count: header.entries });
        }
        pos += (header.record_length_words * 4) as usize;
        if is_trailer {
            break;
        }
    }
    Ok(out)
}

fn records_from_index_pairs(buffer: &[u8], order: Endian, pairs_start: usize, pairs_len: usize, data_start: usize) -> Result<Vec<RecordEntry>> {
    let mut out = Vec::new();
    let mut pos = data_start;
    let pairs = buffer
        .get(pairs_start..pairs_start + pairs_len)
        .ok_or(EvioError::Underflow { position: pairs_start, requested: pairs_len, limit: buffer.len() })?;
    for chunk in pairs.chunks_exact(8) {
        let length_words = order.read_u32(&chunk[0..4]);
        let event_count = order.read_u32(&chunk[4..8]);
        out.push(RecordEntry { position: pos, length_words, event_count });
        pos += (length_words * 4) as usize;
    }
    Ok(out)
}

fn scan_legacy_blocks(buffer: &[u8], order: Endian, mut pos: usize, check_sequence: bool) -> Result<Vec<RecordEntry>> {
    let mut out = Vec::new();
    let mut expected_number = None;
    loop {
        if pos + LEGACY_HEADER_SIZE_BYTES > buffer.len() {
            break;
        }
        let (block, _) = BlockHeaderV4::read(buffer, pos, order)?;
        if check_sequence {
            if let Some(expected) = expected_number {
                if block.block_number != expected {
                    return Err(EvioError::BlockNumberOutOfSequence { expected, found: block.block_number });
                }
            }
            expected_number = Some(block.block_number + 1);
        }
        let data_start = pos + (block.header_length as usize) * 4;
        out.push(RecordEntry { position: data_start, length_words: block.block_size - block.header_length, event_count: block.event_count });
        let is_last = block.is_last_block();
        pos += (block.block_size as usize) * 4;
        if is_last {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteCursor;
    use crate::tree::{PrimitiveArray, Structure};
    use crate::types::DataType;
    use crate::writer::{Writer, WriterOptions};
    use std::io::Cursor;

    fn encode_event(tag: u16, num: u8, values: Vec<i32>) -> Vec<u8> {
        let mut bank = Structure::new_bank(tag, num, DataType::Int32);
        bank.set_primitives(PrimitiveArray::Int32(values)).unwrap();
        let mut cursor = ByteCursor::with_capacity(64);
        cursor.set_order(Endian::Big);
        bank.write(&mut cursor).unwrap();
        cursor.flip();
        cursor.as_slice().to_vec()
    }

    fn write_file(events: &[Vec<u8>], options: WriterOptions) -> Vec<u8> {
        let mut writer = Writer::new(Cursor::new(Vec::new()), Endian::Big, options);
        for e in events {
            writer.write_event(e).unwrap();
        }
        writer.close().unwrap();
        writer.into_sink().into_inner()
    }

    #[test]
    fn sequential_and_random_access_share_a_cursor() {
        let events = vec![encode_event(1, 0, vec![1]), encode_event(2, 0, vec![2]), encode_event(3, 0, vec![3])];
        let bytes = write_file(&events, WriterOptions::default());
        let mut reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();

        assert_eq!(reader.event_count(), 3);
        let got = reader.event(0).unwrap();
        assert_eq!(got, events[0]);
        let next = reader.next_event().unwrap().unwrap();
        assert_eq!(next, events[1]);

        reader.event(2).unwrap();
        let after_random = reader.next_event().unwrap();
        assert!(after_random.is_none());
        reader.event(0).unwrap();
        assert_eq!(reader.next_event().unwrap().unwrap(), events[1]);
    }

    #[test]
    fn reads_compressed_records() {
        let events = vec![encode_event(9, 1, vec![100; 20])];
        let mut options = WriterOptions::default();
        options.compression = CompressionType::Gzip;
        let bytes = write_file(&events, options);
        let mut reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();
        assert_eq!(reader.event(0).unwrap(), events[0]);
    }

    #[test]
    fn dictionary_and_first_event_round_trip_through_file_header() {
        let first = encode_event(99, 0, vec![0]);
        let event = encode_event(1, 0, vec![7]);
        let mut writer = Writer::new(Cursor::new(Vec::new()), Endian::Big, WriterOptions::default())
            .with_dictionary("<xmlDict/>".to_string())
            .with_first_event(first);
        writer.write_event(&event).unwrap();
        writer.close().unwrap();
        let bytes = writer.into_sink().into_inner();

        let reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();
        assert_eq!(reader.dictionary_xml(), Some("<xmlDict/>"));
        assert!(reader.first_event().is_some());
    }

    #[test]
    fn force_scan_matches_trailer_index() {
        let events = vec![encode_event(1, 0, vec![1]), encode_event(2, 0, vec![2])];
        let bytes = write_file(&events, WriterOptions::default());
        let indexed = Reader::from_file_bytes(bytes.clone(), ReaderOptions::default()).unwrap();
        let scanned = Reader::from_file_bytes(bytes, ReaderOptions { force_scan: true, ..Default::default() }).unwrap();
        assert_eq!(indexed.event_count(), scanned.event_count());
        assert_eq!(indexed.records.len(), scanned.records.len());
    }

    #[test]
    fn remove_structure_shrinks_event_and_record() {
        let mut outer = Structure::new_bank(1, 0, DataType::Bank);
        let mut child_a = Structure::new_bank(2, 0, DataType::Int32);
        child_a.set_primitives(PrimitiveArray::Int32(vec![1, 2])).unwrap();
        let mut child_b = Structure::new_bank(3, 0, DataType::Int32);
        child_b.set_primitives(PrimitiveArray::Int32(vec![3, 4, 5])).unwrap();
        outer.push_child(child_a).unwrap();
        outer.push_child(child_b).unwrap();
        let mut cursor = ByteCursor::with_capacity(128);
        cursor.set_order(Endian::Big);
        outer.write(&mut cursor).unwrap();
        cursor.flip();
        let event_bytes = cursor.as_slice().to_vec();

        let bytes = write_file(&[event_bytes], WriterOptions::default());
        let mut reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();
        let before_len = reader.buffer().len();

        let mut index = reader.node_index_for_record(0).unwrap();
        let root = index.extract_event_node(0).unwrap();
        let children = index.children(root).unwrap();
        let removed_child = children[0];
        let removed_bytes = index.node(removed_child).unwrap().length_words * 4;

        reader.remove_structure(0, &mut index, removed_child).unwrap();
        assert_eq!(reader.buffer().len(), before_len - removed_bytes as usize);
        assert!(matches!(index.node(removed_child), Err(EvioError::StaleReference)));

        let remaining = reader.event(0).unwrap();
        let mut parse_cursor = ByteCursor::wrap(remaining);
        parse_cursor.set_order(Endian::Big);
        let reparsed = Structure::parse_bank(&mut parse_cursor).unwrap();
        let remaining_children = reparsed.children().unwrap();
        assert_eq!(remaining_children.len(), 1);
        assert_eq!(remaining_children[0].tag, 3);
    }

    #[test]
    fn compressed_record_forbids_edit() {
        let events = vec![encode_event(1, 0, vec![1; 10])];
        let mut options = WriterOptions::default();
        options.compression = CompressionType::Gzip;
        let bytes = write_file(&events, options);
        let reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();
        let mut index = reader.node_index_for_record(0).unwrap();
        let root = index.extract_event_node(0).unwrap();
        let mut reader = reader;
        let err = reader.remove_structure(0, &mut index, root);
        assert!(matches!(err, Err(EvioError::CompressedEditForbidden)));
    }

    #[test]
    fn add_structure_grows_event_and_rejects_misaligned_input() {
        let events = vec![encode_event(1, 0, vec![1])];
        let bytes = write_file(&events, WriterOptions::default());
        let mut reader = Reader::from_file_bytes(bytes, ReaderOptions::default()).unwrap();

        let bad = reader.add_structure(0, &[0, 0, 0], Endian::Big);
        assert!(matches!(bad, Err(EvioError::BadAlignment(3))));

        let wrong_order = reader.add_structure(0, &[0, 0, 0, 0], Endian::Little);
        assert!(matches!(wrong_order, Err(EvioError::WrongEndianness(_, _))));

        let new_child = encode_event(5, 0, vec![42]);
        reader.add_structure(0, &new_child, Endian::Big).unwrap();
        let grown = reader.event(0).unwrap();
        assert!(grown.len() > events[0].len());
    }
}
