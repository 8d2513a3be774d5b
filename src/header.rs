//! Record / file header codec: layout, bit-info packing, magic/endian
//! autodetection, and the legacy (v1-4) block header.

use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::types::{CompressionType, EventType, HeaderType};

/// Magic word present in every record/file header, used to autodetect byte order.
pub const HEADER_MAGIC: u32 = 0xC0DA_0100;
/// "EVIO" in big-endian bytes: the file header's own identifying word.
pub const FILE_UNIQUE_WORD: u32 = 0x4556_494F;

pub const HEADER_SIZE_WORDS: u32 = 14;
pub const HEADER_SIZE_BYTES: usize = 56;

const RECORD_LENGTH_OFFSET: usize = 0;
const RECORD_NUMBER_OFFSET: usize = 4;
const HEADER_LENGTH_OFFSET: usize = 8;
const ENTRIES_OFFSET: usize = 12;
const INDEX_LENGTH_OFFSET: usize = 16;
const BIT_INFO_OFFSET: usize = 20;
const USER_LENGTH_OFFSET: usize = 24;
const MAGIC_OFFSET: usize = 28;
const UNCOMPRESSED_LENGTH_OFFSET: usize = 32;
const COMPRESSION_OFFSET: usize = 36;
const REGISTER1_OFFSET: usize = 40;
const REGISTER2_OFFSET: usize = 48;

/// Number of bytes needed to pad `len` bytes of `width`-byte-wide elements to
/// a 4-byte boundary, per the padding invariant in the spec: 8-bit data pads
/// `(4 - len%4)%4`, 16-bit data pads `2*(len%2)`, everything else is already
/// word-aligned.
pub fn padding_for_len(len: usize, width: usize) -> usize {
    match width {
        1 => (4 - len % 4) % 4,
        2 => 2 * (len % 2),
        _ => 0,
    }
}

/// Round a byte length up to the nearest whole 32-bit word count.
pub fn words_for_bytes(len: usize) -> u32 {
    ((len + 3) / 4) as u32
}

/// Decoded contents of a header's bit-info + version word (word 5/6 in the spec table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitInfo {
    pub version: u8,
    pub header_type: HeaderType,
    pub has_dictionary: bool,
    pub has_first_event: bool,
    /// For a record header: "this is the last record". For a file header:
    /// "the trailer carries a record index". Same bit, context-dependent
    /// meaning, matching the original format.
    pub is_last_or_has_trailer_index: bool,
    pub event_type: EventType,
    pub user_header_pad: u8,
    pub data_pad: u8,
    pub compressed_pad: u8,
}

#[allow(clippy::too_many_arguments)]
pub fn pack_bit_info(
    header_type: HeaderType,
    version: u8,
    has_dictionary: bool,
    has_first_event: bool,
    is_last_or_has_trailer_index: bool,
    user_header_pad: u8,
    data_pad: u8,
    compressed_pad: u8,
    event_type: EventType,
) -> u32 {
    let mut word = version as u32;
    if has_dictionary {
        word |= 1 << 8;
    }
    if has_first_event {
        word |= 1 << 9;
    }
    if is_last_or_has_trailer_index {
        word |= 1 << 10;
    }
    word |= (event_type.to_code() & 0xF) << 11;
    word |= ((user_header_pad & 0x3) as u32) << 20;
    word |= ((data_pad & 0x3) as u32) << 22;
    word |= ((compressed_pad & 0x3) as u32) << 24;
    word |= (header_type.to_bits() & 0xF) << 28;
    word
}

pub fn unpack_bit_info(word: u32) -> Result<BitInfo> {
    Ok(BitInfo {
        version: (word & 0xFF) as u8,
        header_type: HeaderType::from_bits((word >> 28) & 0xF)?,
        has_dictionary: word & (1 << 8) != 0,
        has_first_event: word & (1 << 9) != 0,
        is_last_or_has_trailer_index: word & (1 << 10) != 0,
        event_type: EventType::from_code((word >> 11) & 0xF),
        user_header_pad: ((word >> 20) & 0x3) as u8,
        data_pad: ((word >> 22) & 0x3) as u8,
        compressed_pad: ((word >> 24) & 0x3) as u8,
    })
}

/// A 56-byte record header (14 32-bit words).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub record_length_words: u32,
    pub record_number: u32,
    pub header_length_words: u32,
    pub entries: u32,
    pub index_length: u32,
    pub bit_info: BitInfo,
    pub user_header_length: u32,
    pub uncompressed_data_length: u32,
    pub compression_type: CompressionType,
    pub compressed_data_length_words: u32,
    pub user_register_1: u64,
    pub user_register_2: u64,
}

impl Default for RecordHeader {
    fn default() -> Self {
        RecordHeader {
            record_length_words: HEADER_SIZE_WORDS,
            record_number: 1,
            header_length_words: HEADER_SIZE_WORDS,
            entries: 0,
            index_length: 0,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioRecord,
                has_dictionary: false,
                has_first_event: false,
                is_last_or_has_trailer_index: false,
                event_type: EventType::RocRaw,
                user_header_pad: 0,
                data_pad: 0,
                compressed_pad: 0,
            },
            user_header_length: 0,
            uncompressed_data_length: 0,
            compression_type: CompressionType::None,
            compressed_data_length_words: 0,
            user_register_1: 0,
            user_register_2: 0,
        }
    }
}

/// Detect byte order by checking the magic word at `offset + MAGIC_OFFSET`,
/// trying the opposite endianness if the first guess doesn't match, and
/// failing `BadMagic` if neither does.
fn detect_order(bytes: &[u8], offset: usize, guess: Endian) -> Result<Endian> {
    let pos = offset + MAGIC_OFFSET;
    if pos + 4 > bytes.len() {
        return Err(EvioError::Underflow { position: pos, requested: 4, limit: bytes.len() });
    }
    let raw = &bytes[pos..pos + 4];
    let as_guess = guess.read_u32(raw);
    if as_guess == HEADER_MAGIC {
        return Ok(guess);
    }
    let swapped = guess.opposite();
    let as_swapped = swapped.read_u32(raw);
    if as_swapped == HEADER_MAGIC {
        return Ok(swapped);
    }
    Err(EvioError::BadMagic { found: as_guess, swapped: as_swapped })
}

impl RecordHeader {
    /// Read a record header at `offset`, autodetecting byte order starting
    /// from `guess` (typically `Endian::NATIVE` or the file's known order).
    pub fn read(bytes: &[u8], offset: usize, guess: Endian) -> Result<(RecordHeader, Endian)> {
        let order = detect_order(bytes, offset, guess)?;
        let need = offset + HEADER_SIZE_BYTES;
        if need > bytes.len() {
            return Err(EvioError::Underflow { position: offset, requested: HEADER_SIZE_BYTES, limit: bytes.len() });
        }
        let w = |off: usize| order.read_u32(&bytes[offset + off..offset + off + 4]);

        let record_length_words = w(RECORD_LENGTH_OFFSET);
        let record_number = w(RECORD_NUMBER_OFFSET);
        let header_length_words = w(HEADER_LENGTH_OFFSET);
        let entries = w(ENTRIES_OFFSET);
        let index_length = w(INDEX_LENGTH_OFFSET);
        let bit_info = unpack_bit_info(w(BIT_INFO_OFFSET))?;
        if bit_info.version < 6 {
            return Err(EvioError::UnsupportedVersion(bit_info.version as u32));
        }
        if header_length_words < HEADER_SIZE_WORDS {
            return Err(EvioError::BadFormat(format!(
                "record header length {header_length_words} words is below the minimum {HEADER_SIZE_WORDS}"
            )));
        }
        if index_length > 0 && entries > 0 && index_length as usize != 4 * entries as usize {
            return Err(EvioError::BadFormat(format!(
                "record index length {index_length} bytes is inconsistent with {entries} entries"
            )));
        }
        let user_header_length = w(USER_LENGTH_OFFSET);
        let uncompressed_data_length = w(UNCOMPRESSED_LENGTH_OFFSET);
        let comp_word = w(COMPRESSION_OFFSET);
        let compression_type = CompressionType::from_bits(comp_word >> 28)?;
        let compressed_data_length_words = comp_word & 0x0FFF_FFFF;
        let user_register_1 = order.read_u64(&bytes[offset + REGISTER1_OFFSET..offset + REGISTER1_OFFSET + 8]);
        let user_register_2 = order.read_u64(&bytes[offset + REGISTER2_OFFSET..offset + REGISTER2_OFFSET + 8]);

        Ok((
            RecordHeader {
                record_length_words,
                record_number,
                header_length_words,
                entries,
                index_length,
                bit_info,
                user_header_length,
                uncompressed_data_length,
                compression_type,
                compressed_data_length_words,
                user_register_1,
                user_register_2,
            },
            order,
        ))
    }

    pub fn write(&self, dst: &mut [u8], offset: usize, order: Endian) -> Result<()> {
        if offset + HEADER_SIZE_BYTES > dst.len() {
            return Err(EvioError::Overflow { position: offset, requested: HEADER_SIZE_BYTES, limit: dst.len() });
        }
        let bit_info_word = pack_bit_info(
            self.bit_info.header_type,
            self.bit_info.version,
            self.bit_info.has_dictionary,
            self.bit_info.has_first_event,
            self.bit_info.is_last_or_has_trailer_index,
            self.bit_info.user_header_pad,
            self.bit_info.data_pad,
            self.bit_info.compressed_pad,
            self.bit_info.event_type,
        );
        let comp_word = (self.compression_type.to_bits() << 28) | (self.compressed_data_length_words & 0x0FFF_FFFF);

        order.write_u32(&mut dst[offset + RECORD_LENGTH_OFFSET..], self.record_length_words);
        order.write_u32(&mut dst[offset + RECORD_NUMBER_OFFSET..], self.record_number);
        order.write_u32(&mut dst[offset + HEADER_LENGTH_OFFSET..], self.header_length_words);
        order.write_u32(&mut dst[offset + ENTRIES_OFFSET..], self.entries);
        order.write_u32(&mut dst[offset + INDEX_LENGTH_OFFSET..], self.index_length);
        order.write_u32(&mut dst[offset + BIT_INFO_OFFSET..], bit_info_word);
        order.write_u32(&mut dst[offset + USER_LENGTH_OFFSET..], self.user_header_length);
        order.write_u32(&mut dst[offset + MAGIC_OFFSET..], HEADER_MAGIC);
        order.write_u32(&mut dst[offset + UNCOMPRESSED_LENGTH_OFFSET..], self.uncompressed_data_length);
        order.write_u32(&mut dst[offset + COMPRESSION_OFFSET..], comp_word);
        order.write_u64(&mut dst[offset + REGISTER1_OFFSET..], self.user_register_1);
        order.write_u64(&mut dst[offset + REGISTER2_OFFSET..], self.user_register_2);
        Ok(())
    }

    /// Static predicate: does the record at `offset` claim a non-zero compression type?
    pub fn is_compressed(bytes: &[u8], offset: usize, order: Endian) -> Result<bool> {
        if offset + COMPRESSION_OFFSET + 4 > bytes.len() {
            return Err(EvioError::Underflow { position: offset, requested: COMPRESSION_OFFSET + 4, limit: bytes.len() });
        }
        let comp_word = order.read_u32(&bytes[offset + COMPRESSION_OFFSET..offset + COMPRESSION_OFFSET + 4]);
        Ok((comp_word >> 28) != 0)
    }

    pub fn set_bit_info_event_type(&mut self, code: u32) {
        self.bit_info.event_type = EventType::from_code(code);
    }

    pub fn is_last_record(&self) -> bool {
        self.bit_info.is_last_or_has_trailer_index
    }

    /// Build a trailer record header: `header_type = EvioTrailer`, no
    /// payload, an optional index of `2*record_count` 32-bit words.
    pub fn trailer(record_number: u32, order: Endian, record_count: Option<u32>) -> (RecordHeader, Vec<u8>) {
        let index_words = record_count.map(|n| 2 * n).unwrap_or(0);
        let index_bytes = (index_words * 4) as u32;
        let total_words = HEADER_SIZE_WORDS + index_words;
        let header = RecordHeader {
            record_length_words: total_words,
            record_number,
            header_length_words: HEADER_SIZE_WORDS,
            entries: 0,
            index_length: index_bytes,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioTrailer,
                has_dictionary: false,
                has_first_event: false,
                is_last_or_has_trailer_index: true,
                event_type: EventType::Control,
                user_header_pad: 0,
                data_pad: 0,
                compressed_pad: 0,
            },
            user_header_length: 0,
            uncompressed_data_length: 0,
            compression_type: CompressionType::None,
            compressed_data_length_words: 0,
            user_register_1: 0,
            user_register_2: 0,
        };
        let mut out = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut out, 0, order).expect("fixed-size buffer");
        (header, out)
    }
}

/// File header: same 56-byte footprint as a record header, different field semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub unique_word: u32,
    pub split_number: u32,
    pub header_length_words: u32,
    pub record_count: u32,
    pub index_length: u32,
    pub bit_info: BitInfo,
    pub user_header_length: u32,
    pub trailer_position: u64,
    pub user_int_1: u32,
    pub user_int_2: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader {
            unique_word: FILE_UNIQUE_WORD,
            split_number: 0,
            header_length_words: HEADER_SIZE_WORDS,
            record_count: 0,
            index_length: 0,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioRecord,
                has_dictionary: false,
                has_first_event: false,
                is_last_or_has_trailer_index: false,
                event_type: EventType::RocRaw,
                user_header_pad: 0,
                data_pad: 0,
                compressed_pad: 0,
            },
            user_header_length: 0,
            trailer_position: 0,
            user_int_1: 0,
            user_int_2: 0,
        }
    }
}

impl FileHeader {
    pub fn read(bytes: &[u8], offset: usize, guess: Endian) -> Result<(FileHeader, Endian)> {
        let order = detect_order(bytes, offset, guess)?;
        if offset + HEADER_SIZE_BYTES > bytes.len() {
            return Err(EvioError::Underflow { position: offset, requested: HEADER_SIZE_BYTES, limit: bytes.len() });
        }
        let w = |off: usize| order.read_u32(&bytes[offset + off..offset + off + 4]);
        let unique_word = w(RECORD_LENGTH_OFFSET);
        if unique_word != FILE_UNIQUE_WORD {
            return Err(EvioError::BadFormat(format!(
                "file header unique word {unique_word:#010x} does not match {FILE_UNIQUE_WORD:#010x}"
            )));
        }
        let split_number = w(RECORD_NUMBER_OFFSET);
        let header_length_words = w(HEADER_LENGTH_OFFSET);
        let record_count = w(ENTRIES_OFFSET);
        let index_length = w(INDEX_LENGTH_OFFSET);
        let bit_info = unpack_bit_info(w(BIT_INFO_OFFSET))?;
        if bit_info.version < 6 {
            return Err(EvioError::UnsupportedVersion(bit_info.version as u32));
        }
        let user_header_length = w(USER_LENGTH_OFFSET);
        let trailer_position = order.read_u64(&bytes[offset + UNCOMPRESSED_LENGTH_OFFSET..offset + UNCOMPRESSED_LENGTH_OFFSET + 8]);
        let user_int_1 = w(REGISTER1_OFFSET);
        let user_int_2 = w(REGISTER1_OFFSET + 4);

        Ok((
            FileHeader {
                unique_word,
                split_number,
                header_length_words,
                record_count,
                index_length,
                bit_info,
                user_header_length,
                trailer_position,
                user_int_1,
                user_int_2,
            },
            order,
        ))
    }

    pub fn write(&self, dst: &mut [u8], offset: usize, order: Endian) -> Result<()> {
        if offset + HEADER_SIZE_BYTES > dst.len() {
            return Err(EvioError::Overflow { position: offset, requested: HEADER_SIZE_BYTES, limit: dst.len() });
        }
        let bit_info_word = pack_bit_info(
            self.bit_info.header_type,
            self.bit_info.version,
            self.bit_info.has_dictionary,
            self.bit_info.has_first_event,
            self.bit_info.is_last_or_has_trailer_index,
            self.bit_info.user_header_pad,
            self.bit_info.data_pad,
            self.bit_info.compressed_pad,
            self.bit_info.event_type,
        );
        order.write_u32(&mut dst[offset + RECORD_LENGTH_OFFSET..], self.unique_word);
        order.write_u32(&mut dst[offset + RECORD_NUMBER_OFFSET..], self.split_number);
        order.write_u32(&mut dst[offset + HEADER_LENGTH_OFFSET..], self.header_length_words);
        order.write_u32(&mut dst[offset + ENTRIES_OFFSET..], self.record_count);
        order.write_u32(&mut dst[offset + INDEX_LENGTH_OFFSET..], self.index_length);
        order.write_u32(&mut dst[offset + BIT_INFO_OFFSET..], bit_info_word);
        order.write_u32(&mut dst[offset + USER_LENGTH_OFFSET..], self.user_header_length);
        order.write_u32(&mut dst[offset + MAGIC_OFFSET..], HEADER_MAGIC);
        order.write_u64(&mut dst[offset + UNCOMPRESSED_LENGTH_OFFSET..], self.trailer_position);
        order.write_u32(&mut dst[offset + REGISTER1_OFFSET..], self.user_int_1);
        order.write_u32(&mut dst[offset + REGISTER1_OFFSET + 4..], self.user_int_2);
        Ok(())
    }

    pub fn has_trailer_with_index(&self) -> bool {
        self.bit_info.is_last_or_has_trailer_index
    }
}

/// Legacy (evio v1-4) block header: 8 32-bit words, 32 bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeaderV4 {
    pub block_size: u32,
    pub block_number: u32,
    pub header_length: u32,
    pub event_count: u32,
    pub reserved1: u32,
    pub bit_info_version: u32,
    pub reserved2: u32,
    pub magic: u32,
}

pub const LEGACY_HEADER_SIZE_WORDS: u32 = 8;
pub const LEGACY_HEADER_SIZE_BYTES: usize = 32;

impl BlockHeaderV4 {
    pub fn version(&self) -> u8 {
        (self.bit_info_version & 0xFF) as u8
    }

    pub fn has_dictionary(&self) -> bool {
        self.bit_info_version & (1 << 9) != 0
    }

    pub fn is_last_block(&self) -> bool {
        self.bit_info_version & (1 << 10) != 0
    }

    pub fn has_first_event(&self) -> bool {
        self.bit_info_version & (1 << 15) != 0
    }

    pub fn event_type(&self) -> EventType {
        EventType::from_code((self.bit_info_version >> 11) & 0xF)
    }

    pub fn read(bytes: &[u8], offset: usize, guess: Endian) -> Result<(BlockHeaderV4, Endian)> {
        if offset + LEGACY_HEADER_SIZE_BYTES > bytes.len() {
            return Err(EvioError::Underflow {
                position: offset,
                requested: LEGACY_HEADER_SIZE_BYTES,
                limit: bytes.len(),
            });
        }
        let magic_pos = offset + 28;
        let raw = &bytes[magic_pos..magic_pos + 4];
        let order = if guess.read_u32(raw) == HEADER_MAGIC {
            guess
        } else if guess.opposite().read_u32(raw) == HEADER_MAGIC {
            guess.opposite()
        } else {
            return Err(EvioError::BadMagic {
                found: guess.read_u32(raw),
                swapped: guess.opposite().read_u32(raw),
            });
        };
        let w = |off: usize| order.read_u32(&bytes[offset + off..offset + off + 4]);
        let header = BlockHeaderV4 {
            block_size: w(0),
            block_number: w(4),
            header_length: w(8),
            event_count: w(12),
            reserved1: w(16),
            bit_info_version: w(20),
            reserved2: w(24),
            magic: w(28),
        };
        if header.version() >= 5 {
            return Err(EvioError::UnsupportedVersion(header.version() as u32));
        }
        Ok((header, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_law_matches_spec() {
        assert_eq!(padding_for_len(0, 1), 0);
        assert_eq!(padding_for_len(1, 1), 3);
        assert_eq!(padding_for_len(4, 1), 0);
        assert_eq!(padding_for_len(5, 1), 3);
        assert_eq!(padding_for_len(0, 2), 0);
        assert_eq!(padding_for_len(1, 2), 2);
        assert_eq!(padding_for_len(2, 2), 0);
        assert_eq!(padding_for_len(0, 4), 0);
    }

    #[test]
    fn bit_info_round_trip() {
        let word = pack_bit_info(
            HeaderType::EvioRecord,
            6,
            true,
            false,
            true,
            1,
            2,
            3,
            EventType::Physics,
        );
        let decoded = unpack_bit_info(word).unwrap();
        assert_eq!(decoded.version, 6);
        assert!(decoded.has_dictionary);
        assert!(!decoded.has_first_event);
        assert!(decoded.is_last_or_has_trailer_index);
        assert_eq!(decoded.user_header_pad, 1);
        assert_eq!(decoded.data_pad, 2);
        assert_eq!(decoded.compressed_pad, 3);
        assert_eq!(decoded.event_type, EventType::Physics);
        assert_eq!(decoded.header_type, HeaderType::EvioRecord);
    }

    #[test]
    fn record_header_round_trip_both_orders() {
        for order in [Endian::Big, Endian::Little] {
            let mut h = RecordHeader::default();
            h.record_length_words = 20;
            h.entries = 3;
            h.compression_type = CompressionType::Gzip;
            h.compressed_data_length_words = 7;
            h.user_register_1 = 0xDEAD_BEEF_1234_5678;
            let mut buf = vec![0u8; HEADER_SIZE_BYTES];
            h.write(&mut buf, 0, order).unwrap();
            let (parsed, detected) = RecordHeader::read(&buf, 0, Endian::NATIVE).unwrap();
            assert_eq!(detected, order);
            assert_eq!(parsed, h);
        }
    }

    #[test]
    fn magic_autodetect_flips_on_wrong_guess() {
        let h = RecordHeader::default();
        let mut buf = vec![0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, 0, Endian::Little).unwrap();
        let (_, order) = RecordHeader::read(&buf, 0, Endian::Big).unwrap();
        assert_eq!(order, Endian::Little);
    }

    #[test]
    fn bad_magic_after_corruption() {
        let h = RecordHeader::default();
        let mut buf = vec![0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, 0, Endian::Big).unwrap();
        buf[28] ^= 0xFF;
        let err = RecordHeader::read(&buf, 0, Endian::Big);
        assert!(matches!(err, Err(EvioError::BadMagic { .. })));
    }

    #[test]
    fn file_header_round_trip() {
        let mut fh = FileHeader::default();
        fh.record_count = 5;
        fh.trailer_position = 0x1234_5678_9ABC;
        fh.bit_info.is_last_or_has_trailer_index = true;
        let mut buf = vec![0u8; HEADER_SIZE_BYTES];
        fh.write(&mut buf, 0, Endian::Big).unwrap();
        let (parsed, order) = FileHeader::read(&buf, 0, Endian::NATIVE).unwrap();
        assert_eq!(order, Endian::Big);
        assert_eq!(parsed, fh);
        assert!(parsed.has_trailer_with_index());
    }

    #[test]
    fn trailer_has_correct_shape() {
        let (header, bytes) = RecordHeader::trailer(5, Endian::Big, Some(3));
        assert_eq!(header.bit_info.header_type, HeaderType::EvioTrailer);
        assert!(header.is_last_record());
        assert_eq!(header.entries, 0);
        assert_eq!(header.index_length, 24);
        assert_eq!(bytes.len(), HEADER_SIZE_BYTES);
    }

    #[test]
    fn rejects_version_below_6() {
        let mut buf = vec![0u8; HEADER_SIZE_BYTES];
        let mut h = RecordHeader::default();
        h.bit_info.version = 4;
        h.write(&mut buf, 0, Endian::Big).unwrap();
        let err = RecordHeader::read(&buf, 0, Endian::Big);
        assert!(matches!(err, Err(EvioError::UnsupportedVersion(4))));
    }
}
