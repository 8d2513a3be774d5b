//! Record-oriented writer: accumulates events into records, flushes each
//! record to the sink as it fills, and emits a trailer (with an optional
//! record index) on close.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::header::{FileHeader, BitInfo, RecordHeader, HEADER_SIZE_BYTES};
use crate::record_output::RecordOutput;
use crate::types::{CompressionType, EventType, HeaderType};

/// Tuning knobs for record accumulation and splitting. Defaults favor a
/// single, moderately sized output file with an uncompressed trailer index.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub compression: CompressionType,
    pub max_record_bytes: usize,
    pub max_record_events: u32,
    /// 0 disables splitting.
    pub split_threshold: u64,
    pub emit_trailer_index: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            compression: CompressionType::None,
            max_record_bytes: 8 * 1024 * 1024,
            max_record_events: 0,
            split_threshold: 0,
            emit_trailer_index: true,
        }
    }
}

/// Writes one evio file (or one split) to any `Write + Seek` sink.
pub struct Writer<W> {
    sink: W,
    order: Endian,
    options: WriterOptions,
    current_record: RecordOutput,
    record_index: Vec<(u32, u32)>,
    bytes_written: u64,
    record_number: u32,
    dictionary_xml: Option<String>,
    first_event: Option<Vec<u8>>,
    user_header: Vec<u8>,
    opened: bool,
    closed: bool,
    failed: Option<String>,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(sink: W, order: Endian, options: WriterOptions) -> Writer<W> {
        let current_record = RecordOutput::new(order, options.max_record_events, options.max_record_bytes);
        Writer {
            sink,
            order,
            options,
            current_record,
            record_index: Vec::new(),
            bytes_written: 0,
            record_number: 1,
            dictionary_xml: None,
            first_event: None,
            user_header: Vec::new(),
            opened: false,
            closed: false,
            failed: None,
        }
    }

    pub fn with_dictionary(mut self, xml: String) -> Self {
        self.dictionary_xml = Some(xml);
        self
    }

    pub fn with_first_event(mut self, event_bytes: Vec<u8>) -> Self {
        self.first_event = Some(event_bytes);
        self
    }

    pub fn with_user_header(mut self, bytes: Vec<u8>) -> Self {
        self.user_header = bytes;
        self
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Unwrap the writer, discarding its state. Mainly useful in tests that
    /// write to an in-memory sink and want the bytes back out.
    pub fn into_sink(self) -> W {
        self.sink
    }

    fn check_failed(&self) -> Result<()> {
        if let Some(msg) = &self.failed {
            return Err(EvioError::WriterFailed(msg.clone()));
        }
        Ok(())
    }

    fn fail(&mut self, err: EvioError) -> EvioError {
        self.failed = Some(err.to_string());
        err
    }

    fn file_header_user_bytes(&self) -> Vec<u8> {
        let mut out = self.user_header.clone();
        if let Some(xml) = &self.dictionary_xml {
            out.extend_from_slice(xml.as_bytes());
            out.push(0);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }
        if let Some(event) = &self.first_event {
            out.extend_from_slice(event);
        }
        out
    }

    /// Write the file header (and any dictionary/first-event user header
    /// bytes). Idempotent; `write_event` calls this automatically.
    pub fn open(&mut self) -> Result<()> {
        self.check_failed()?;
        if self.opened {
            return Ok(());
        }
        let user_bytes = self.file_header_user_bytes();
        let header = FileHeader {
            unique_word: crate::header::FILE_UNIQUE_WORD,
            split_number: 0,
            header_length_words: crate::header::HEADER_SIZE_WORDS,
            record_count: 0,
            index_length: 0,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioRecord,
                has_dictionary: self.dictionary_xml.is_some(),
                has_first_event: self.first_event.is_some(),
                is_last_or_has_trailer_index: false,
                event_type: EventType::RocRaw,
                user_header_pad: 0,
                data_pad: 0,
                compressed_pad: 0,
            },
            user_header_length: user_bytes.len() as u32,
            trailer_position: 0,
            user_int_1: 0,
            user_int_2: 0,
        };
        let mut header_bytes = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut header_bytes, 0, self.order).map_err(|e| self.fail(e))?;
        self.sink.write_all(&header_bytes).map_err(|e| self.fail(e.into()))?;
        self.sink.write_all(&user_bytes).map_err(|e| self.fail(e.into()))?;
        self.bytes_written = (HEADER_SIZE_BYTES + user_bytes.len()) as u64;
        self.opened = true;
        Ok(())
    }

    fn flush_current_record(&mut self) -> Result<()> {
        if self.current_record.is_empty() {
            return Ok(());
        }
        let bytes = self.current_record.build(self.options.compression).map_err(|e| self.fail(e))?;
        self.sink.write_all(&bytes).map_err(|e| self.fail(e.into()))?;
        self.record_index.push(((bytes.len() / 4) as u32, self.current_record.event_count() as u32));
        self.bytes_written += bytes.len() as u64;
        self.record_number += 1;
        self.current_record.reset();
        self.current_record.set_record_number(self.record_number);
        Ok(())
    }

    /// True once the current file has grown past the configured split
    /// threshold and has at least one complete record — the caller (see
    /// [`FileWriter`]) should roll over to a new file at the next event
    /// boundary.
    pub fn should_split(&self) -> bool {
        self.options.split_threshold != 0
            && self.bytes_written >= self.options.split_threshold
            && !self.record_index.is_empty()
    }

    /// Append one fully-serialized event (bank bytes, already word-aligned).
    pub fn write_event(&mut self, event_bytes: &[u8]) -> Result<()> {
        self.check_failed()?;
        self.open()?;
        loop {
            match self.current_record.add_event(event_bytes) {
                Ok(()) => {
                    if self.current_record.is_full() {
                        self.flush_current_record()?;
                    }
                    return Ok(());
                }
                Err(EvioError::RecordFull) => self.flush_current_record()?,
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Flush the last record, emit the trailer, and rewrite the file header
    /// with the final record count and trailer position.
    pub fn close(&mut self) -> Result<()> {
        self.check_failed()?;
        if self.closed {
            return Ok(());
        }
        self.open()?;
        self.flush_current_record()?;

        let trailer_position = self.bytes_written;
        let index_count = if self.options.emit_trailer_index { Some(self.record_index.len() as u32) } else { None };
        let (_trailer_header, trailer_header_bytes) = RecordHeader::trailer(self.record_number, self.order, index_count);
        self.sink.write_all(&trailer_header_bytes).map_err(|e| self.fail(e.into()))?;
        self.bytes_written += trailer_header_bytes.len() as u64;

        if self.options.emit_trailer_index {
            let record_index = self.record_index.clone();
            for &(length_words, count) in &record_index {
                let mut buf = [0u8; 4];
                self.order.write_u32(&mut buf, length_words);
                self.sink.write_all(&buf).map_err(|e| self.fail(e.into()))?;
                self.order.write_u32(&mut buf, count);
                self.sink.write_all(&buf).map_err(|e| self.fail(e.into()))?;
                self.bytes_written += 8;
            }
        }

        let user_bytes = self.file_header_user_bytes();
        let header = FileHeader {
            unique_word: crate::header::FILE_UNIQUE_WORD,
            split_number: 0,
            header_length_words: crate::header::HEADER_SIZE_WORDS,
            record_count: self.record_index.len() as u32,
            index_length: 0,
            bit_info: BitInfo {
                version: 6,
                header_type: HeaderType::EvioRecord,
                has_dictionary: self.dictionary_xml.is_some(),
                has_first_event: self.first_event.is_some(),
                is_last_or_has_trailer_index: self.options.emit_trailer_index,
                event_type: EventType::RocRaw,
                user_header_pad: 0,
                data_pad: 0,
                compressed_pad: 0,
            },
            user_header_length: user_bytes.len() as u32,
            trailer_position,
            user_int_1: 0,
            user_int_2: 0,
        };
        let mut header_bytes = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut header_bytes, 0, self.order).map_err(|e| self.fail(e))?;
        self.sink.seek(SeekFrom::Start(0)).map_err(|e| self.fail(e.into()))?;
        self.sink.write_all(&header_bytes).map_err(|e| self.fail(e.into()))?;
        self.sink.flush().map_err(|e| self.fail(e.into()))?;
        self.closed = true;
        Ok(())
    }
}

impl Writer<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, order: Endian, options: WriterOptions) -> Result<Self> {
        if path.as_ref().exists() {
            return Err(EvioError::FileExists(path.as_ref().display().to_string()));
        }
        let file = File::create(path)?;
        Ok(Writer::new(BufWriter::new(file), order, options))
    }
}

/// Owns a sequence of split output files, opening the first one lazily on
/// the first event and rotating to a new one whenever the current file
/// crosses `options.split_threshold`.
///
/// `path_template` is a printf-like filename with a single `%d` (or `_%d`)
/// placeholder, substituted with the split index for every file including
/// split 0: a template of `run_%d.evio` produces `run_0.evio`, `run_1.evio`,
/// and so on. A template without a placeholder gets the index appended to
/// its file name instead, so callers always get distinct split files.
pub struct FileWriter {
    path_template: PathBuf,
    order: Endian,
    options: WriterOptions,
    dictionary_xml: Option<String>,
    first_event: Option<Vec<u8>>,
    split_number: u32,
    inner: Option<Writer<BufWriter<File>>>,
}

impl FileWriter {
    pub fn new<P: AsRef<Path>>(path_template: P, order: Endian, options: WriterOptions) -> FileWriter {
        FileWriter {
            path_template: path_template.as_ref().to_path_buf(),
            order,
            options,
            dictionary_xml: None,
            first_event: None,
            split_number: 0,
            inner: None,
        }
    }

    pub fn with_dictionary(mut self, xml: String) -> Self {
        self.dictionary_xml = Some(xml);
        self
    }

    pub fn with_first_event(mut self, event_bytes: Vec<u8>) -> Self {
        self.first_event = Some(event_bytes);
        self
    }

    fn split_path(template: &Path, split_number: u32) -> PathBuf {
        let name = template.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let substituted = if name.contains("%d") {
            name.replacen("%d", &split_number.to_string(), 1)
        } else {
            format!("{name}_{split_number}")
        };
        template.with_file_name(substituted)
    }

    fn open_split(&self) -> Result<Writer<BufWriter<File>>> {
        let path = Self::split_path(&self.path_template, self.split_number);
        let mut writer = Writer::create(path, self.order, self.options.clone())?;
        if let Some(xml) = &self.dictionary_xml {
            writer = writer.with_dictionary(xml.clone());
        }
        if let Some(event) = &self.first_event {
            writer = writer.with_first_event(event.clone());
        }
        Ok(writer)
    }

    pub fn write_event(&mut self, event_bytes: &[u8]) -> Result<()> {
        if self.inner.is_none() {
            self.inner = Some(self.open_split()?);
        }
        let writer = self.inner.as_mut().expect("just populated above");
        writer.write_event(event_bytes)?;
        if writer.should_split() {
            writer.close()?;
            self.split_number += 1;
            self.inner = None;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.inner.as_mut() {
            writer.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn memory_writer(options: WriterOptions) -> Writer<Cursor<Vec<u8>>> {
        Writer::new(Cursor::new(Vec::new()), Endian::Big, options)
    }

    #[test]
    fn empty_file_has_header_and_trailer() {
        let mut writer = memory_writer(WriterOptions::default());
        writer.close().unwrap();
        let bytes = writer.sink.into_inner();
        assert!(bytes.len() >= HEADER_SIZE_BYTES * 2);
        let (file_header, order) = FileHeader::read(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(order, Endian::Big);
        assert_eq!(file_header.record_count, 0);
    }

    #[test]
    fn write_event_then_close_produces_one_record() {
        let mut writer = memory_writer(WriterOptions::default());
        writer.write_event(&[0, 0, 0, 1, 0, 0, 0, 0]).unwrap();
        writer.close().unwrap();
        let bytes = writer.sink.into_inner();
        let (file_header, order) = FileHeader::read(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(file_header.record_count, 1);
        assert!(file_header.has_trailer_with_index());

        let record = crate::record_input::RecordInput::parse(&bytes, HEADER_SIZE_BYTES, order).unwrap();
        assert_eq!(record.entries(), 1);
    }

    #[test]
    fn record_rotates_on_event_count_limit() {
        let mut options = WriterOptions::default();
        options.max_record_events = 1;
        let mut writer = memory_writer(options);
        writer.write_event(&[0, 0, 0, 0]).unwrap();
        writer.write_event(&[0, 0, 0, 0]).unwrap();
        writer.close().unwrap();
        let bytes = writer.sink.into_inner();
        let (file_header, _) = FileHeader::read(&bytes, 0, Endian::NATIVE).unwrap();
        assert_eq!(file_header.record_count, 2);
    }

    #[test]
    fn failed_writer_rejects_further_writes() {
        let mut writer = memory_writer(WriterOptions::default());
        writer.failed = Some("simulated failure".into());
        let err = writer.write_event(&[0, 0, 0, 0]);
        assert!(matches!(err, Err(EvioError::WriterFailed(_))));
    }

    #[test]
    fn dictionary_and_first_event_set_header_flags() {
        let mut writer = memory_writer(WriterOptions::default())
            .with_dictionary("<xmlDict/>".to_string())
            .with_first_event(vec![0, 0, 0, 1, 0, 0, 0, 0]);
        writer.close().unwrap();
        let bytes = writer.sink.into_inner();
        let (file_header, _) = FileHeader::read(&bytes, 0, Endian::NATIVE).unwrap();
        assert!(file_header.bit_info.has_dictionary);
        assert!(file_header.bit_info.has_first_event);
    }
}
