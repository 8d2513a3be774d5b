//! End-to-end scenarios exercising the writer/reader pipeline the way a
//! downstream consumer would: build a tree, encode it, round-trip it
//! through a file, and check the properties that actually matter rather
//! than re-deriving the wire format byte by byte.

use evio::cursor::ByteCursor;
use evio::endian::Endian;
use evio::header;
use evio::reader::{Reader, ReaderOptions};
use evio::tree::{PrimitiveArray, Structure};
use evio::types::{CompressionType, DataType};
use evio::writer::{FileWriter, Writer, WriterOptions};

fn encode(structure: &Structure, order: Endian) -> Vec<u8> {
    let mut cursor = ByteCursor::with_capacity(4096);
    cursor.set_order(order);
    structure.write(&mut cursor).unwrap();
    cursor.flip();
    cursor.as_slice().to_vec()
}

fn mixed_type_event() -> Structure {
    let mut ints = Structure::new_bank(3, 3, DataType::Int32);
    ints.set_primitives(PrimitiveArray::Int32(vec![i32::MAX, 0, i32::MIN])).unwrap();

    let mut chars = Structure::new_bank(4, 4, DataType::Char8);
    chars.set_primitives(PrimitiveArray::Int8(vec![0x7F, 0x00, -0x80])).unwrap();

    let mut doubles = Structure::new_bank(5, 5, DataType::Double64);
    doubles.set_primitives(PrimitiveArray::Float64(vec![f64::MAX, 0.0, f64::MIN])).unwrap();

    let mut outer = Structure::new_bank(1, 1, DataType::Bank);
    outer.push_child(ints).unwrap();
    outer.push_child(chars).unwrap();
    outer.push_child(doubles).unwrap();
    outer
}

#[test]
fn empty_bank_round_trips_with_minimum_length() {
    let mut bank = Structure::new_bank(0x1234, 0x56, DataType::Int32);
    bank.set_primitives(PrimitiveArray::Int32(vec![1])).unwrap();

    assert_eq!(bank.total_words(), 3);

    let bytes = encode(&bank, Endian::Big);
    assert_eq!(bytes.len(), 12);

    let mut cursor = ByteCursor::wrap(bytes);
    cursor.set_order(Endian::Big);
    let parsed = Structure::parse_bank(&mut cursor).unwrap();
    assert_eq!(parsed, bank);
    assert_eq!(parsed.tag, 0x1234);
    assert_eq!(parsed.num, Some(0x56));
    assert_eq!(parsed.pad, 0);
    assert!(parsed.children().is_none());
}

#[test]
fn mixed_type_event_round_trips_in_both_byte_orders() {
    let event = mixed_type_event();

    for order in [Endian::Big, Endian::Little] {
        let bytes = encode(&event, order);
        let mut cursor = ByteCursor::wrap(bytes);
        cursor.set_order(order);
        let parsed = Structure::parse_bank(&mut cursor).unwrap();
        assert_eq!(parsed, event);
        let children = parsed.children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].tag, 3);
        assert_eq!(children[1].tag, 4);
        assert_eq!(children[2].tag, 5);
    }

    let big = encode(&event, Endian::Big);
    let little = encode(&event, Endian::Little);
    assert_eq!(big.len(), little.len());
    assert_ne!(big, little);
}

#[test]
fn compressed_round_trip_reports_one_record_and_one_trailer() {
    let event = encode(&mixed_type_event(), Endian::Big);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.evio");

    let mut options = WriterOptions::default();
    options.compression = CompressionType::Lz4Best;
    let mut writer = Writer::create(&path, Endian::Big, options).unwrap();
    for _ in 0..3 {
        writer.write_event(&event).unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    assert_eq!(reader.event_count(), 3);
    assert_eq!(reader.record_count(), 1);
    for i in 0..3 {
        assert_eq!(reader.event(i).unwrap(), event);
    }
}

#[test]
fn split_rotation_produces_one_event_per_file() {
    let event = encode(&Structure::new_bank(1, 0, DataType::Int32), Endian::Big);

    let mut options = WriterOptions::default();
    options.max_record_events = 1;
    // header(56) + one-event record(56 header + 4 index + 8 data = 68) - 1
    options.split_threshold = (header::HEADER_SIZE_BYTES + 68 - 1) as u64;

    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("run_%d.evio");
    let mut writer = FileWriter::new(&template, Endian::Big, options);
    for _ in 0..5 {
        writer.write_event(&event).unwrap();
    }
    writer.close().unwrap();

    let expected_paths = [
        dir.path().join("run_0.evio"),
        dir.path().join("run_1.evio"),
        dir.path().join("run_2.evio"),
        dir.path().join("run_3.evio"),
        dir.path().join("run_4.evio"),
    ];
    assert!(!dir.path().join("run_5.evio").exists());
    for path in &expected_paths {
        assert!(path.exists(), "expected split file {path:?} to exist");
        let mut reader = Reader::open(path, ReaderOptions::default()).unwrap();
        assert_eq!(reader.event_count(), 1);
        assert_eq!(reader.event(0).unwrap(), event);
    }
}

#[test]
fn edit_then_reparse_removes_child_and_shrinks_event() {
    let event = mixed_type_event();
    let event_bytes = encode(&event, Endian::Big);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edit.evio");
    let mut writer = Writer::create(&path, Endian::Big, WriterOptions::default()).unwrap();
    writer.write_event(&event_bytes).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let before = reader.buffer().len();

    let mut index = reader.node_index_for_record(0).unwrap();
    let root = index.extract_event_node(0).unwrap();
    let children = index.children(root).unwrap();
    assert_eq!(children.len(), 3);
    let removed = children[1]; // the char8 child
    let removed_words = index.node(removed).unwrap().length_words;

    reader.remove_structure(0, &mut index, removed).unwrap();
    assert_eq!(reader.buffer().len(), before - (removed_words * 4) as usize);

    let remaining = reader.event(0).unwrap();
    let mut cursor = ByteCursor::wrap(remaining);
    cursor.set_order(Endian::Big);
    let reparsed = Structure::parse_bank(&mut cursor).unwrap();
    let remaining_children = reparsed.children().unwrap();
    assert_eq!(remaining_children.len(), 2);
    assert_eq!(remaining_children[0].tag, 3);
    assert_eq!(remaining_children[1].tag, 5);
}

#[test]
fn composite_bank_round_trips_its_format_string() {
    let tokens = evio::composite::parse_format("2i,d").unwrap();
    let values = vec![
        evio::composite::CompositeValue::I32(7),
        evio::composite::CompositeValue::I32(-9),
        evio::composite::CompositeValue::F64(1.5),
    ];
    let raw = evio::composite::encode(&values, Endian::Big, &tokens).unwrap();

    let mut bank = Structure::new_bank(9, 9, DataType::Composite);
    bank.set_composite("2i,d".to_string(), raw.clone()).unwrap();

    let bytes = encode(&bank, Endian::Big);
    let mut cursor = ByteCursor::wrap(bytes);
    cursor.set_order(Endian::Big);
    let parsed = Structure::parse_bank(&mut cursor).unwrap();
    assert_eq!(parsed, bank);

    match &parsed.payload {
        evio::tree::Payload::Composite { format, raw: parsed_raw } => {
            assert_eq!(format, "2i,d");
            assert_eq!(parsed_raw, &raw);
            let decoded_tokens = evio::composite::parse_format(format).unwrap();
            assert_eq!(evio::composite::decode(parsed_raw, Endian::Big, &decoded_tokens).unwrap(), values);
        }
        other => panic!("expected composite payload, got {other:?}"),
    }
}

#[test]
fn legacy_v4_block_exposes_dictionary_and_data_event() {
    let mut dict_bytes = b"<xmlDict/>".to_vec();
    dict_bytes.push(0);
    let mut dict_event = Structure::new_bank(0, 0, DataType::Char8);
    dict_event
        .set_primitives(PrimitiveArray::Int8(dict_bytes.iter().map(|b| *b as i8).collect()))
        .unwrap();
    let dict_event_bytes = encode(&dict_event, Endian::Big);

    let mut data_event = Structure::new_bank(7, 7, DataType::Int32);
    data_event.set_primitives(PrimitiveArray::Int32(vec![123, 456, 789])).unwrap();
    let data_event_bytes = encode(&data_event, Endian::Big);

    let mut body = Vec::new();
    body.extend_from_slice(&dict_event_bytes);
    body.extend_from_slice(&data_event_bytes);

    let block_size_words = 8 + (body.len() / 4) as u32;
    let bit_info_version: u32 = 4 | (1 << 9) | (1 << 10); // version 4, has dictionary, last block

    let mut block = Vec::new();
    block.extend_from_slice(&block_size_words.to_be_bytes());
    block.extend_from_slice(&1u32.to_be_bytes()); // block_number
    block.extend_from_slice(&8u32.to_be_bytes()); // header_length
    block.extend_from_slice(&2u32.to_be_bytes()); // event_count: dictionary + one data event
    block.extend_from_slice(&0u32.to_be_bytes()); // reserved1
    block.extend_from_slice(&bit_info_version.to_be_bytes());
    block.extend_from_slice(&0u32.to_be_bytes()); // reserved2
    block.extend_from_slice(&header::HEADER_MAGIC.to_be_bytes());
    block.extend_from_slice(&body);

    let mut reader = Reader::from_buffer(block, ReaderOptions::default()).unwrap();
    assert!(reader.is_legacy());
    assert_eq!(reader.dictionary_xml(), Some("<xmlDict/>"));
    assert_eq!(reader.event_count(), 1);
    assert_eq!(reader.event(0).unwrap(), data_event_bytes);
}
