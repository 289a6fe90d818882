
use fixtures::*;

use pretty_assertions::assert_eq;
use restmpl::{
    CodecError, FieldDescriptor, FieldPath, FieldType, Record, Template, TypeTag, Value, decode,
    encode,
};
use std::sync::Arc;

#[test]
fn test_it_decodes_a_rectangle() {
    ensure_env_logger_initialized();
    let record = decode(&rect_template(), &RECT).unwrap();

    let values: Vec<(String, &Value)> = record
        .fields()
        .into_iter()
        .map(|view| (view.path.to_string(), view.value.unwrap()))
        .collect();
    assert_eq!(
        values,
        vec![
            ("top".to_owned(), &Value::Int(10)),
            ("left".to_owned(), &Value::Int(5)),
            ("bottom".to_owned(), &Value::Int(100)),
            ("right".to_owned(), &Value::Int(50)),
        ]
    );
    assert_eq!(record.root().length(), 8);
    assert!(record.trailing().is_empty());
}

#[test]
fn test_it_reports_offsets_and_tags() {
    let record = decode(&rect_template(), &RECT).unwrap();
    let right = record.get("right").unwrap();
    assert_eq!(right.offset(), 6);
    assert_eq!(right.length(), 2);
    assert_eq!(right.tag(), TypeTag::Int16);
}

#[test]
fn test_round_trip_is_identity() {
    let record = decode(&rect_template(), &RECT).unwrap();
    assert_eq!(encode(&record).unwrap(), RECT.to_vec());

    let negative = [0xFF, 0xF6, 0x80, 0x00, 0x7F, 0xFF, 0x00, 0x00];
    let record = decode(&rect_template(), &negative).unwrap();
    assert_eq!(record.value("top").unwrap(), &Value::Int(-10));
    assert_eq!(record.value("left").unwrap(), &Value::Int(-32768));
    assert_eq!(encode(&record).unwrap(), negative.to_vec());
}

#[test]
fn test_seven_bytes_are_truncated_at_right() {
    let err = decode(&rect_template(), &RECT[..7]).unwrap_err();
    assert_eq!(
        err,
        CodecError::TruncatedData {
            path: FieldPath::from("right"),
            offset: 6,
            need: 2,
            have: 1,
        }
    );
}

#[test]
fn test_six_bytes_do_not_match_the_template() {
    let err = decode(&rect_template(), &RECT[..6]).unwrap_err();
    assert!(matches!(err, CodecError::TemplateMismatch { offset: 6, .. }));
    assert_eq!(err.path(), &FieldPath::from("right"));
}

#[test]
fn test_trailing_bytes_are_preserved() {
    let mut data = RECT.to_vec();
    data.extend_from_slice(&[0xDE, 0xAD, 0xBE]);

    let record = decode(&rect_template(), &data).unwrap();
    assert_eq!(record.trailing(), &[0xDE, 0xAD, 0xBE]);
    assert_eq!(record.len(), 11);
    assert_eq!(encode(&record).unwrap(), data);
}

#[test]
fn test_out_of_range_value_leaves_the_record_intact() {
    let mut record = Record::decode(&rect_template(), &RECT).unwrap();
    let before = record.clone();

    let err = record.set_value("top", Value::Int(40000)).unwrap_err();
    assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));
    assert_eq!(err.path(), &FieldPath::from("top"));
    assert_eq!(record, before);
    assert_eq!(record.value("top").unwrap(), &Value::Int(10));
}

#[test]
fn test_set_value_is_idempotent() {
    let mut once = Record::decode(&rect_template(), &RECT).unwrap();
    once.set_value("bottom", Value::Int(-7)).unwrap();

    let mut twice = once.clone();
    twice.set_value("bottom", Value::Int(-7)).unwrap();

    assert_eq!(once, twice);
    assert_eq!(
        encode(&twice).unwrap(),
        vec![0x00, 0x0A, 0x00, 0x05, 0xFF, 0xF9, 0x00, 0x32]
    );
}

#[test]
fn test_unknown_paths() {
    let mut record = Record::decode(&rect_template(), &RECT).unwrap();
    let err = record.set_value("middle", Value::Int(1)).unwrap_err();
    assert_eq!(
        err,
        CodecError::UnknownFieldPath {
            path: FieldPath::from("middle")
        }
    );
}

fn wide_template() -> Arc<Template> {
    Arc::new(
        Template::new(vec![
            FieldDescriptor::new("long", FieldType::Int32),
            FieldDescriptor::new("creator", FieldType::UInt32),
            FieldDescriptor::new("offset", FieldType::Int64),
            FieldDescriptor::new("size", FieldType::UInt64),
            FieldDescriptor::new("tag", FieldType::FixedString { len: 4 }),
        ])
        .unwrap(),
    )
}

const WIDE: [u8; 28] = [
    0x80, 0x00, 0x00, 0x00, // i32::MIN
    0xDE, 0xAD, 0xBE, 0xEF, // 0xDEADBEEF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, // -2
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // u64::MAX
    b'a', 0x00, b'b', 0x00,
];

#[test]
fn test_wide_integers_and_fixed_strings() {
    let record = decode(&wide_template(), &WIDE).unwrap();

    assert_eq!(record.value("long").unwrap(), &Value::Int(i64::from(i32::MIN)));
    assert_eq!(record.value("creator").unwrap(), &Value::UInt(0xDEAD_BEEF));
    assert_eq!(record.value("offset").unwrap(), &Value::Int(-2));
    assert_eq!(record.value("size").unwrap(), &Value::UInt(u64::MAX));
    assert_eq!(
        record.value("tag").unwrap(),
        &Value::Text(b"a\0b\0".to_vec())
    );
    assert_eq!(record.get("size").unwrap().offset(), 16);
    assert_eq!(encode(&record).unwrap(), WIDE.to_vec());
}

#[test]
fn test_editing_wide_fields() {
    let mut record = Record::decode(&wide_template(), &WIDE).unwrap();
    record.set_value("offset", Value::Int(i64::MIN)).unwrap();
    record.set_value("tag", Value::Text(b"x".to_vec())).unwrap();

    let bytes = encode(&record).unwrap();
    assert_eq!(bytes[8..16].to_vec(), vec![0x80_u8, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(bytes[24..].to_vec(), b"x\0\0\0".to_vec());

    let err = record
        .set_value("creator", Value::UInt(u64::from(u32::MAX) + 1))
        .unwrap_err();
    assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));
}
