
use fixtures::*;

use pretty_assertions::assert_eq;
use restmpl::{CodecError, FieldPath, Record, TypeTag, Value, decode, encode};

#[test]
fn test_string_list_round_trip() {
    ensure_env_logger_initialized();
    let data = str_list(&["Open", "Save As...", ""]);
    let record = decode(&str_list_template(), &data).unwrap();

    let strings = record.get("strings").unwrap();
    assert_eq!(strings.tag(), TypeTag::Group);
    assert_eq!(strings.children().len(), 3);
    assert_eq!(
        record.value("strings[1].The string").unwrap(),
        &Value::Text(b"Save As...".to_vec())
    );
    assert_eq!(
        record.value("strings[2].The string").unwrap(),
        &Value::Text(Vec::new())
    );
    assert_eq!(encode(&record).unwrap(), data);
}

#[test]
fn test_count_that_cannot_fit_is_rejected() {
    let mut data = str_list(&["a", "b"]);
    data[1] = 40;

    let err = decode(&str_list_template(), &data).unwrap_err();
    assert_eq!(
        err,
        CodecError::InvalidRepeatCount {
            path: FieldPath::from("strings"),
            offset: 2,
            count: 40,
        }
    );
}

#[test]
fn test_item_list_with_conditional_help() {
    let data = item_list();
    let record = decode(&item_list_template(), &data).unwrap();

    assert_eq!(record.value("count").unwrap(), &Value::Int(1));
    assert_eq!(record.get("items").unwrap().children().len(), 2);

    let button = record.get("items[0]").unwrap();
    assert_eq!(button.tag(), TypeTag::Item);
    assert_eq!(button.length(), 19);
    assert_eq!(record.get("items[0].kind").unwrap().label(), Some("button"));
    assert_eq!(record.value("items[0].help[0].help id").unwrap(), &Value::Int(7));
    assert_eq!(record.value("items[0].bounds.right").unwrap(), &Value::Int(80));

    let text = record.get("items[1]").unwrap();
    assert_eq!(text.offset(), 21);
    assert!(record.get("items[1].help").unwrap().children().is_empty());
    assert_eq!(
        record.value("items[1].text").unwrap(),
        &Value::Text(b"Hi!".to_vec())
    );

    assert_eq!(encode(&record).unwrap(), data);
}

#[test]
fn test_toggling_a_condition_adds_and_drops_the_group() {
    let mut record = Record::decode(&item_list_template(), &item_list()).unwrap();

    record.set_value("items[1].has help", Value::Bool(true)).unwrap();
    assert_eq!(record.get("items[1].help").unwrap().children().len(), 1);
    record
        .set_value("items[1].help[0].help id", Value::Int(-2))
        .unwrap();

    record.set_value("items[0].has help", Value::Bool(false)).unwrap();
    assert!(record.get("items[0].help").unwrap().children().is_empty());

    let bytes = encode(&record).unwrap();
    let reread = decode(&item_list_template(), &bytes).unwrap();
    assert_eq!(reread.value("items[1].help[0].help id").unwrap(), &Value::Int(-2));
    assert!(reread.get("items[0].help").unwrap().children().is_empty());
    assert_eq!(bytes.len(), item_list().len());
}

#[test]
fn test_absent_group_cannot_grow() {
    let mut record = Record::decode(&item_list_template(), &item_list()).unwrap();
    let err = record.insert_item("items[1].help", 0).unwrap_err();
    assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));
}

#[test]
fn test_zero_based_list_can_be_emptied() {
    let mut record = Record::decode(&item_list_template(), &item_list()).unwrap();
    record.remove_item("items", 1).unwrap();
    record.remove_item("items", 0).unwrap();

    assert_eq!(record.value("count").unwrap(), &Value::Int(-1));
    assert_eq!(encode(&record).unwrap(), vec![0xFF, 0xFF]);
}
