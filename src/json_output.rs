use crate::model::{FieldNode, NodeContent, Value};
use crate::record::Record;
use crate::settings::CodecSettings;

use serde_json::{Map, Value as JsonValue, json};

/// Renders `record` as JSON: one object per node with its name, type, offset and length, plus
/// either its value (and enum label) or its children.
///
/// Strings are decoded through the settings' text encoding. Trailing bytes are listed as numbers.
pub fn record_to_json_value(record: &Record, settings: &CodecSettings) -> JsonValue {
    let fields: Vec<JsonValue> = record
        .root()
        .children()
        .iter()
        .map(|node| node_to_json(node, settings))
        .collect();

    json!({
        "length": record.len(),
        "fields": fields,
        "trailing": record.trailing(),
    })
}

impl Record {
    /// See [`record_to_json_value`].
    pub fn to_json_value(&self, settings: &CodecSettings) -> JsonValue {
        record_to_json_value(self, settings)
    }
}

fn node_to_json(node: &FieldNode, settings: &CodecSettings) -> JsonValue {
    let mut map = Map::new();
    map.insert("name".to_owned(), json!(node.name()));
    map.insert("type".to_owned(), json!(node.tag()));
    map.insert("offset".to_owned(), json!(node.offset()));
    map.insert("length".to_owned(), json!(node.length()));

    match node.content() {
        NodeContent::Scalar { value, label, .. } => {
            map.insert("value".to_owned(), value_to_json(value, settings));
            if let Some(label) = label {
                map.insert("label".to_owned(), json!(label));
            }
        }
        NodeContent::Children(children) => {
            let children: Vec<JsonValue> = children
                .iter()
                .map(|child| node_to_json(child, settings))
                .collect();
            map.insert("children".to_owned(), JsonValue::Array(children));
        }
    }

    JsonValue::Object(map)
}

fn value_to_json(value: &Value, settings: &CodecSettings) -> JsonValue {
    match value {
        Value::Int(v) => json!(v),
        Value::UInt(v) => json!(v),
        Value::Bool(b) => json!(b),
        Value::Text(bytes) => json!(settings.decode_text(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{EnumEntry, FieldDescriptor, FieldType, IntType, Template};
    use std::sync::Arc;

    #[test]
    fn test_renders_tree() {
        let template = Arc::new(
            Template::new(vec![
                FieldDescriptor::new(
                    "kind",
                    FieldType::Enum {
                        base: IntType::UInt8,
                        entries: vec![EnumEntry::new(1, "plain")],
                        bitmask: false,
                    },
                ),
                FieldDescriptor::new("bounds", FieldType::rect()),
                FieldDescriptor::new("title", FieldType::PString),
            ])
            .unwrap(),
        );
        let data = [1, 0, 1, 0, 2, 0, 3, 0, 4, 2, b'o', 0xA5, 0xEE];
        let record = Record::decode(&template, &data).unwrap();

        let json = record.to_json_value(&CodecSettings::default());
        assert_eq!(json["length"], 13);
        assert_eq!(json["trailing"], json!([0xEE]));
        assert_eq!(
            json["fields"][0],
            json!({"name": "kind", "type": "enum", "offset": 0, "length": 1,
                   "value": 1, "label": "plain"})
        );
        assert_eq!(json["fields"][1]["children"][3]["value"], 4);
        assert_eq!(json["fields"][1]["children"][3]["offset"], 7);
        assert_eq!(json["fields"][2]["value"], "o\u{2022}");
    }
}
