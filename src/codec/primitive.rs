use crate::err::{CodecError, Result};
use crate::model::{FieldNode, NodeContent, Value};
use crate::path::FieldPath;
use crate::settings::CodecSettings;
use crate::template::{EnumEntry, FieldType, IntType, enum_label};
use crate::utils::ByteCursor;
use crate::utils::bytes::write_uint_be;

const PSTRING_MAX: usize = u8::MAX as usize;
const WIDE_TRUE: u16 = 0x0100;

pub(super) fn decode(
    cursor: &mut ByteCursor,
    name: &str,
    field_type: &FieldType,
    path: &FieldPath,
) -> Result<FieldNode> {
    let truncated = |e| CodecError::truncated(path, e);
    let tag = field_type.tag();

    let node = match field_type {
        FieldType::FixedString { len } => {
            let bytes = cursor.take_bytes(*len, "fixed string").map_err(truncated)?;
            FieldNode::scalar(name, tag, Value::Text(bytes.to_vec()), None)
        }
        FieldType::PString => {
            let bytes = cursor.pascal_string("pstring").map_err(truncated)?;
            FieldNode::scalar(name, tag, Value::Text(bytes.to_vec()), None)
        }
        FieldType::Boolean { wide } => {
            let raw = if *wide {
                cursor.u16_named("boolean").map_err(truncated)?
            } else {
                u16::from(cursor.u8_named("boolean").map_err(truncated)?)
            };
            let mut node = FieldNode::scalar(name, tag, Value::Bool(raw != 0), None);
            if let NodeContent::Scalar { raw: slot, .. } = &mut node.content {
                *slot = Some(raw);
            }
            node
        }
        FieldType::Enum {
            base,
            entries,
            bitmask,
        } => {
            let bits = cursor.uint_named(base.width(), "enum").map_err(truncated)?;
            let raw = base.from_bits(bits);
            let label = enum_label(*base, entries, *bitmask, raw);
            FieldNode::scalar(name, tag, base.value(raw), label)
        }
        other => match other.int_type() {
            Some(int_type) => {
                let bits = cursor
                    .uint_named(int_type.width(), "integer")
                    .map_err(truncated)?;
                FieldNode::scalar(name, tag, int_type.value(int_type.from_bits(bits)), None)
            }
            None => {
                return Err(CodecError::mismatch(
                    path,
                    cursor.pos(),
                    format!("{tag} is not a scalar type"),
                ));
            }
        },
    };

    Ok(node)
}

pub(super) fn encode(
    out: &mut Vec<u8>,
    field_type: &FieldType,
    node: &FieldNode,
    path: &FieldPath,
    count: Option<i128>,
) -> Result<()> {
    let NodeContent::Scalar { value, raw, .. } = node.content() else {
        return Err(CodecError::mismatch(
            path,
            out.len(),
            "scalar field holds children",
        ));
    };

    match field_type {
        FieldType::FixedString { len } => {
            let bytes = expect_text(value, path)?;
            if bytes.len() > *len {
                return Err(CodecError::ValueTooLong {
                    path: path.clone(),
                    len: bytes.len(),
                    max: *len,
                });
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + (len - bytes.len()), 0);
        }
        FieldType::PString => {
            let bytes = expect_text(value, path)?;
            if bytes.len() > PSTRING_MAX {
                return Err(CodecError::ValueTooLong {
                    path: path.clone(),
                    len: bytes.len(),
                    max: PSTRING_MAX,
                });
            }
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
        FieldType::Boolean { wide } => {
            let b = value.as_bool().ok_or_else(|| kind_error(field_type, value, path))?;
            let bits = match raw {
                Some(raw) if (*raw != 0) == b => *raw,
                _ if !b => 0,
                _ if *wide => WIDE_TRUE,
                _ => 1,
            };
            if *wide {
                out.extend_from_slice(&bits.to_be_bytes());
            } else {
                out.push(bits as u8);
            }
        }
        other => {
            let int_type = other
                .int_type()
                .ok_or_else(|| kind_error(field_type, value, path))?;
            let n = match count {
                Some(n) if int_type.contains(n) => n,
                Some(n) => {
                    return Err(CodecError::InvalidRepeatCount {
                        path: path.clone(),
                        offset: node.offset(),
                        count: n,
                    });
                }
                None => {
                    let n = value
                        .as_i128()
                        .ok_or_else(|| kind_error(field_type, value, path))?;
                    check_range(int_type, n, path)?;
                    n
                }
            };
            write_uint_be(out, int_type.to_bits(n), int_type.width());
        }
    }

    Ok(())
}

/// Checks `value` against the field type, returning the value as it will be stored along with
/// its enum label.
///
/// Integers are accepted in either signedness as long as they fit; fixed strings shorter than
/// the field are padded with NULs.
pub(crate) fn normalize(
    field_type: &FieldType,
    value: Value,
    path: &FieldPath,
) -> Result<(Value, Option<String>)> {
    match field_type {
        FieldType::FixedString { len } => match value {
            Value::Text(bytes) if bytes.len() > *len => Err(CodecError::ValueTooLong {
                path: path.clone(),
                len: bytes.len(),
                max: *len,
            }),
            Value::Text(mut bytes) => {
                bytes.resize(*len, 0);
                Ok((Value::Text(bytes), None))
            }
            other => Err(kind_error(field_type, &other, path)),
        },
        FieldType::PString => match value {
            Value::Text(bytes) if bytes.len() > PSTRING_MAX => Err(CodecError::ValueTooLong {
                path: path.clone(),
                len: bytes.len(),
                max: PSTRING_MAX,
            }),
            Value::Text(bytes) => Ok((Value::Text(bytes), None)),
            other => Err(kind_error(field_type, &other, path)),
        },
        FieldType::Boolean { .. } => match value {
            Value::Bool(b) => Ok((Value::Bool(b), None)),
            other => Err(kind_error(field_type, &other, path)),
        },
        other => {
            let int_type = other
                .int_type()
                .ok_or_else(|| kind_error(field_type, &value, path))?;
            let n = value
                .as_i128()
                .ok_or_else(|| kind_error(field_type, &value, path))?;
            check_range(int_type, n, path)?;

            let label = match other {
                FieldType::Enum {
                    base,
                    entries,
                    bitmask,
                } => enum_label(*base, entries, *bitmask, n),
                _ => None,
            };
            Ok((int_type.value(n), label))
        }
    }
}

/// Parses user-entered text into a value for `field_type`.
///
/// Integers may be written in decimal, `0x`/`$` hex, enums by entry name and booleans as
/// `true`/`false`, `yes`/`no` or `1`/`0`.
pub(crate) fn parse_text(
    field_type: &FieldType,
    text: &str,
    settings: &CodecSettings,
    path: &FieldPath,
) -> Result<Value> {
    let trimmed = text.trim();
    match field_type {
        FieldType::FixedString { .. } | FieldType::PString => settings
            .encode_text(text)
            .map(Value::Text)
            .map_err(|e| {
                CodecError::constraint(
                    path,
                    format!(
                        "text is not representable in {}: {e}",
                        settings.get_text_encoding().name()
                    ),
                )
            }),
        FieldType::Boolean { .. } => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(CodecError::constraint(
                path,
                format!("`{trimmed}` is not a boolean"),
            )),
        },
        FieldType::Enum { entries, .. } => match entry_named(entries, trimmed) {
            Some(entry) => Ok(Value::Int(entry.value)),
            None => parse_int(trimmed, path),
        },
        _ => parse_int(trimmed, path),
    }
}

/// Value of a freshly inserted scalar field.
pub(crate) fn default_node(name: &str, field_type: &FieldType) -> FieldNode {
    let value = match field_type {
        FieldType::FixedString { len } => Value::Text(vec![0; *len]),
        FieldType::PString => Value::Text(Vec::new()),
        FieldType::Boolean { .. } => Value::Bool(false),
        other => match other.int_type() {
            Some(int_type) => int_type.value(0),
            None => Value::UInt(0),
        },
    };
    let label = match field_type {
        FieldType::Enum {
            base,
            entries,
            bitmask,
        } => enum_label(*base, entries, *bitmask, 0),
        _ => None,
    };
    FieldNode::scalar(name, field_type.tag(), value, label)
}

/// Number of bytes `value` takes when encoded as `field_type`.
pub(crate) fn encoded_len(field_type: &FieldType, value: &Value) -> usize {
    match field_type {
        FieldType::PString => 1 + value.as_bytes().map(<[u8]>::len).unwrap_or_default(),
        other => other.min_width(),
    }
}

fn entry_named<'e>(entries: &'e [EnumEntry], name: &str) -> Option<&'e EnumEntry> {
    entries
        .iter()
        .find(|e| e.name == name)
        .or_else(|| entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
}

fn parse_int(text: &str, path: &FieldPath) -> Result<Value> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .or_else(|| digits.strip_prefix('$'));
    let magnitude = match hex {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .map_err(|e| CodecError::constraint(path, format!("`{text}` is not an integer: {e}")))?;

    if !negative {
        return Ok(Value::UInt(magnitude));
    }
    let n = -i128::from(magnitude);
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| CodecError::constraint(path, format!("`{text}` is out of range")))
}

fn check_range(int_type: IntType, n: i128, path: &FieldPath) -> Result<()> {
    if int_type.contains(n) {
        Ok(())
    } else {
        Err(CodecError::constraint(
            path,
            format!(
                "{n} is outside the {} range {}..={}",
                int_type.tag(),
                int_type.min(),
                int_type.max()
            ),
        ))
    }
}

fn expect_text<'v>(value: &'v Value, path: &FieldPath) -> Result<&'v [u8]> {
    value.as_bytes().ok_or_else(|| {
        CodecError::constraint(path, format!("expected a string, found a {}", value.kind_name()))
    })
}

fn kind_error(field_type: &FieldType, value: &Value, path: &FieldPath) -> CodecError {
    CodecError::constraint(
        path,
        format!(
            "a {} field cannot hold a {}",
            field_type.tag(),
            value.kind_name()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> FieldPath {
        FieldPath::from("field")
    }

    #[test]
    fn test_normalize_converts_signedness() {
        let (value, _) = normalize(&FieldType::UInt16, Value::Int(5), &path()).unwrap();
        assert_eq!(value, Value::UInt(5));

        let (value, _) = normalize(&FieldType::Int8, Value::UInt(127), &path()).unwrap();
        assert_eq!(value, Value::Int(127));
    }

    #[test]
    fn test_normalize_rejects_out_of_range() {
        let err = normalize(&FieldType::Int16, Value::Int(40000), &path()).unwrap_err();
        assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));

        let err = normalize(&FieldType::UInt8, Value::Int(-1), &path()).unwrap_err();
        assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));
    }

    #[test]
    fn test_normalize_rejects_wrong_kind() {
        let err = normalize(&FieldType::Int16, Value::Bool(true), &path()).unwrap_err();
        assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));

        let err = normalize(&FieldType::PString, Value::UInt(1), &path()).unwrap_err();
        assert!(matches!(err, CodecError::TypeConstraintViolation { .. }));
    }

    #[test]
    fn test_strings_respect_their_capacity() {
        let err = normalize(&FieldType::PString, Value::Text(vec![b'x'; 256]), &path())
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::ValueTooLong {
                path: path(),
                len: 256,
                max: 255
            }
        );

        let (value, _) = normalize(
            &FieldType::FixedString { len: 4 },
            Value::Text(b"ab".to_vec()),
            &path(),
        )
        .unwrap();
        assert_eq!(value, Value::Text(b"ab\0\0".to_vec()));
    }

    #[test]
    fn test_parse_text() {
        let settings = CodecSettings::default();
        let p = path();

        assert_eq!(
            parse_text(&FieldType::Int16, " -12 ", &settings, &p).unwrap(),
            Value::Int(-12)
        );
        assert_eq!(
            parse_text(&FieldType::UInt16, "$1F", &settings, &p).unwrap(),
            Value::UInt(0x1F)
        );
        assert_eq!(
            parse_text(&FieldType::Boolean { wide: false }, "Yes", &settings, &p).unwrap(),
            Value::Bool(true)
        );
        assert!(parse_text(&FieldType::Int16, "twelve", &settings, &p).is_err());

        let kind = FieldType::Enum {
            base: IntType::UInt8,
            entries: vec![EnumEntry::new(3, "Bold")],
            bitmask: false,
        };
        assert_eq!(
            parse_text(&kind, "bold", &settings, &p).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_edited_boolean_is_canonical() {
        let mut out = Vec::new();
        let node = FieldNode::scalar("b", crate::TypeTag::Boolean, Value::Bool(true), None);
        encode(&mut out, &FieldType::Boolean { wide: true }, &node, &path(), None).unwrap();
        assert_eq!(out, vec![0x01, 0x00]);
    }
}
