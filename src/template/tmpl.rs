//! Loader for binary ResEdit `TMPL` resources.
//!
//! A `TMPL` resource is a flat sequence of entries, each a Pascal-string label followed by a
//! four character type code. Lists are delimited by `LSTB`/`LSTC`/`LSTZ` ... `LSTE` markers, and
//! `CASE` entries attach symbolic names to the integer field preceding them.

use crate::err::{TemplateError, TemplateResult};
use crate::template::{EnumEntry, FieldDescriptor, FieldType, IntType, RepeatPolicy, Template};
use crate::utils::ByteCursor;

use encoding::{DecoderTrap, Encoding};
use hashbrown::HashSet;
use log::{debug, trace};

/// Number of repetitions announced by the entry preceding an `LSTC`.
enum PendingCount {
    Counted { field: String, zero_based: bool },
    Fixed(usize),
}

struct OpenList {
    name: String,
    repeat: RepeatPolicy,
    offset: usize,
}

/// The fields of the record (or list body) currently being read.
#[derive(Default)]
struct Frame {
    fields: Vec<FieldDescriptor>,
    names: HashSet<String>,
    list: Option<OpenList>,
}

impl Frame {
    fn nested(list: OpenList) -> Self {
        Frame {
            list: Some(list),
            ..Frame::default()
        }
    }

    /// TMPL labels are free text and are often repeated (`Reserved`, `*****`). Field names must be
    /// unique, free of path separators and not look like an index, so labels are sanitized and
    /// numbered here.
    fn unique_name(&mut self, label: &str) -> String {
        let cleaned: String = label
            .trim()
            .chars()
            .map(|c| if matches!(c, '.' | '[' | ']') { '_' } else { c })
            .collect();
        let base = if cleaned.is_empty() {
            "untitled".to_owned()
        } else if cleaned.parse::<usize>().is_ok() {
            // `1` would be read back as an item index.
            format!("_{cleaned}")
        } else {
            cleaned
        };

        let mut name = base.clone();
        let mut n = 2;
        while self.names.contains(&name) {
            name = format!("{base} {n}");
            n += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn push(&mut self, label: &str, field_type: FieldType) -> String {
        let name = self.unique_name(label);
        self.fields
            .push(FieldDescriptor::new(name.clone(), field_type));
        name
    }
}

impl Template {
    /// Reads a template from the contents of a ResEdit `TMPL` resource.
    ///
    /// Supported type codes: `DBYT DWRD DLNG DQWD UBYT UWRD ULNG UQWD HBYT HWRD HLNG HQWD CHAR
    /// TNAM PSTR BFLG BOOL RECT PNT  Cnnn Hnnn Pnnn HEXD DVDR CASE`, the counts `OCNT WCNT ZCNT
    /// BCNT BZCT LCNT LZCT FCNT`, and the list markers `LSTB LSTC LSTZ LSTE`.
    pub fn from_tmpl(data: &[u8]) -> TemplateResult<Template> {
        let mut cursor = ByteCursor::new(data);
        let mut stack = vec![Frame::default()];
        let mut pending: Option<(PendingCount, String, usize)> = None;

        while !cursor.is_at_end() {
            let offset = cursor.pos();
            let label = decode_label(cursor.pascal_string("TMPL label")?);
            let code = cursor.array::<4>("TMPL type code")?;
            let code_str = String::from_utf8_lossy(&code).into_owned();

            trace!("Offset {}: TMPL entry `{}` {:?}", offset, code_str, label);

            if let Some((_, count_code, count_offset)) = &pending {
                if &code != b"LSTC" {
                    return Err(TemplateError::ExpectedListStart {
                        code: count_code.clone(),
                        offset: *count_offset,
                    });
                }
            }

            let frame = stack
                .last_mut()
                .ok_or(TemplateError::UnbalancedList { offset })?;

            match &code {
                b"LSTC" => {
                    let (count, _, _) = pending
                        .take()
                        .ok_or(TemplateError::UnbalancedList { offset })?;
                    let repeat = match count {
                        PendingCount::Counted { field, zero_based } => RepeatPolicy::Counted {
                            count_field: field,
                            zero_based,
                        },
                        PendingCount::Fixed(count) => RepeatPolicy::Fixed { count },
                    };
                    stack.push(Frame::nested(OpenList {
                        name: label,
                        repeat,
                        offset,
                    }));
                }
                b"LSTB" => stack.push(Frame::nested(OpenList {
                    name: label,
                    repeat: RepeatPolicy::UntilEnd,
                    offset,
                })),
                b"LSTZ" => stack.push(Frame::nested(OpenList {
                    name: label,
                    repeat: RepeatPolicy::ZeroTerminated,
                    offset,
                })),
                b"LSTE" => {
                    let (fields, list) = match stack.pop() {
                        Some(Frame {
                            fields,
                            list: Some(list),
                            ..
                        }) => (fields, list),
                        _ => return Err(TemplateError::UnbalancedList { offset }),
                    };
                    let parent = stack
                        .last_mut()
                        .ok_or(TemplateError::UnbalancedList { offset })?;
                    parent.push(
                        &list.name,
                        FieldType::Group {
                            fields: Template::new(fields)?,
                            repeat: list.repeat,
                            condition: None,
                        },
                    );
                }
                b"OCNT" | b"WCNT" => {
                    let field = frame.push(&label, FieldType::UInt16);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: false,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"ZCNT" => {
                    let field = frame.push(&label, FieldType::Int16);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: true,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"BCNT" => {
                    let field = frame.push(&label, FieldType::UInt8);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: false,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"BZCT" => {
                    let field = frame.push(&label, FieldType::Int8);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: true,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"LCNT" => {
                    let field = frame.push(&label, FieldType::UInt32);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: false,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"LZCT" => {
                    let field = frame.push(&label, FieldType::Int32);
                    pending = Some((
                        PendingCount::Counted {
                            field,
                            zero_based: true,
                        },
                        code_str,
                        offset,
                    ));
                }
                b"FCNT" => {
                    let count = parse_fixed_count(&label).ok_or_else(|| {
                        TemplateError::InvalidFixedCount {
                            label: label.clone(),
                            offset,
                        }
                    })?;
                    pending = Some((PendingCount::Fixed(count), code_str, offset));
                }
                b"CASE" => attach_case(frame, &label, offset)?,
                // Dividers only matter to editors.
                b"DVDR" => {}
                b"HEXD" => {
                    let byte = Template::new(vec![FieldDescriptor::new("byte", FieldType::UInt8)])?;
                    frame.push(
                        &label,
                        FieldType::Group {
                            fields: byte,
                            repeat: RepeatPolicy::UntilEnd,
                            condition: None,
                        },
                    );
                }
                _ => {
                    let field_type =
                        primitive_for_code(&code).ok_or_else(|| TemplateError::UnknownTmplCode {
                            code: code_str.clone(),
                            offset,
                        })?;
                    frame.push(&label, field_type);
                }
            }
        }

        if let Some((_, code, offset)) = pending {
            return Err(TemplateError::ExpectedListStart { code, offset });
        }

        let root = match stack.pop() {
            Some(frame) if stack.is_empty() && frame.list.is_none() => frame,
            Some(Frame {
                list: Some(list), ..
            }) => return Err(TemplateError::UnbalancedList { offset: list.offset }),
            _ => return Err(TemplateError::UnbalancedList { offset: data.len() }),
        };

        debug!("Loaded TMPL with {} top-level fields", root.fields.len());
        Template::new(root.fields)
    }
}

fn decode_label(bytes: &[u8]) -> String {
    encoding::all::MAC_ROMAN
        .decode(bytes, DecoderTrap::Replace)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn primitive_for_code(code: &[u8; 4]) -> Option<FieldType> {
    let field_type = match code {
        b"DBYT" => FieldType::Int8,
        b"DWRD" => FieldType::Int16,
        b"DLNG" => FieldType::Int32,
        b"DQWD" => FieldType::Int64,
        b"UBYT" | b"HBYT" => FieldType::UInt8,
        b"UWRD" | b"HWRD" => FieldType::UInt16,
        b"ULNG" | b"HLNG" => FieldType::UInt32,
        b"UQWD" | b"HQWD" => FieldType::UInt64,
        b"CHAR" => FieldType::FixedString { len: 1 },
        b"TNAM" => FieldType::FixedString { len: 4 },
        b"PSTR" => FieldType::PString,
        b"BFLG" => FieldType::Boolean { wide: false },
        b"BOOL" => FieldType::Boolean { wide: true },
        b"RECT" => FieldType::rect(),
        b"PNT " => FieldType::Composite {
            fields: Template::point(),
        },
        // `Cnnn`, `Hnnn` and `Pnnn` are fixed size fields of `nnn` (hex) bytes. Their contents are
        // kept verbatim.
        [b'C' | b'H' | b'P', digits @ ..] => {
            let digits = std::str::from_utf8(digits).ok()?;
            let len = usize::from_str_radix(digits, 16).ok()?;
            FieldType::FixedString { len }
        }
        _ => return None,
    };
    Some(field_type)
}

/// `FCNT` labels carry the count, either alone (`4`) or at the end (`Entries=4`, `Entries 4`).
fn parse_fixed_count(label: &str) -> Option<usize> {
    let digits: String = label
        .trim()
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Parses an integer written in decimal, `$hex` or `0xhex`.
fn parse_case_value(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        text.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

fn attach_case(frame: &mut Frame, label: &str, offset: usize) -> TemplateResult<()> {
    let invalid = || TemplateError::InvalidCase {
        label: label.to_owned(),
        offset,
    };
    let (name, value) = label
        .rsplit_once('=')
        .and_then(|(name, value)| Some((name.trim(), parse_case_value(value)?)))
        .ok_or_else(invalid)?;

    let field = frame
        .fields
        .last_mut()
        .ok_or(TemplateError::CaseWithoutField { offset })?;
    let base: IntType = field
        .field_type
        .int_type()
        .ok_or(TemplateError::CaseWithoutField { offset })?;

    let entry = EnumEntry::new(case_value(base, value).ok_or_else(invalid)?, name);
    match &mut field.field_type {
        FieldType::Enum { entries, .. } => entries.push(entry),
        other => {
            *other = FieldType::Enum {
                base,
                entries: vec![entry],
                bitmask: false,
            };
        }
    }
    Ok(())
}

/// `CASE` values are written without regard to signedness (`Max=255` on a `DBYT`). Values that fit
/// the field's width are read back the way the field decodes them.
fn case_value(base: IntType, value: i64) -> Option<i64> {
    let value = i128::from(value);
    let bits = base.width() * 8;
    if value < -(1_i128 << (bits - 1)) || value >= 1_i128 << bits {
        return None;
    }
    i64::try_from(base.from_bits(base.to_bits(value))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Condition;

    /// Assembles a `TMPL` resource from `(label, code)` pairs.
    fn tmpl(entries: &[(&str, &[u8; 4])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (label, code) in entries {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
            out.extend_from_slice(*code);
        }
        out
    }

    #[test]
    fn test_reads_flat_template() {
        let data = tmpl(&[
            ("Version", b"DWRD"),
            ("Flags", b"HLNG"),
            ("Creator", b"TNAM"),
            ("Name", b"PSTR"),
            ("Visible", b"BOOL"),
            ("Bounds", b"RECT"),
            ("Reserved", b"H00A"),
        ]);

        let template = Template::from_tmpl(&data).unwrap();
        let types: Vec<&FieldType> = template.fields().iter().map(|f| &f.field_type).collect();
        assert_eq!(
            types,
            vec![
                &FieldType::Int16,
                &FieldType::UInt32,
                &FieldType::FixedString { len: 4 },
                &FieldType::PString,
                &FieldType::Boolean { wide: true },
                &FieldType::rect(),
                &FieldType::FixedString { len: 10 },
            ]
        );
        assert_eq!(template.min_width(), 2 + 4 + 4 + 1 + 2 + 8 + 10);
    }

    #[test]
    fn test_reads_counted_list() {
        let data = tmpl(&[
            ("Number of strings", b"OCNT"),
            ("*****", b"LSTC"),
            ("The string", b"PSTR"),
            ("*****", b"LSTE"),
        ]);

        let template = Template::from_tmpl(&data).unwrap();
        assert_eq!(template.len(), 2);
        let group = &template.fields()[1];
        assert_eq!(group.name, "*****");
        match &group.field_type {
            FieldType::Group {
                fields,
                repeat,
                condition,
            } => {
                assert_eq!(
                    repeat,
                    &RepeatPolicy::Counted {
                        count_field: "Number of strings".to_owned(),
                        zero_based: false,
                    }
                );
                assert_eq!(condition, &None::<Condition>);
                assert_eq!(fields.fields()[0].name, "The string");
            }
            other => panic!("expected a group, got {:?}", other),
        }
    }

    #[test]
    fn test_case_entries_build_an_enum() {
        let data = tmpl(&[
            ("Style", b"UBYT"),
            ("Plain=0", b"CASE"),
            ("Bold=$01", b"CASE"),
            ("Italic=0x02", b"CASE"),
        ]);

        let template = Template::from_tmpl(&data).unwrap();
        assert_eq!(
            template.fields()[0].field_type,
            FieldType::Enum {
                base: IntType::UInt8,
                entries: vec![
                    EnumEntry::new(0, "Plain"),
                    EnumEntry::new(1, "Bold"),
                    EnumEntry::new(2, "Italic"),
                ],
                bitmask: false,
            }
        );
    }

    #[test]
    fn test_case_values_follow_the_field_width() {
        let data = tmpl(&[
            ("Delta", b"DBYT"),
            ("Max=255", b"CASE"),
            ("Min=-128", b"CASE"),
            ("Mask", b"UWRD"),
            ("All=-1", b"CASE"),
        ]);

        let template = Template::from_tmpl(&data).unwrap();
        let values = |index: usize| match &template.fields()[index].field_type {
            FieldType::Enum { entries, .. } => entries.iter().map(|e| e.value).collect::<Vec<_>>(),
            other => panic!("expected an enum, got {:?}", other),
        };
        assert_eq!(values(0), vec![-1, -128]);
        assert_eq!(values(1), vec![0xFFFF]);

        let err = Template::from_tmpl(&tmpl(&[("Delta", b"DBYT"), ("Big=256", b"CASE")]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidCase { offset: 10, .. }));

        let err = Template::from_tmpl(&tmpl(&[("Huge", b"UQWD"), ("Neg=-1", b"CASE")]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidCase { .. }));
    }

    #[test]
    fn test_duplicate_labels_are_numbered() {
        let data = tmpl(&[
            ("Reserved", b"DWRD"),
            ("Reserved", b"DWRD"),
            ("a.b", b"DBYT"),
            ("2", b"DBYT"),
        ]);
        let template = Template::from_tmpl(&data).unwrap();
        let names: Vec<&str> = template.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Reserved", "Reserved 2", "a_b", "_2"]);
    }

    #[test]
    fn test_fixed_and_nested_lists() {
        let data = tmpl(&[
            ("4", b"FCNT"),
            ("Rows", b"LSTC"),
            ("Cells", b"LSTZ"),
            ("Value", b"DBYT"),
            ("", b"LSTE"),
            ("", b"LSTE"),
        ]);

        let template = Template::from_tmpl(&data).unwrap();
        match &template.fields()[0].field_type {
            FieldType::Group { repeat, fields, .. } => {
                assert_eq!(repeat, &RepeatPolicy::Fixed { count: 4 });
                assert!(matches!(
                    fields.fields()[0].field_type,
                    FieldType::Group {
                        repeat: RepeatPolicy::ZeroTerminated,
                        ..
                    }
                ));
            }
            other => panic!("expected a group, got {:?}", other),
        }
        assert_eq!(template.min_width(), 4);
    }

    #[test]
    fn test_errors() {
        let err = Template::from_tmpl(&tmpl(&[("x", b"WHAT")])).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTmplCode { code, offset: 0 } if code == "WHAT"));

        let err = Template::from_tmpl(&tmpl(&[("n", b"OCNT"), ("x", b"DWRD")])).unwrap_err();
        assert!(matches!(err, TemplateError::ExpectedListStart { .. }));

        let err = Template::from_tmpl(&tmpl(&[("", b"LSTB"), ("x", b"DWRD")])).unwrap_err();
        assert!(matches!(err, TemplateError::UnbalancedList { offset: 0 }));

        let err = Template::from_tmpl(&tmpl(&[("", b"LSTE")])).unwrap_err();
        assert!(matches!(err, TemplateError::UnbalancedList { .. }));

        let err = Template::from_tmpl(&tmpl(&[("A=1", b"CASE")])).unwrap_err();
        assert!(matches!(err, TemplateError::CaseWithoutField { .. }));

        let err = Template::from_tmpl(&tmpl(&[("x", b"PSTR"), ("A=1", b"CASE")])).unwrap_err();
        assert!(matches!(err, TemplateError::CaseWithoutField { .. }));

        let mut truncated = tmpl(&[("Version", b"DWRD")]);
        truncated.pop();
        let err = Template::from_tmpl(&truncated).unwrap_err();
        assert!(matches!(err, TemplateError::TmplTruncated { .. }));
    }
}
