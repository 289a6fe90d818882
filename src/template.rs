//! Templates: declarative descriptions of a resource's binary layout.
//!
//! A [`Template`] is an ordered list of [`FieldDescriptor`]s. Templates are validated when they
//! are built (or deserialized), are immutable afterwards, and are meant to be shared behind an
//! `Arc` by every record decoded against them.
//!
//! Templates can be written by hand, deserialized from JSON:
//!
//! ```
//! use restmpl::Template;
//!
//! let template = Template::from_json(r#"[
//!     {"name": "count", "type": "uint16"},
//!     {"name": "strings", "type": "group",
//!      "repeat": {"kind": "counted", "count_field": "count"},
//!      "fields": [{"name": "text", "type": "pstring"}]}
//! ]"#).unwrap();
//! assert_eq!(template.len(), 2);
//! ```
//!
//! or loaded from a binary ResEdit `TMPL` resource with [`Template::from_tmpl`].

mod tmpl;

use crate::err::{TemplateError, TemplateResult};
use crate::model::{TypeTag, Value};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Width and signedness of an integer field. Byte order is always big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntType {
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint64")]
    UInt64,
}

impl IntType {
    pub fn width(self) -> usize {
        match self {
            IntType::Int8 | IntType::UInt8 => 1,
            IntType::Int16 | IntType::UInt16 => 2,
            IntType::Int32 | IntType::UInt32 => 4,
            IntType::Int64 | IntType::UInt64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntType::Int8 | IntType::Int16 | IntType::Int32 | IntType::Int64
        )
    }

    pub fn min(self) -> i128 {
        if self.is_signed() {
            -(1_i128 << (self.width() * 8 - 1))
        } else {
            0
        }
    }

    pub fn max(self) -> i128 {
        if self.is_signed() {
            (1_i128 << (self.width() * 8 - 1)) - 1
        } else {
            (1_i128 << (self.width() * 8)) - 1
        }
    }

    pub fn contains(self, value: i128) -> bool {
        (self.min()..=self.max()).contains(&value)
    }

    pub fn tag(self) -> TypeTag {
        match self {
            IntType::Int8 => TypeTag::Int8,
            IntType::UInt8 => TypeTag::UInt8,
            IntType::Int16 => TypeTag::Int16,
            IntType::UInt16 => TypeTag::UInt16,
            IntType::Int32 => TypeTag::Int32,
            IntType::UInt32 => TypeTag::UInt32,
            IntType::Int64 => TypeTag::Int64,
            IntType::UInt64 => TypeTag::UInt64,
        }
    }

    fn mask(self) -> u64 {
        u64::MAX >> (64 - self.width() * 8)
    }

    /// Interprets the low `width` bytes of `bits` as a value of this type.
    pub(crate) fn from_bits(self, bits: u64) -> i128 {
        let bits = bits & self.mask();
        match self {
            IntType::Int8 => i128::from(bits as u8 as i8),
            IntType::Int16 => i128::from(bits as u16 as i16),
            IntType::Int32 => i128::from(bits as u32 as i32),
            IntType::Int64 => i128::from(bits as i64),
            _ => i128::from(bits),
        }
    }

    /// Two's complement bit pattern of an in-range `value`.
    pub(crate) fn to_bits(self, value: i128) -> u64 {
        (value as u64) & self.mask()
    }

    /// Wraps an in-range `value` in the [`Value`] variant matching this type's signedness.
    pub(crate) fn value(self, value: i128) -> Value {
        if self.is_signed() {
            Value::Int(value as i64)
        } else {
            Value::UInt(value as u64)
        }
    }
}

/// One entry of an enum's name table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: i64,
    pub name: String,
}

impl EnumEntry {
    pub fn new(value: i64, name: impl Into<String>) -> Self {
        EnumEntry {
            value,
            name: name.into(),
        }
    }
}

/// How many times a group's sub-template repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Exactly `count` repetitions.
    Fixed { count: usize },
    /// The number of repetitions is stored in an earlier integer field of the same record.
    /// A zero-based count stores `items - 1`.
    Counted {
        count_field: String,
        #[serde(default)]
        zero_based: bool,
    },
    /// Repeat until the end of the buffer.
    UntilEnd,
    /// Repeat until a `0x00` byte is found where the next repetition would start.
    ZeroTerminated,
}

/// Decides whether a conditional group is present, based on an earlier field of the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Condition {
    Equals { field: String, value: i64 },
    NonZero { field: String },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Equals { field, .. } | Condition::NonZero { field } => field,
        }
    }

    pub(crate) fn holds(&self, value: &Value) -> bool {
        let n = match value {
            Value::Bool(b) => i128::from(*b),
            other => other.as_i128().unwrap_or_default(),
        };
        match self {
            Condition::Equals { value, .. } => n == i128::from(*value),
            Condition::NonZero { .. } => n != 0,
        }
    }
}

/// The type of a field, with its type-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint64")]
    UInt64,
    /// A character array of exactly `len` bytes, kept verbatim (NULs included).
    FixedString { len: usize },
    /// A string with a one byte length prefix.
    #[serde(rename = "pstring")]
    PString,
    /// A byte (or a word, when `wide`) where zero is false and anything else is true.
    Boolean {
        #[serde(default)]
        wide: bool,
    },
    /// An integer with a name table. A `bitmask` enum names individual bits.
    Enum {
        base: IntType,
        #[serde(default)]
        entries: Vec<EnumEntry>,
        #[serde(default)]
        bitmask: bool,
    },
    Composite { fields: Template },
    Group {
        fields: Template,
        repeat: RepeatPolicy,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
}

impl FieldType {
    pub fn int(int_type: IntType) -> Self {
        match int_type {
            IntType::Int8 => FieldType::Int8,
            IntType::UInt8 => FieldType::UInt8,
            IntType::Int16 => FieldType::Int16,
            IntType::UInt16 => FieldType::UInt16,
            IntType::Int32 => FieldType::Int32,
            IntType::UInt32 => FieldType::UInt32,
            IntType::Int64 => FieldType::Int64,
            IntType::UInt64 => FieldType::UInt64,
        }
    }

    /// The classic QuickDraw rectangle: `top, left, bottom, right`, four signed words.
    pub fn rect() -> Self {
        FieldType::Composite {
            fields: Template::rect(),
        }
    }

    /// The integer layout of integer and enum fields.
    pub fn int_type(&self) -> Option<IntType> {
        match self {
            FieldType::Int8 => Some(IntType::Int8),
            FieldType::UInt8 => Some(IntType::UInt8),
            FieldType::Int16 => Some(IntType::Int16),
            FieldType::UInt16 => Some(IntType::UInt16),
            FieldType::Int32 => Some(IntType::Int32),
            FieldType::UInt32 => Some(IntType::UInt32),
            FieldType::Int64 => Some(IntType::Int64),
            FieldType::UInt64 => Some(IntType::UInt64),
            FieldType::Enum { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            FieldType::Int8 => TypeTag::Int8,
            FieldType::UInt8 => TypeTag::UInt8,
            FieldType::Int16 => TypeTag::Int16,
            FieldType::UInt16 => TypeTag::UInt16,
            FieldType::Int32 => TypeTag::Int32,
            FieldType::UInt32 => TypeTag::UInt32,
            FieldType::Int64 => TypeTag::Int64,
            FieldType::UInt64 => TypeTag::UInt64,
            FieldType::FixedString { .. } => TypeTag::FixedString,
            FieldType::PString => TypeTag::PString,
            FieldType::Boolean { .. } => TypeTag::Boolean,
            FieldType::Enum { .. } => TypeTag::Enum,
            FieldType::Composite { .. } => TypeTag::Composite,
            FieldType::Group { .. } => TypeTag::Group,
        }
    }

    /// The smallest number of bytes a field of this type can occupy.
    pub fn min_width(&self) -> usize {
        match self {
            FieldType::FixedString { len } => *len,
            FieldType::PString => 1,
            FieldType::Boolean { wide: false } => 1,
            FieldType::Boolean { wide: true } => 2,
            FieldType::Composite { fields } => fields.min_width(),
            FieldType::Group {
                condition: Some(_), ..
            } => 0,
            FieldType::Group { fields, repeat, .. } => match repeat {
                RepeatPolicy::Fixed { count } => count.saturating_mul(fields.min_width()),
                RepeatPolicy::Counted { .. } | RepeatPolicy::UntilEnd => 0,
                RepeatPolicy::ZeroTerminated => 1,
            },
            other => other.int_type().map(IntType::width).unwrap_or_default(),
        }
    }

    /// Bytes plus nodes of a field filled with default values, `None` on overflow.
    fn footprint(&self) -> Option<usize> {
        match self {
            FieldType::Composite { fields } => fields.footprint(),
            FieldType::Group {
                fields,
                repeat: RepeatPolicy::Fixed { count },
                ..
            } => count.checked_mul(fields.footprint()?)?.checked_add(1),
            FieldType::Group { .. } => Some(1),
            other => other.min_width().checked_add(1),
        }
    }

    /// Whether a condition may test a field of this type.
    fn is_testable(&self) -> bool {
        self.int_type().is_some() || matches!(self, FieldType::Boolean { .. })
    }
}

/// Best-effort symbolic name of `raw` in an enum's name table.
pub(crate) fn enum_label(
    base: IntType,
    entries: &[EnumEntry],
    bitmask: bool,
    raw: i128,
) -> Option<String> {
    if !bitmask {
        return entries
            .iter()
            .find(|e| i128::from(e.value) == raw)
            .map(|e| e.name.clone());
    }

    let bits = base.to_bits(raw);
    if bits == 0 {
        return entries
            .iter()
            .find(|e| e.value == 0)
            .map(|e| e.name.clone());
    }

    let mut names = Vec::new();
    let mut covered = 0_u64;
    for entry in entries {
        let mask = base.to_bits(i128::from(entry.value));
        if mask != 0 && bits & mask == mask {
            names.push(entry.name.as_str());
            covered |= mask;
        }
    }

    if names.is_empty() {
        return None;
    }

    let mut label = names.join("|");
    let leftover = bits & !covered;
    if leftover != 0 {
        label.push_str(&format!("|0x{leftover:X}"));
    }
    Some(label)
}

/// One named, typed entry of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            field_type,
        }
    }
}

/// Cap on the default-filled footprint (bytes plus nodes) of a template. Fixed groups are filled on
/// edits, so their size has to be bounded up front.
const MAX_FOOTPRINT: usize = 1 << 20;

/// An ordered, validated sequence of field descriptors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldDescriptor>", into = "Vec<FieldDescriptor>")]
pub struct Template {
    fields: Vec<FieldDescriptor>,
}

impl Template {
    /// Builds a template, checking that:
    /// - names are non-empty, unique among siblings and free of `.`, `[` and `]`,
    /// - count fields and condition fields name an *earlier* sibling of a suitable type,
    /// - no count field is shared by two groups,
    /// - no name reads as an item index (`2`),
    /// - a record filled with default values stays under a mebibyte.
    ///
    /// Nested templates are validated when they are built themselves.
    pub fn new(fields: Vec<FieldDescriptor>) -> TemplateResult<Self> {
        validate(&fields)?;
        Ok(Template { fields })
    }

    /// `top, left, bottom, right`: four signed big-endian words.
    pub fn rect() -> Self {
        Template {
            fields: ["top", "left", "bottom", "right"]
                .into_iter()
                .map(|name| FieldDescriptor::new(name, FieldType::Int16))
                .collect(),
        }
    }

    /// `v, h`: a QuickDraw point.
    pub fn point() -> Self {
        Template {
            fields: ["v", "h"]
                .into_iter()
                .map(|name| FieldDescriptor::new(name, FieldType::Int16))
                .collect(),
        }
    }

    /// Reads and validates a template written as a JSON array of field descriptors.
    pub fn from_json(json: &str) -> TemplateResult<Arc<Template>> {
        let template: Template = serde_json::from_str(json)?;
        Ok(Arc::new(template))
    }

    pub fn to_json(&self) -> TemplateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position and descriptor of the field called `name`.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// The group whose count is stored in the field called `name`, if any.
    pub fn group_counted_by(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| {
            matches!(
                &f.field_type,
                FieldType::Group { repeat: RepeatPolicy::Counted { count_field, .. }, .. }
                    if count_field == name
            )
        })
    }

    fn footprint(&self) -> Option<usize> {
        self.fields
            .iter()
            .try_fold(1_usize, |acc, f| acc.checked_add(f.field_type.footprint()?))
    }

    /// The smallest number of bytes a buffer needs for this template to decode.
    pub fn min_width(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.field_type.min_width())
            .fold(0, usize::saturating_add)
    }
}

/// Checks one level of a template, see [`Template::new`].
fn validate(fields: &[FieldDescriptor]) -> TemplateResult<()> {
    let mut seen: HashMap<&str, &FieldType> = HashMap::with_capacity(fields.len());
    let mut count_fields: HashSet<&str> = HashSet::new();
    let mut footprint = 0_usize;

    for field in fields {
        if field.name.is_empty() {
            return Err(TemplateError::EmptyFieldName);
        }
        if field.name.contains(['.', '[', ']']) {
            return Err(TemplateError::InvalidFieldName {
                name: field.name.clone(),
            });
        }
        // Paths read an all-digit segment as an item index.
        if field.name.parse::<usize>().is_ok() {
            return Err(TemplateError::NumericFieldName {
                name: field.name.clone(),
            });
        }

        footprint = field
            .field_type
            .footprint()
            .and_then(|n| footprint.checked_add(n))
            .filter(|n| *n <= MAX_FOOTPRINT)
            .ok_or_else(|| TemplateError::TooLarge {
                name: field.name.clone(),
            })?;

        if let FieldType::Group {
            repeat, condition, ..
        } = &field.field_type
        {
            if let RepeatPolicy::Counted { count_field, .. } = repeat {
                match seen.get(count_field.as_str()) {
                    None => {
                        return Err(TemplateError::UnknownReference {
                            group: field.name.clone(),
                            reference: count_field.clone(),
                        });
                    }
                    Some(ty) if ty.int_type().is_none() => {
                        return Err(TemplateError::NotAnInteger {
                            group: field.name.clone(),
                            reference: count_field.clone(),
                        });
                    }
                    Some(_) => {}
                }
                if !count_fields.insert(count_field.as_str()) {
                    return Err(TemplateError::SharedCountField {
                        reference: count_field.clone(),
                    });
                }
            }

            if let Some(condition) = condition {
                match seen.get(condition.field()) {
                    None => {
                        return Err(TemplateError::UnknownReference {
                            group: field.name.clone(),
                            reference: condition.field().to_owned(),
                        });
                    }
                    Some(ty) if !ty.is_testable() => {
                        return Err(TemplateError::NotAnInteger {
                            group: field.name.clone(),
                            reference: condition.field().to_owned(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        if seen.insert(field.name.as_str(), &field.field_type).is_some() {
            return Err(TemplateError::DuplicateField {
                name: field.name.clone(),
            });
        }
    }

    Ok(())
}

impl TryFrom<Vec<FieldDescriptor>> for Template {
    type Error = TemplateError;

    fn try_from(fields: Vec<FieldDescriptor>) -> TemplateResult<Self> {
        Template::new(fields)
    }
}

impl From<Template> for Vec<FieldDescriptor> {
    fn from(template: Template) -> Self {
        template.fields
    }
}
