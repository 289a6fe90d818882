//! The template interpreter.
//!
//! Decoding walks a [`Template`] and a [`ByteCursor`] in lockstep, producing a [`FieldNode`]
//! tree that records the offset and length of every field. Encoding walks the template and the
//! tree and writes the fields back in template order.

mod composite;
mod group;
pub(crate) mod primitive;

use crate::err::{CodecError, Result};
use crate::model::{FieldNode, TypeTag, Value};
use crate::path::FieldPath;
use crate::record::Record;
use crate::settings::CodecSettings;
use crate::template::{FieldDescriptor, FieldType, Template};
use crate::utils::ByteCursor;

use log::{debug, trace};
use std::sync::Arc;

pub(crate) use composite::reconcile_fields;
pub(crate) use group::default_item;

/// Decodes `buffer` against `template` with the default settings.
///
/// Bytes left over after the last field are kept verbatim and written back by [`encode`].
pub fn decode(template: &Arc<Template>, buffer: &[u8]) -> Result<Record> {
    decode_with(template, buffer, &CodecSettings::default())
}

pub(crate) fn decode_with(
    template: &Arc<Template>,
    buffer: &[u8],
    settings: &CodecSettings,
) -> Result<Record> {
    let root = FieldPath::root();
    let mut cursor = ByteCursor::new(buffer);

    let children = composite::decode_fields(&mut cursor, template, &root)?;
    let consumed = cursor.pos();
    let trailing = cursor.rest();

    if !trailing.is_empty() {
        if settings.is_strict() {
            return Err(CodecError::mismatch(
                &root,
                consumed,
                format!(
                    "{} trailing bytes are not described by the template",
                    trailing.len()
                ),
            ));
        }
        debug!(
            "Template consumed {} of {} bytes, keeping {} trailing bytes",
            consumed,
            buffer.len(),
            trailing.len()
        );
    }

    let node = FieldNode::branch("", TypeTag::Composite, children).at(0, consumed);
    Ok(Record::from_parts(
        Arc::clone(template),
        node,
        trailing.to_vec(),
    ))
}

/// Serializes `record` back into bytes.
///
/// A record that was decoded and not modified encodes to exactly the bytes it was decoded from.
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let root = record.root();
    let mut out = Vec::with_capacity(root.length() + record.trailing().len());

    composite::encode_fields(&mut out, record.template(), root.children(), &FieldPath::root())?;
    out.extend_from_slice(record.trailing());

    trace!("Encoded record into {} bytes", out.len());
    Ok(out)
}

/// Decodes a single field. `siblings` are the already decoded fields of the enclosing record,
/// for groups that refer to a count or condition field.
fn decode_field(
    cursor: &mut ByteCursor,
    descriptor: &FieldDescriptor,
    siblings: &[FieldNode],
    path: &FieldPath,
) -> Result<FieldNode> {
    let start = cursor.pos();
    trace!(
        "Offset {}: decoding `{}` as {}",
        start,
        path,
        descriptor.field_type.tag()
    );

    if descriptor.field_type.min_width() > 0 && cursor.is_at_end() {
        return Err(CodecError::mismatch(
            path,
            start,
            "buffer ended before this field",
        ));
    }

    let node = match &descriptor.field_type {
        FieldType::Composite { fields } => FieldNode::branch(
            &descriptor.name,
            TypeTag::Composite,
            composite::decode_fields(cursor, fields, path)?,
        ),
        FieldType::Group {
            fields,
            repeat,
            condition,
        } => group::decode(
            cursor,
            &descriptor.name,
            fields,
            repeat,
            condition.as_ref(),
            siblings,
            path,
        )?,
        scalar => primitive::decode(cursor, &descriptor.name, scalar, path)?,
    };

    Ok(node.at(start, cursor.pos() - start))
}

/// Encodes a single field. `count` replaces the stored value of a count field by the number
/// derived from its group.
fn encode_field(
    out: &mut Vec<u8>,
    descriptor: &FieldDescriptor,
    node: &FieldNode,
    siblings: &[FieldNode],
    path: &FieldPath,
    count: Option<i128>,
) -> Result<()> {
    let expected = descriptor.field_type.tag();
    if node.tag() != expected {
        return Err(CodecError::mismatch(
            path,
            out.len(),
            format!("node is a {}, template declares a {}", node.tag(), expected),
        ));
    }

    match &descriptor.field_type {
        FieldType::Composite { fields } => {
            composite::encode_fields(out, fields, node.children(), path)
        }
        FieldType::Group { fields, repeat, .. } => {
            let included = composite::is_included(descriptor, siblings, path, out.len())?;
            group::encode(out, fields, repeat, included, node, path)
        }
        scalar => primitive::encode(out, scalar, node, path, count),
    }
}

/// The value of the sibling scalar called `name`.
pub(crate) fn sibling_value<'n>(
    siblings: &'n [FieldNode],
    name: &str,
    path: &FieldPath,
    offset: usize,
) -> Result<&'n Value> {
    siblings
        .iter()
        .find(|node| node.name() == name)
        .and_then(FieldNode::value)
        .ok_or_else(|| {
            CodecError::mismatch(path, offset, format!("referenced field `{name}` is missing"))
        })
}
