use super::{decode_field, encode_field, group, primitive, sibling_value};
use crate::err::{CodecError, Result};
use crate::model::{FieldNode, NodeContent, TypeTag, Value};
use crate::path::FieldPath;
use crate::template::{FieldDescriptor, FieldType, RepeatPolicy, Template};
use crate::utils::ByteCursor;

use log::trace;

/// Decodes the fields of `template` in order. Used for the record itself, composites and each
/// group item.
pub(super) fn decode_fields(
    cursor: &mut ByteCursor,
    template: &Template,
    parent: &FieldPath,
) -> Result<Vec<FieldNode>> {
    let mut nodes = Vec::with_capacity(template.len());
    for descriptor in template.fields() {
        let path = parent.child(&descriptor.name);
        let node = decode_field(cursor, descriptor, &nodes, &path)?;
        nodes.push(node);
    }
    Ok(nodes)
}

pub(super) fn encode_fields(
    out: &mut Vec<u8>,
    template: &Template,
    nodes: &[FieldNode],
    parent: &FieldPath,
) -> Result<()> {
    check_shape(template, nodes, parent, out.len())?;
    let counts = derived_counts(template, nodes, parent, out.len())?;

    for (descriptor, node) in template.fields().iter().zip(nodes) {
        let path = parent.child(&descriptor.name);
        let count = counts
            .iter()
            .find(|(field, _)| *field == descriptor.name)
            .map(|(_, n)| *n);
        encode_field(out, descriptor, node, nodes, &path, count)?;
    }
    Ok(())
}

/// Fields of a freshly inserted group item. Groups start out empty; [`reconcile_fields`] fills
/// in fixed-size groups.
pub(crate) fn default_fields(template: &Template) -> Vec<FieldNode> {
    template
        .fields()
        .iter()
        .map(|descriptor| match &descriptor.field_type {
            FieldType::Composite { fields } => {
                FieldNode::branch(&descriptor.name, TypeTag::Composite, default_fields(fields))
            }
            FieldType::Group { .. } => {
                FieldNode::branch(&descriptor.name, TypeTag::Group, Vec::new())
            }
            scalar => primitive::default_node(&descriptor.name, scalar),
        })
        .collect()
}

/// Brings `nodes` back in line with `template` after an edit, starting at byte `start`:
///
/// - conditional groups are emptied or filled according to their condition,
/// - fixed-size groups get exactly their number of items,
/// - count fields are set to the number of items of their group,
/// - every offset and length is recomputed.
///
/// Returns the offset just past the last field.
pub(crate) fn reconcile_fields(
    template: &Template,
    nodes: &mut [FieldNode],
    start: usize,
    parent: &FieldPath,
) -> Result<usize> {
    check_shape(template, nodes, parent, start)?;

    let mut offset = start;
    for (i, descriptor) in template.fields().iter().enumerate() {
        let path = parent.child(&descriptor.name);
        let (before, rest) = nodes.split_at_mut(i);
        let Some(node) = rest.first_mut() else {
            return Err(CodecError::unknown_path(&path));
        };

        let end = match &descriptor.field_type {
            FieldType::Composite { fields } => {
                let children = node
                    .children_mut()
                    .ok_or_else(|| CodecError::mismatch(&path, offset, "composite holds a value"))?;
                reconcile_fields(fields, children, offset, &path)?
            }
            FieldType::Group { fields, repeat, .. } => {
                let included = is_included(descriptor, before, &path, offset)?;
                group::reconcile(node, fields, repeat, included, offset, &path)?
            }
            scalar => {
                let len = node
                    .value()
                    .map(|value| primitive::encoded_len(scalar, value))
                    .unwrap_or_default();
                offset + len
            }
        };

        node.offset = offset;
        node.length = end - offset;
        offset = end;
    }

    for (count_field, count) in derived_counts(template, nodes, parent, start)? {
        sync_count(template, nodes, count_field, count, parent)?;
    }

    Ok(offset)
}

/// Whether a group's condition, if any, holds for the current sibling values.
pub(super) fn is_included(
    descriptor: &FieldDescriptor,
    siblings: &[FieldNode],
    path: &FieldPath,
    offset: usize,
) -> Result<bool> {
    match &descriptor.field_type {
        FieldType::Group {
            condition: Some(condition),
            ..
        } => Ok(condition.holds(sibling_value(
            siblings,
            condition.field(),
            path,
            offset,
        )?)),
        _ => Ok(true),
    }
}

/// For each counted group present in `nodes`: its count field and the value that field must
/// hold.
fn derived_counts<'t>(
    template: &'t Template,
    nodes: &[FieldNode],
    parent: &FieldPath,
    offset: usize,
) -> Result<Vec<(&'t str, i128)>> {
    let mut counts = Vec::new();
    for (descriptor, node) in template.fields().iter().zip(nodes) {
        let FieldType::Group {
            repeat:
                RepeatPolicy::Counted {
                    count_field,
                    zero_based,
                },
            ..
        } = &descriptor.field_type
        else {
            continue;
        };

        // An absent group leaves its count field alone.
        if !is_included(descriptor, nodes, &parent.child(&descriptor.name), offset)? {
            continue;
        }

        let items = node.children().len() as i128;
        counts.push((count_field.as_str(), items - i128::from(*zero_based)));
    }
    Ok(counts)
}

fn sync_count(
    template: &Template,
    nodes: &mut [FieldNode],
    count_field: &str,
    count: i128,
    parent: &FieldPath,
) -> Result<()> {
    let path = parent.child(count_field);
    let (position, descriptor) = template
        .field(count_field)
        .ok_or_else(|| CodecError::unknown_path(&path))?;
    let node = nodes
        .get_mut(position)
        .ok_or_else(|| CodecError::unknown_path(&path))?;

    if node.value().and_then(|v| v.as_i128()) == Some(count) {
        return Ok(());
    }

    let group = template
        .group_counted_by(count_field)
        .map(|group| parent.child(&group.name))
        .unwrap_or_else(|| path.clone());
    let (value, label) = primitive::normalize(
        &descriptor.field_type,
        Value::Int(count as i64),
        &path,
    )
    .map_err(|_| CodecError::InvalidRepeatCount {
        path: group,
        offset: node.offset(),
        count,
    })?;

    trace!("Count field `{}` now holds {}", path, value);
    node.content = NodeContent::Scalar {
        value,
        label,
        raw: None,
    };
    Ok(())
}

fn check_shape(
    template: &Template,
    nodes: &[FieldNode],
    parent: &FieldPath,
    offset: usize,
) -> Result<()> {
    if nodes.len() != template.len() {
        return Err(CodecError::mismatch(
            parent,
            offset,
            format!(
                "record holds {} fields, template declares {}",
                nodes.len(),
                template.len()
            ),
        ));
    }

    match template
        .fields()
        .iter()
        .zip(nodes)
        .find(|(descriptor, node)| descriptor.name != node.name())
    {
        Some((descriptor, node)) => Err(CodecError::mismatch(
            parent,
            node.offset(),
            format!("found field `{}` where `{}` was expected", node.name(), descriptor.name),
        )),
        None => Ok(()),
    }
}
