use super::{composite, sibling_value};
use crate::err::{CodecError, Result};
use crate::model::{FieldNode, TypeTag};
use crate::path::FieldPath;
use crate::template::{Condition, RepeatPolicy, Template};
use crate::utils::ByteCursor;

use log::trace;

pub(super) fn decode(
    cursor: &mut ByteCursor,
    name: &str,
    fields: &Template,
    repeat: &RepeatPolicy,
    condition: Option<&Condition>,
    siblings: &[FieldNode],
    path: &FieldPath,
) -> Result<FieldNode> {
    if let Some(condition) = condition {
        let value = sibling_value(siblings, condition.field(), path, cursor.pos())?;
        if !condition.holds(value) {
            trace!("Group `{}` is absent (`{}` = {})", path, condition.field(), value);
            return Ok(FieldNode::branch(name, TypeTag::Group, Vec::new()));
        }
    }

    let mut items = Vec::new();
    match repeat {
        RepeatPolicy::Fixed { count } => {
            let count = checked_count(cursor, *count as i128, fields, path)?;
            for index in 0..count {
                items.push(decode_item(cursor, fields, path, index)?);
            }
        }
        RepeatPolicy::Counted {
            count_field,
            zero_based,
        } => {
            let stored = sibling_value(siblings, count_field, path, cursor.pos())?
                .as_i128()
                .ok_or_else(|| {
                    CodecError::mismatch(
                        path,
                        cursor.pos(),
                        format!("count field `{count_field}` is not an integer"),
                    )
                })?;
            let count = if *zero_based { stored + 1 } else { stored };
            let count = checked_count(cursor, count, fields, path)?;
            trace!("Group `{}` repeats {} times", path, count);
            for index in 0..count {
                items.push(decode_item(cursor, fields, path, index)?);
            }
        }
        RepeatPolicy::UntilEnd => {
            while !cursor.is_at_end() {
                let item = decode_progressing_item(cursor, fields, path, items.len())?;
                items.push(item);
            }
        }
        RepeatPolicy::ZeroTerminated => loop {
            match cursor.peek_u8() {
                None => {
                    return Err(CodecError::mismatch(
                        path,
                        cursor.pos(),
                        "list ended without its terminating zero byte",
                    ));
                }
                Some(0) => {
                    cursor
                        .u8_named("list terminator")
                        .map_err(|e| CodecError::truncated(path, e))?;
                    break;
                }
                Some(_) => {
                    let item = decode_progressing_item(cursor, fields, path, items.len())?;
                    items.push(item);
                }
            }
        },
    }

    Ok(FieldNode::branch(name, TypeTag::Group, items))
}

pub(super) fn encode(
    out: &mut Vec<u8>,
    fields: &Template,
    repeat: &RepeatPolicy,
    included: bool,
    node: &FieldNode,
    path: &FieldPath,
) -> Result<()> {
    let items = node.children();
    if !included {
        return Ok(());
    }

    if let RepeatPolicy::Fixed { count } = repeat {
        if items.len() != *count {
            return Err(CodecError::InvalidRepeatCount {
                path: path.clone(),
                offset: node.offset(),
                count: items.len() as i128,
            });
        }
    }

    for (index, item) in items.iter().enumerate() {
        let item_path = path.index(index);
        let start = out.len();
        composite::encode_fields(out, fields, item.children(), &item_path)?;

        if *repeat == RepeatPolicy::ZeroTerminated && out.get(start) == Some(&0) {
            return Err(CodecError::constraint(
                &item_path,
                "items of a zero-terminated list cannot start with a zero byte",
            ));
        }
    }

    if *repeat == RepeatPolicy::ZeroTerminated {
        out.push(0);
    }
    Ok(())
}

/// Re-lays out a group starting at `offset` and returns the offset just past it.
pub(super) fn reconcile(
    node: &mut FieldNode,
    fields: &Template,
    repeat: &RepeatPolicy,
    included: bool,
    offset: usize,
    path: &FieldPath,
) -> Result<usize> {
    let items = node
        .children_mut()
        .ok_or_else(|| CodecError::mismatch(path, offset, "group holds a value"))?;

    if !included {
        items.clear();
        return Ok(offset);
    }

    if let RepeatPolicy::Fixed { count } = repeat {
        items.truncate(*count);
        while items.len() < *count {
            items.push(default_item(fields, items.len()));
        }
    }

    let mut pos = offset;
    for (index, item) in items.iter_mut().enumerate() {
        let item_path = path.index(index);
        let children = item
            .children_mut()
            .ok_or_else(|| CodecError::mismatch(&item_path, pos, "group item holds a value"))?;
        let end = composite::reconcile_fields(fields, children, pos, &item_path)?;

        item.name = index.to_string();
        item.offset = pos;
        item.length = end - pos;
        pos = end;
    }

    if *repeat == RepeatPolicy::ZeroTerminated {
        pos += 1;
    }
    Ok(pos)
}

/// A new item with every field at its default value.
pub(crate) fn default_item(fields: &Template, index: usize) -> FieldNode {
    FieldNode::branch(
        &index.to_string(),
        TypeTag::Item,
        composite::default_fields(fields),
    )
}

/// Rejects counts that are negative or that could not possibly fit in the remaining bytes,
/// before anything is allocated for them.
fn checked_count(
    cursor: &ByteCursor,
    count: i128,
    fields: &Template,
    path: &FieldPath,
) -> Result<usize> {
    let invalid = || CodecError::InvalidRepeatCount {
        path: path.clone(),
        offset: cursor.pos(),
        count,
    };

    let per_item = i128::try_from(fields.min_width().max(1)).unwrap_or(i128::MAX);
    let needed = count.checked_mul(per_item).ok_or_else(invalid)?;
    if count < 0 || needed > cursor.remaining() as i128 {
        return Err(invalid());
    }
    usize::try_from(count).map_err(|_| invalid())
}

fn decode_item(
    cursor: &mut ByteCursor,
    fields: &Template,
    path: &FieldPath,
    index: usize,
) -> Result<FieldNode> {
    let start = cursor.pos();
    let children = composite::decode_fields(cursor, fields, &path.index(index))?;
    Ok(
        FieldNode::branch(&index.to_string(), TypeTag::Item, children)
            .at(start, cursor.pos() - start),
    )
}

/// Decodes an item of an end-bounded list, failing if it consumes nothing (which would repeat
/// forever).
fn decode_progressing_item(
    cursor: &mut ByteCursor,
    fields: &Template,
    path: &FieldPath,
    index: usize,
) -> Result<FieldNode> {
    let start = cursor.pos();
    let item = decode_item(cursor, fields, path, index)?;
    if cursor.pos() == start {
        return Err(CodecError::InvalidRepeatCount {
            path: path.clone(),
            offset: start,
            count: index as i128 + 1,
        });
    }
    Ok(item)
}
