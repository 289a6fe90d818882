use crate::codec::{self, default_item, primitive, reconcile_fields};
use crate::err::{CodecError, Result};
use crate::events::{ChangeEvent, ChangeKind};
use crate::model::{FieldNode, FieldView, NodeContent, TypeTag, Value};
use crate::path::{FieldPath, Segment};
use crate::settings::CodecSettings;
use crate::template::{FieldDescriptor, FieldType, RepeatPolicy, Template};

use log::debug;
use std::mem;
use std::sync::Arc;

/// A resource decoded against a template.
///
/// The record owns its field tree and keeps a shared reference to the template. Edits go
/// through [`Record::set_value`] and friends, which validate the new value, keep count fields
/// and offsets consistent, and either apply completely or leave the record untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    template: Arc<Template>,
    root: FieldNode,
    trailing: Vec<u8>,
}

/// Where a path leads: the child positions from the root, and the descriptor of the final node
/// (absent for group items, which have no descriptor of their own).
struct Target<'t> {
    route: Vec<usize>,
    descriptor: Option<&'t FieldDescriptor>,
    /// The template that declares `descriptor`.
    owner: &'t Template,
}

#[derive(Clone, Copy)]
enum Scope<'t> {
    Fields(&'t Template),
    Items(&'t Template),
    Leaf,
}

impl Record {
    pub(crate) fn from_parts(template: Arc<Template>, root: FieldNode, trailing: Vec<u8>) -> Self {
        Record {
            template,
            root,
            trailing,
        }
    }

    pub fn decode(template: &Arc<Template>, buffer: &[u8]) -> Result<Record> {
        codec::decode(template, buffer)
    }

    pub fn decode_with(
        template: &Arc<Template>,
        buffer: &[u8],
        settings: &CodecSettings,
    ) -> Result<Record> {
        codec::decode_with(template, buffer, settings)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// The unnamed node holding the record's top-level fields.
    pub fn root(&self) -> &FieldNode {
        &self.root
    }

    /// Bytes after the last field, preserved verbatim.
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    /// Total encoded size.
    pub fn len(&self) -> usize {
        self.root.length() + self.trailing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, path: impl Into<FieldPath>) -> Result<&FieldNode> {
        let path = path.into();
        let target = self.resolve(&path)?;
        node_at(&self.root, &target.route).ok_or_else(|| CodecError::unknown_path(&path))
    }

    pub fn value(&self, path: impl Into<FieldPath>) -> Result<&Value> {
        let path = path.into();
        self.get(&path)?.value().ok_or_else(|| {
            CodecError::constraint(&path, "composite and group fields have no value of their own")
        })
    }

    /// Every node of the record in depth-first order, with its path. This is what a form editor
    /// binds its controls to.
    pub fn fields(&self) -> Vec<FieldView<'_>> {
        let mut views = Vec::new();
        collect_views(&self.root, &FieldPath::root(), &mut views);
        views
    }

    /// Replaces the value of the scalar at `path`.
    ///
    /// Integers must fit the field's type, strings its capacity. Count fields are derived from
    /// their group and cannot be set; use [`Record::insert_item`] and [`Record::remove_item`].
    pub fn set_value(&mut self, path: impl Into<FieldPath>, value: Value) -> Result<ChangeEvent> {
        let path = path.into();
        let template = Arc::clone(&self.template);
        let target = resolve(&template, &self.root, &path)?;
        let descriptor = scalar_descriptor(&target, &path)?;

        if let Some(group) = target.owner.group_counted_by(&descriptor.name) {
            return Err(CodecError::constraint(
                &path,
                format!(
                    "this count is derived from the number of items in `{}`",
                    group.name
                ),
            ));
        }

        let (value, label) = primitive::normalize(&descriptor.field_type, value, &path)?;

        let mut root = self.root.clone();
        let node = node_at_mut(&mut root, &target.route)
            .ok_or_else(|| CodecError::unknown_path(&path))?;
        let NodeContent::Scalar {
            value: slot,
            label: label_slot,
            raw,
        } = &mut node.content
        else {
            return Err(CodecError::unknown_path(&path));
        };

        let old = mem::replace(slot, value.clone());
        *label_slot = label;
        if old != value {
            *raw = None;
        }

        self.commit(root)?;
        debug!("Set `{}` from {} to {}", path, old, value);
        Ok(ChangeEvent::new(path, ChangeKind::Value { old, new: value }))
    }

    /// Parses `text` for the scalar at `path` and sets it, see [`Record::set_value`].
    pub fn set_text(
        &mut self,
        path: impl Into<FieldPath>,
        text: &str,
        settings: &CodecSettings,
    ) -> Result<ChangeEvent> {
        let path = path.into();
        let target = self.resolve(&path)?;
        let descriptor = scalar_descriptor(&target, &path)?;
        let value = primitive::parse_text(&descriptor.field_type, text, settings, &path)?;
        self.set_value(path, value)
    }

    /// Inserts a default-valued item at `index` of the group at `path` (`index` may equal the
    /// number of items, to append). The group's count field follows.
    pub fn insert_item(&mut self, path: impl Into<FieldPath>, index: usize) -> Result<ChangeEvent> {
        let path = path.into();
        let template = Arc::clone(&self.template);
        let target = resolve(&template, &self.root, &path)?;
        let fields = resizable_group(&target, &self.root, &path)?;

        let mut root = self.root.clone();
        let items = node_at_mut(&mut root, &target.route)
            .and_then(FieldNode::children_mut)
            .ok_or_else(|| CodecError::unknown_path(&path))?;
        if index > items.len() {
            return Err(CodecError::unknown_path(&path.index(index)));
        }
        items.insert(index, default_item(fields, index));

        self.commit(root)?;
        debug!("Inserted item {} into `{}`", index, path);
        Ok(ChangeEvent::new(path, ChangeKind::ItemInserted { index }))
    }

    /// Removes item `index` of the group at `path`.
    pub fn remove_item(&mut self, path: impl Into<FieldPath>, index: usize) -> Result<ChangeEvent> {
        let path = path.into();
        let template = Arc::clone(&self.template);
        let target = resolve(&template, &self.root, &path)?;
        resizable_group(&target, &self.root, &path)?;

        let mut root = self.root.clone();
        let items = node_at_mut(&mut root, &target.route)
            .and_then(FieldNode::children_mut)
            .ok_or_else(|| CodecError::unknown_path(&path))?;
        if index >= items.len() {
            return Err(CodecError::unknown_path(&path.index(index)));
        }
        items.remove(index);

        self.commit(root)?;
        debug!("Removed item {} from `{}`", index, path);
        Ok(ChangeEvent::new(path, ChangeKind::ItemRemoved { index }))
    }

    fn resolve(&self, path: &FieldPath) -> Result<Target<'_>> {
        resolve(&self.template, &self.root, path)
    }

    /// Re-derives counts and layout of an edited copy of the tree, and adopts it if that works.
    fn commit(&mut self, mut root: FieldNode) -> Result<()> {
        let top = FieldPath::root();
        let children = root
            .children_mut()
            .ok_or_else(|| CodecError::unknown_path(&top))?;
        let end = reconcile_fields(&self.template, children, 0, &top)?;
        root.length = end;
        self.root = root;
        Ok(())
    }
}

fn resolve<'t>(template: &'t Template, root: &FieldNode, path: &FieldPath) -> Result<Target<'t>> {
    let unknown = || CodecError::unknown_path(path);

    let mut node = root;
    let mut scope = Scope::Fields(template);
    let mut target = Target {
        route: Vec::with_capacity(path.segments().len()),
        descriptor: None,
        owner: template,
    };

    for segment in path.segments() {
        match (segment, scope) {
            (Segment::Name(name), Scope::Fields(fields)) => {
                let (position, descriptor) = fields.field(name).ok_or_else(unknown)?;
                node = node.children().get(position).ok_or_else(unknown)?;
                target.route.push(position);
                target.descriptor = Some(descriptor);
                target.owner = fields;
                scope = match &descriptor.field_type {
                    FieldType::Composite { fields } => Scope::Fields(fields),
                    FieldType::Group { fields, .. } => Scope::Items(fields),
                    _ => Scope::Leaf,
                };
            }
            (Segment::Index(index), Scope::Items(fields)) => {
                node = node.children().get(*index).ok_or_else(unknown)?;
                target.route.push(*index);
                target.descriptor = None;
                scope = Scope::Fields(fields);
            }
            _ => return Err(unknown()),
        }
    }

    Ok(target)
}

fn scalar_descriptor<'t>(target: &Target<'t>, path: &FieldPath) -> Result<&'t FieldDescriptor> {
    match target.descriptor {
        Some(descriptor) if descriptor.field_type.tag().is_scalar() => Ok(descriptor),
        _ => Err(CodecError::constraint(
            path,
            "composite and group fields have no value of their own",
        )),
    }
}

/// The item template of the group at `target`, if items may be added to or removed from it.
fn resizable_group<'t>(
    target: &Target<'t>,
    root: &FieldNode,
    path: &FieldPath,
) -> Result<&'t Template> {
    let Some(descriptor) = target.descriptor else {
        return Err(CodecError::constraint(path, "not a group"));
    };
    let FieldType::Group {
        fields,
        repeat,
        condition,
    } = &descriptor.field_type
    else {
        return Err(CodecError::constraint(path, "not a group"));
    };

    if let RepeatPolicy::Fixed { count } = repeat {
        return Err(CodecError::constraint(
            path,
            format!("group always holds exactly {count} items"),
        ));
    }

    if let Some(condition) = condition {
        let parent_route = &target.route[..target.route.len().saturating_sub(1)];
        let siblings = node_at(root, parent_route)
            .map(FieldNode::children)
            .unwrap_or_default();
        let present = codec::sibling_value(siblings, condition.field(), path, 0)
            .map(|value| condition.holds(value))?;
        if !present {
            return Err(CodecError::constraint(
                path,
                format!("group is absent, see `{}`", condition.field()),
            ));
        }
    }

    Ok(fields)
}

fn node_at<'n>(root: &'n FieldNode, route: &[usize]) -> Option<&'n FieldNode> {
    route
        .iter()
        .try_fold(root, |node, &i| node.children().get(i))
}

fn node_at_mut<'n>(root: &'n mut FieldNode, route: &[usize]) -> Option<&'n mut FieldNode> {
    route
        .iter()
        .try_fold(root, |node, &i| node.children_mut()?.get_mut(i))
}

fn collect_views<'a>(node: &'a FieldNode, path: &FieldPath, views: &mut Vec<FieldView<'a>>) {
    for (index, child) in node.children().iter().enumerate() {
        let child_path = match child.tag() {
            TypeTag::Item => path.index(index),
            _ => path.child(child.name()),
        };
        views.push(FieldView {
            path: child_path.clone(),
            tag: child.tag(),
            value: child.value(),
            label: child.label(),
            offset: child.offset(),
            length: child.length(),
        });
        collect_views(child, &child_path, views);
    }
}
