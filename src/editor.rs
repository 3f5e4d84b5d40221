//! Pure edit operations on [`SchemaDocument`].
//!
//! Every function takes the current document by reference and returns a new
//! one; inputs are never mutated. An operation naming a field that does not
//! exist returns an unchanged copy, so callers detect no-ops by comparing
//! documents.

use serde_json::Value;
use tracing::debug;

use crate::catalog;
use crate::schema::{FieldDescriptor, FieldPatch, OptionItem, SchemaDocument};

/// Title given to fields created by [`add_field`].
pub const NEW_FIELD_TITLE: &str = "New field";

/// Name [`add_field`] would give the next field: `field_{len+1}`, bumped
/// until it does not collide with an existing property.
pub fn next_field_name(doc: &SchemaDocument) -> String {
    let mut n = doc.len() + 1;
    loop {
        let candidate = format!("field_{n}");
        if !doc.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Appends an optional text field with a fresh unique name.
pub fn add_field(doc: &SchemaDocument) -> SchemaDocument {
    let name = next_field_name(doc);
    let mut next = doc.clone();
    next.properties_mut()
        .insert(name, FieldDescriptor::of_type("string", NEW_FIELD_TITLE));
    next
}

pub fn remove_field(doc: &SchemaDocument, name: &str) -> SchemaDocument {
    let mut next = doc.clone();
    if next.properties_mut().shift_remove(name).is_none() {
        debug!(field = name, "remove_field: no such field");
    }
    next
}

/// Shallow-merges `patch` into the named descriptor.
pub fn update_field(doc: &SchemaDocument, name: &str, patch: FieldPatch) -> SchemaDocument {
    modify(doc, name, "update_field", |descriptor| descriptor.apply(patch))
}

/// Renames a field in place, keeping its position.
///
/// Unchanged when `from` is absent or `to` is already taken.
pub fn rename_field(doc: &SchemaDocument, from: &str, to: &str) -> SchemaDocument {
    if !doc.contains(from) || doc.contains(to) || to.is_empty() {
        debug!(from, to, "rename_field: rejected");
        return doc.clone();
    }
    doc.iter()
        .fold(SchemaDocument::new(), |acc, (name, descriptor)| {
            let name = if name == from { to } else { name };
            acc.with_field(name, descriptor.clone())
        })
}

/// Switches a field to another catalog type.
///
/// Component and component props are replaced by the catalog defaults for
/// `new_type`; title, required flag and options are kept. Unknown types leave
/// the document unchanged.
pub fn change_field_type(doc: &SchemaDocument, name: &str, new_type: &str) -> SchemaDocument {
    let Some(field_type) = catalog::lookup(new_type) else {
        debug!(field = name, new_type, "change_field_type: type not in catalog");
        return doc.clone();
    };
    modify(doc, name, "change_field_type", |descriptor| {
        descriptor.field_type = field_type.type_id.to_string();
        descriptor.component = Some(field_type.component.to_string());
        descriptor.component_props = field_type.default_props();
    })
}

/// Replaces the option list of a choice field.
///
/// Fields whose component does not render options are left unchanged.
pub fn set_options(doc: &SchemaDocument, name: &str, options: Vec<OptionItem>) -> SchemaDocument {
    match doc.get(name) {
        Some(descriptor) if !catalog::is_choice_component(descriptor.component_id()) => {
            debug!(field = name, "set_options: not a choice field");
            doc.clone()
        }
        _ => modify(doc, name, "set_options", |descriptor| descriptor.options = options),
    }
}

fn modify(
    doc: &SchemaDocument,
    name: &str,
    op: &'static str,
    f: impl FnOnce(&mut FieldDescriptor),
) -> SchemaDocument {
    let mut next = doc.clone();
    match next.properties_mut().get_mut(name) {
        Some(descriptor) => f(descriptor),
        None => debug!(field = name, op, "no such field"),
    }
    next
}

// Option list editing. These operate on a list and return the edited copy,
// ready to pass to `set_options`.

/// Appends `Option N` / `option-N`.
pub fn add_option(options: &[OptionItem]) -> Vec<OptionItem> {
    let n = options.len() + 1;
    let mut next = options.to_vec();
    next.push(OptionItem::new(format!("Option {n}"), format!("option-{n}")));
    next
}

pub fn remove_option(options: &[OptionItem], index: usize) -> Vec<OptionItem> {
    options
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, option)| option.clone())
        .collect()
}

pub fn set_option_label(options: &[OptionItem], index: usize, label: &str) -> Vec<OptionItem> {
    let mut next = options.to_vec();
    if let Some(option) = next.get_mut(index) {
        option.label = label.to_string();
    }
    next
}

pub fn set_option_value(options: &[OptionItem], index: usize, value: &str) -> Vec<OptionItem> {
    let mut next = options.to_vec();
    if let Some(option) = next.get_mut(index) {
        option.value = Value::String(value.to_string());
    }
    next
}
