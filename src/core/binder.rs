//! Property binding: one assignment onto the active entity.
//!
//! Checks run in order: the property must exist and be writable, it must
//! not already be bound in the current scope, and the value must coerce to
//! the property's type. Application/Service is the only repeatable pair.

use super::entity::{Entity, EntityKind, PropertyError};
use super::error::ErrorKind;
use super::overlay::insert_path;
use super::registry::Registry;
use super::types::yaml_value_to_string;
use rustc_hash::FxHashSet;
use serde_yaml_ng::{Mapping, Value};
use tracing::trace;

/// Property names already bound in one block.
pub type UsedProperties = FxHashSet<String>;

fn coercion(entity: EntityKind, name: &str, message: impl Into<String>) -> ErrorKind {
    ErrorKind::TypeCoercionFailure {
        entity,
        name: name.to_string(),
        message: message.into(),
    }
}

fn unknown(entity: EntityKind, name: &str) -> ErrorKind {
    ErrorKind::UnknownProperty {
        entity,
        name: name.to_string(),
    }
}

/// Whether `path` addresses a value already bound in this scope: the same
/// name, or one being a dotted prefix of the other (`lifecycle` and
/// `lifecycle.init`).
fn already_bound(used: &UsedProperties, path: &str) -> bool {
    used.iter()
        .any(|bound| bound == path || is_segment_prefix(bound, path) || is_segment_prefix(path, bound))
}

fn is_segment_prefix(head: &str, path: &str) -> bool {
    path.strip_prefix(head).is_some_and(|rest| rest.starts_with('.'))
}

/// Collapse call-form arguments to the one value a property takes.
fn single(entity: EntityKind, name: &str, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    match args.len() {
        0 => Ok(Value::Null),
        1 => Ok(args.remove(0)),
        n => Err(coercion(
            entity,
            name,
            format!("received {} values where only one is allowed", n),
        )),
    }
}

/// Bind a plain value (`name value`, `name = value`).
pub fn bind(
    entity: &mut Entity,
    used: &mut UsedProperties,
    name: &str,
    args: Vec<Value>,
) -> Result<(), ErrorKind> {
    let kind = entity.kind();
    let value = single(kind, name, args)?;
    if !entity.is_writable(name) {
        return Err(unknown(kind, name));
    }
    if already_bound(used, name) {
        return Err(ErrorKind::DuplicateProperty {
            name: name.to_string(),
        });
    }
    set_coerced(entity, name, value)?;
    trace!(entity = %kind, property = name, "bound");
    used.insert(name.to_string());
    Ok(())
}

/// Bind a finished nested block onto its parent's property of the same name.
pub fn bind_entity(
    parent: &mut Entity,
    used: &mut UsedProperties,
    child: Entity,
) -> Result<(), ErrorKind> {
    let kind = parent.kind();
    let name = child.kind().element_name();
    let repeatable = kind == EntityKind::Application && child.kind() == EntityKind::Service;
    if !repeatable && !parent.is_writable(name) {
        return Err(unknown(kind, name));
    }
    if used.contains(name) && !repeatable {
        return Err(ErrorKind::DuplicateProperty {
            name: name.to_string(),
        });
    }
    let value = child.to_value().map_err(|m| coercion(kind, name, m))?;
    parent.set_property(name, value).map_err(|e| match e {
        PropertyError::Unknown => unknown(kind, name),
        PropertyError::Coercion(m) => coercion(kind, name, m),
    })?;
    used.insert(name.to_string());
    Ok(())
}

/// Bind a dotted assignment such as `lifecycle.init "install.sh"`.
///
/// Intermediate segments naming a block open (or reuse) that nested entity;
/// other intermediate segments address keys of a map-valued property. The
/// path is a duplicate when it, a prefix of it, or a longer path under it
/// was already bound in this scope.
pub fn bind_path(
    registry: &Registry,
    entity: &mut Entity,
    used: &mut UsedProperties,
    path: &str,
    args: Vec<Value>,
) -> Result<(), ErrorKind> {
    let value = single(entity.kind(), path, args)?;
    if already_bound(used, path) {
        return Err(ErrorKind::DuplicateProperty {
            name: path.to_string(),
        });
    }
    let segments: Vec<&str> = path.split('.').collect();
    assign_path(registry, entity, &segments, value)?;
    used.insert(path.to_string());
    Ok(())
}

fn assign_path(
    registry: &Registry,
    entity: &mut Entity,
    segments: &[&str],
    value: Value,
) -> Result<(), ErrorKind> {
    let kind = entity.kind();
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    if rest.is_empty() {
        if !entity.is_writable(head) {
            return Err(unknown(kind, head));
        }
        return set_coerced(entity, head, value);
    }
    if !entity.is_writable(head) {
        return Err(unknown(kind, head));
    }
    let current = entity.property(head).unwrap_or(Value::Null);

    match registry.describe(head) {
        Some(descriptor) => {
            descriptor
                .check_placement(Some(kind))
                .map_err(|reason| ErrorKind::IllegalNestingOrRoot {
                    name: head.to_string(),
                    reason,
                })?;
            let mut child = if current.is_null() {
                Entity::new(descriptor.kind)
            } else {
                Entity::from_value(descriptor.kind, current).map_err(|m| coercion(kind, head, m))?
            };
            assign_path(registry, &mut child, rest, value)?;
            let child_value = child.to_value().map_err(|m| coercion(kind, head, m))?;
            entity.set_property(head, child_value).map_err(|e| match e {
                PropertyError::Unknown => unknown(kind, head),
                PropertyError::Coercion(m) => coercion(kind, head, m),
            })
        }
        None => {
            let mut nested = Mapping::new();
            insert_path(&mut nested, rest, value);
            set_coerced(entity, head, Value::Mapping(nested))
        }
    }
}

/// Set with the recipe coercions applied. See [`shape`] and [`fallbacks`].
pub fn set_coerced(entity: &mut Entity, name: &str, value: Value) -> Result<(), ErrorKind> {
    let kind = entity.kind();
    let current = entity.property(name).unwrap_or(Value::Null);
    let value = shape(&current, value);
    match entity.set_property(name, value.clone()) {
        Ok(()) => Ok(()),
        Err(PropertyError::Unknown) => Err(unknown(kind, name)),
        Err(PropertyError::Coercion(first)) => {
            for candidate in fallbacks(&current, &value) {
                if entity.set_property(name, candidate).is_ok() {
                    return Ok(());
                }
            }
            Err(coercion(kind, name, first))
        }
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Coercions decidable from the property's current value: a scalar into a
/// list property is wrapped, a one-element list into a scalar property is
/// unwrapped, and a map into a non-empty map property is merged (new keys
/// win).
fn shape(current: &Value, value: Value) -> Value {
    match (current, value) {
        (Value::Sequence(_), v) if is_scalar(&v) => Value::Sequence(vec![v]),
        (c, Value::Sequence(mut items)) if is_scalar(c) && items.len() == 1 => items.remove(0),
        (Value::Mapping(existing), Value::Mapping(new)) if !existing.is_empty() => {
            let mut merged = existing.clone();
            for (k, v) in new {
                merged.insert(k, v);
            }
            Value::Mapping(merged)
        }
        (_, v) => v,
    }
}

fn stringify(v: &Value) -> Option<Value> {
    match v {
        Value::Number(_) | Value::Bool(_) => Some(Value::String(yaml_value_to_string(v))),
        _ => None,
    }
}

/// Retries for properties whose type the current value does not reveal
/// (an unset optional): unwrap a one-element list, stringify numbers and
/// booleans, stringify the scalar values of a map.
fn fallbacks(current: &Value, value: &Value) -> Vec<Value> {
    let mut out = Vec::new();
    match value {
        Value::Sequence(items) if items.len() == 1 && !current.is_sequence() => {
            out.push(items[0].clone());
            out.extend(stringify(&items[0]));
        }
        Value::Mapping(map) => {
            let stringified: Mapping = map
                .iter()
                .map(|(k, v)| (k.clone(), stringify(v).unwrap_or_else(|| v.clone())))
                .collect();
            if &stringified != map {
                out.push(Value::Mapping(stringified));
            }
        }
        other => out.extend(stringify(other)),
    }
    out
}
