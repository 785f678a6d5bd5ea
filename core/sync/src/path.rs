//! Reading and writing nested properties by [`PropertyPath`].
//!
//! Segments walk objects by key and arrays by index. `get` and `unset`
//! never create anything; `set` creates intermediate objects as needed.
//! `unset` removes only the leaf, so an emptied parent stays behind as `{}`.

use serde_json::{Map, Value};

use querysync_common::{PathSegment, PropertyPath};

/// Read the value at `path`, or `None` if any segment is missing.
pub fn get<'a>(root: &'a Value, path: &PropertyPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| child(node, segment))
}

/// Write `value` at `path`, creating intermediate objects.
///
/// A scalar standing where a container is needed is replaced by an object.
/// Numeric segments index arrays; writing one past the end appends and
/// writing further pads with `null`. A non-numeric segment applied to an
/// array converts it to an object keyed by index.
pub fn set(root: &mut Value, path: &PropertyPath, value: Value) {
    let node = path
        .segments()
        .iter()
        .fold(root, |node, segment| slot(node, segment));
    *node = value;
}

/// Remove the leaf at `path` and return it.
///
/// Missing intermediates make this a no-op. Ancestors are never pruned.
pub fn unset(root: &mut Value, path: &PropertyPath) -> Option<Value> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut node = root;
    for segment in parents {
        node = child_mut(node, segment)?;
    }
    match node {
        Value::Object(map) => map.shift_remove(leaf.as_str()),
        Value::Array(items) => {
            let index = leaf.as_index().filter(|i| *i < items.len())?;
            Some(items.remove(index))
        }
        _ => None,
    }
}

/// Whether `set` at `path` would write without padding any array.
///
/// Indices up to the current length of an existing array are dense;
/// anything beyond would pad with `null`.
pub fn is_dense(root: &Value, path: &PropertyPath) -> bool {
    let mut node = Some(root);
    for segment in path.segments() {
        node = match (node, segment.as_index()) {
            (Some(Value::Array(items)), Some(index)) if index > items.len() => return false,
            (Some(node), _) => child(node, segment),
            (None, _) => return true,
        };
    }
    true
}

fn child<'a>(node: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment.as_str()),
        Value::Array(items) => items.get(segment.as_index()?),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment.as_str()),
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

fn slot<'a>(node: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    match (node, segment.as_index()) {
        (Value::Array(items), Some(index)) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        (Value::Object(map), _) => map.entry(segment.as_str()).or_insert(Value::Null),
        (other, _) => {
            *other = match std::mem::take(other) {
                Value::Array(items) => Value::Object(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect::<Map<String, Value>>(),
                ),
                _ => Value::Object(Map::new()),
            };
            slot(other, segment)
        }
    }
}
