//! Parsing binding declarations.
//!
//! A component declares its query string bindings as JSON in one of three
//! shapes, which may be mixed:
//!
//! ```json
//! ["search", "page"]
//! { "search": { "except": "", "history": true } }
//! { "tableFilters.filter_1.value": { "as": "filter" } }
//! { "tableFilters": { "filter_1": { "value": { "as": "filter" } } } }
//! ```
//!
//! An object whose keys are all option names (or that is empty) is a leaf
//! options object; any other object nests one level deeper. Aliases may
//! contain `{name}` placeholders filled from mount-time parameters.
//!
//! Because of that rule, a property literally named after an option
//! (`as`, `type`, ...) cannot be reached through the nested form:
//! `{ "filters": { "type": { "kind": "string" } } }` declares `filters`
//! itself as a string binding.
//! Use a dotted key instead: `{ "filters.type": {} }`.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::trace;

use querysync_common::{Error, PathSegment, PropertyPath, Result};

use crate::binding::BindingOptions;

/// Recognized option keys in a leaf declaration.
pub const OPTION_KEYS: &[&str] = &["as", "except", "history", "keep", "nullable", "type"];

/// A parsed declaration: the bound path and its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub path: PropertyPath,
    pub options: BindingOptions,
}

/// Parse a declaration value into bindings, in declaration order.
///
/// # Errors
/// - A key that is not a valid property path
/// - An object mixing option keys with nested keys
/// - A leaf that is neither an object nor `null`
/// - A `{name}` placeholder with no matching parameter
pub fn parse(decl: &Value, params: &HashMap<String, String>) -> Result<Vec<Declaration>> {
    let mut out = Vec::new();
    match decl {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(path) => out.push(Declaration {
                        path: PropertyPath::parse(path)?,
                        options: BindingOptions::default(),
                    }),
                    Value::Object(map) => walk(&[], map, params, &mut out)?,
                    other => {
                        return Err(Error::InvalidDeclaration(format!(
                            "Expected a property name, found {}",
                            other
                        )))
                    }
                }
            }
        }
        Value::Object(map) => walk(&[], map, params, &mut out)?,
        Value::Null => {}
        other => {
            return Err(Error::InvalidDeclaration(format!(
                "Expected a list or map of bindings, found {}",
                other
            )))
        }
    }
    Ok(out)
}

fn is_leaf(map: &Map<String, Value>) -> bool {
    map.keys().all(|k| OPTION_KEYS.contains(&k.as_str()))
}

fn walk(
    prefix: &[PathSegment],
    map: &Map<String, Value>,
    params: &HashMap<String, String>,
    out: &mut Vec<Declaration>,
) -> Result<()> {
    for (key, value) in map {
        let relative = PropertyPath::parse(key)?;
        let mut segments = prefix.to_vec();
        segments.extend(relative.segments().iter().cloned());

        match value {
            Value::Null => out.push(Declaration {
                path: PropertyPath::from_segments(segments)?,
                options: BindingOptions::default(),
            }),
            Value::Object(inner) if is_leaf(inner) => {
                let path = PropertyPath::from_segments(segments)?;
                let mut options: BindingOptions = serde_json::from_value(value.clone())
                    .map_err(|e| {
                        Error::InvalidDeclaration(format!("Binding '{}': {}", path, e))
                    })?;
                if let Some(alias) = options.alias.take() {
                    options.alias = Some(substitute(&alias, params)?);
                }
                trace!(path = %path, "Parsed leaf declaration");
                out.push(Declaration { path, options });
            }
            Value::Object(inner) => {
                if inner.keys().any(|k| OPTION_KEYS.contains(&k.as_str())) {
                    return Err(Error::InvalidDeclaration(format!(
                        "Declaration for '{}' mixes options with nested properties",
                        key
                    )));
                }
                walk(&segments, inner, params, out)?;
            }
            other => {
                return Err(Error::InvalidDeclaration(format!(
                    "Declaration for '{}' must be an object, found {}",
                    key, other
                )))
            }
        }
    }
    Ok(())
}

/// Replace `{name}` placeholders in `template` with `params`.
pub fn substitute(template: &str, params: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            Error::InvalidDeclaration(format!("Unclosed placeholder in alias '{}'", template))
        })?;
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| {
            Error::InvalidDeclaration(format!(
                "Alias '{}' needs parameter '{}'",
                template, name
            ))
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
