//! Bindings between component properties and query keys.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use querysync_common::{Error, PropertyPath, Result};
use querysync_store::HistoryMode;

use crate::codec::{self, DeclaredType};
use crate::path;

/// User-facing options for one binding.
///
/// Deserializes from the declaration format:
/// `{ "as": "q", "except": "", "history": true, "keep": false,
///    "nullable": false, "type": { "kind": "string" } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingOptions {
    /// Query key alias. Defaults to the last path segment.
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Value at which the key is omitted. `null` is a valid except value.
    #[serde(default, deserialize_with = "explicit_value", skip_serializing_if = "Option::is_none")]
    pub except: Option<Value>,
    /// Decode "no value" as `null`.
    #[serde(default)]
    pub nullable: bool,
    /// Always write the key, even when it equals its default.
    #[serde(default)]
    pub keep: bool,
    /// History mode. `true`/`false` map to push/replace.
    #[serde(default, deserialize_with = "history_setting", skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryMode>,
    /// Declared type. Defaults to untyped, or composite for container defaults.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<DeclaredType>,
}

fn explicit_value<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistorySetting {
    Flag(bool),
    Mode(HistoryMode),
}

fn history_setting<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<HistoryMode>, D::Error> {
    Ok(Some(match HistorySetting::deserialize(d)? {
        HistorySetting::Flag(push) => HistoryMode::from_flag(push),
        HistorySetting::Mode(mode) => mode,
    }))
}

impl BindingOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query key alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the except value.
    pub fn except(mut self, except: impl Into<Value>) -> Self {
        self.except = Some(except.into());
        self
    }

    /// Mark as nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Always keep the key in the URL.
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Set the history mode.
    pub fn history(mut self, mode: HistoryMode) -> Self {
        self.history = Some(mode);
        self
    }

    /// Set the declared type.
    pub fn typed(mut self, ty: DeclaredType) -> Self {
        self.declared_type = Some(ty);
        self
    }
}

/// One registered synchronization rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    path: PropertyPath,
    query_key: String,
    except: Option<Value>,
    default: Value,
    nullable: bool,
    keep: bool,
    history: HistoryMode,
    declared_type: DeclaredType,
}

impl Binding {
    /// Source path in component state.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// Key used in the URL.
    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    /// Explicit except value, if any.
    pub fn except(&self) -> Option<&Value> {
        self.except.as_ref()
    }

    /// Value at the path when the binding was registered.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether "no value" decodes as `null`.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether suppression is disabled.
    pub fn keeps(&self) -> bool {
        self.keep
    }

    /// History mode for commits this binding causes.
    pub fn history(&self) -> HistoryMode {
        self.history
    }

    /// Declared type, with binding-level nullability folded in.
    pub fn declared_type(&self) -> &DeclaredType {
        &self.declared_type
    }

    /// Whether the binding owns bracket-notation keys under its query key.
    pub fn is_composite(&self) -> bool {
        self.declared_type.is_composite()
    }

    /// Whether `value` should be omitted from the URL.
    ///
    /// An explicit except value is compared loosely; without one the value
    /// must equal the registered default exactly.
    pub fn is_suppressed(&self, value: &Value) -> bool {
        if self.keep {
            return false;
        }
        match &self.except {
            Some(except) => codec::loosely_equals(value, except, &self.declared_type),
            None => *value == self.default,
        }
    }
}

/// Ordered set of bindings for one component scope.
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
    bindings: Vec<Binding>,
    default_history: HistoryMode,
}

impl BindingRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose bindings default to `mode`.
    pub fn with_default_history(mode: HistoryMode) -> Self {
        Self {
            bindings: Vec::new(),
            default_history: mode,
        }
    }

    /// Register a binding, capturing its default from `state`.
    ///
    /// # Preconditions
    /// - `path` and the resolved query key are not already bound
    ///
    /// # Postconditions
    /// - The binding is appended in declaration order
    ///
    /// # Errors
    /// - Path or query key already bound in this registry
    /// - Empty alias or invalid enum descriptor
    pub fn register(
        &mut self,
        path: PropertyPath,
        options: BindingOptions,
        state: &Value,
    ) -> Result<&Binding> {
        let query_key = match options.alias {
            Some(alias) if alias.is_empty() => {
                return Err(Error::InvalidDeclaration(format!(
                    "Binding '{}' has an empty alias",
                    path
                )))
            }
            Some(alias) => alias,
            None => path.leaf().to_string(),
        };

        if self.get(&path).is_some() {
            return Err(Error::AlreadyExists(format!("Path '{}' is already bound", path)));
        }
        if self.by_key(&query_key).is_some() {
            return Err(Error::AlreadyExists(format!(
                "Query key '{}' is already bound",
                query_key
            )));
        }

        let default = path::get(state, &path).cloned().unwrap_or(Value::Null);
        let mut declared_type = match options.declared_type {
            Some(ty) => ty,
            None if default.is_object() || default.is_array() => DeclaredType::Composite,
            None => DeclaredType::default(),
        };
        if let DeclaredType::Enum(e) = &declared_type {
            e.validate()?;
        }
        if options.nullable {
            declared_type = declared_type.into_nullable();
        }

        debug!(
            path = %path,
            key = %query_key,
            ty = %declared_type.describe(),
            "Registered binding"
        );

        self.bindings.push(Binding {
            path,
            query_key,
            except: options.except,
            default,
            nullable: options.nullable || declared_type.is_nullable(),
            keep: options.keep,
            history: options.history.unwrap_or(self.default_history),
            declared_type,
        });
        let index = self.bindings.len() - 1;
        Ok(&self.bindings[index])
    }

    /// Find the binding for `path`.
    pub fn get(&self, path: &PropertyPath) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.path == *path)
    }

    /// Find the binding writing `key`.
    pub fn by_key(&self, key: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.query_key == key)
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    /// All query keys in declaration order.
    pub fn keys(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.query_key.as_str()).collect()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no bindings are registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
