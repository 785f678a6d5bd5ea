//! Conversion between typed property values and raw query strings.
//!
//! Every binding carries a [`DeclaredType`] chosen at registration. The
//! codec never inspects a value to guess its type: `null` handling, enum
//! backing and numeric parsing all follow the descriptor.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use querysync_common::{Error, Result};

/// Backing representation of an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumBacking {
    /// Cases carry string labels.
    String,
    /// Cases carry integer ordinals.
    Integer,
}

/// A backing scalar of one enum case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackingValue {
    Integer(i64),
    String(String),
}

impl BackingValue {
    fn to_wire(&self) -> String {
        match self {
            BackingValue::Integer(i) => i.to_string(),
            BackingValue::String(s) => s.clone(),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (BackingValue::Integer(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (BackingValue::String(s), Value::String(v)) => s == v,
            _ => false,
        }
    }
}

/// An enumerated type whose cases serialize to their backing values.
///
/// Component state holds the symbolic case name (`"First"`); the wire holds
/// the backing value (`"first"` or `1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    /// Type name used in error messages.
    #[serde(default)]
    pub name: Option<String>,
    /// Kind of backing value every case uses.
    pub backing: EnumBacking,
    /// Case name to backing value, in declaration order.
    pub cases: IndexMap<String, BackingValue>,
    /// Whether the property also admits `null`.
    #[serde(default)]
    pub nullable: bool,
}

impl EnumType {
    /// Create an enum type, checking that every case matches `backing`.
    ///
    /// # Errors
    /// - No cases
    /// - A case whose backing value has the wrong kind
    /// - Two cases sharing a backing value
    pub fn new<I, S>(backing: EnumBacking, cases: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, BackingValue)>,
        S: Into<String>,
    {
        let ty = Self {
            name: None,
            backing,
            cases: cases.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            nullable: false,
        };
        ty.validate()?;
        Ok(ty)
    }

    /// Set the type name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allow `null`.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Check case consistency.
    pub fn validate(&self) -> Result<()> {
        if self.cases.is_empty() {
            return Err(Error::InvalidDeclaration(format!(
                "Enum {} has no cases",
                self.label()
            )));
        }
        let mut seen = Vec::with_capacity(self.cases.len());
        for (case, value) in &self.cases {
            let kind_ok = matches!(
                (self.backing, value),
                (EnumBacking::String, BackingValue::String(_))
                    | (EnumBacking::Integer, BackingValue::Integer(_))
            );
            if !kind_ok {
                return Err(Error::InvalidDeclaration(format!(
                    "Case {} of enum {} has a backing value of the wrong kind",
                    case,
                    self.label()
                )));
            }
            if seen.contains(&value) {
                return Err(Error::InvalidDeclaration(format!(
                    "Enum {} reuses backing value {}",
                    self.label(),
                    value.to_wire()
                )));
            }
            seen.push(value);
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
    }

    /// Backing value for a state value (case name or backing value itself).
    fn backing_of(&self, value: &Value) -> Option<&BackingValue> {
        if let Value::String(name) = value {
            if let Some(backing) = self.cases.get(name) {
                return Some(backing);
            }
        }
        self.cases.values().find(|b| b.matches(value))
    }

    /// Case name for a raw wire value.
    fn case_for(&self, raw: &str) -> Option<&str> {
        let wanted = match self.backing {
            EnumBacking::String => BackingValue::String(raw.to_string()),
            EnumBacking::Integer => BackingValue::Integer(raw.trim().parse().ok()?),
        };
        self.cases
            .iter()
            .find(|(_, b)| **b == wanted)
            .map(|(name, _)| name.as_str())
    }
}

/// Explicit type descriptor attached to a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeclaredType {
    /// No declared type. `null` encodes as absent; an empty raw value
    /// decodes to `""` unless nullable.
    Untyped {
        #[serde(default)]
        nullable: bool,
    },
    /// A string property.
    String {
        #[serde(default)]
        nullable: bool,
    },
    /// An integer property.
    Integer {
        #[serde(default)]
        nullable: bool,
    },
    /// A boolean property, written as `true`/`false`.
    Boolean {
        #[serde(default)]
        nullable: bool,
    },
    /// A backed enum.
    Enum(EnumType),
    /// A nested structure; each leaf is written under bracket notation.
    Composite,
}

impl Default for DeclaredType {
    fn default() -> Self {
        DeclaredType::Untyped { nullable: false }
    }
}

impl DeclaredType {
    /// Non-nullable string.
    pub fn string() -> Self {
        DeclaredType::String { nullable: false }
    }

    /// Nullable string (`?string`).
    pub fn nullable_string() -> Self {
        DeclaredType::String { nullable: true }
    }

    /// Non-nullable integer.
    pub fn integer() -> Self {
        DeclaredType::Integer { nullable: false }
    }

    /// Non-nullable boolean.
    pub fn boolean() -> Self {
        DeclaredType::Boolean { nullable: false }
    }

    /// Whether the descriptor is explicitly nullable.
    pub fn is_nullable(&self) -> bool {
        match self {
            DeclaredType::Untyped { nullable }
            | DeclaredType::String { nullable }
            | DeclaredType::Integer { nullable }
            | DeclaredType::Boolean { nullable } => *nullable,
            DeclaredType::Enum(e) => e.nullable,
            DeclaredType::Composite => false,
        }
    }

    /// Whether `null` is a legitimate "no value" for this descriptor.
    ///
    /// True for untyped and composite properties as well as anything
    /// explicitly nullable.
    pub fn admits_null(&self) -> bool {
        matches!(self, DeclaredType::Untyped { .. } | DeclaredType::Composite) || self.is_nullable()
    }

    /// The same descriptor made nullable.
    pub fn into_nullable(self) -> Self {
        match self {
            DeclaredType::Untyped { .. } => DeclaredType::Untyped { nullable: true },
            DeclaredType::String { .. } => DeclaredType::String { nullable: true },
            DeclaredType::Integer { .. } => DeclaredType::Integer { nullable: true },
            DeclaredType::Boolean { .. } => DeclaredType::Boolean { nullable: true },
            DeclaredType::Enum(e) => DeclaredType::Enum(e.nullable()),
            DeclaredType::Composite => DeclaredType::Composite,
        }
    }

    /// Whether `""` is a value of this descriptor.
    pub fn admits_empty(&self) -> bool {
        matches!(
            self,
            DeclaredType::Untyped { .. } | DeclaredType::String { .. } | DeclaredType::Composite
        )
    }

    /// Whether this descriptor is composite.
    pub fn is_composite(&self) -> bool {
        matches!(self, DeclaredType::Composite)
    }

    /// Short description used in decode errors.
    pub fn describe(&self) -> String {
        let base = match self {
            DeclaredType::Untyped { .. } => "untyped".to_string(),
            DeclaredType::String { .. } => "string".to_string(),
            DeclaredType::Integer { .. } => "integer".to_string(),
            DeclaredType::Boolean { .. } => "boolean".to_string(),
            DeclaredType::Enum(e) => match e.backing {
                EnumBacking::String => format!("string-backed enum {}", e.label()),
                EnumBacking::Integer => format!("integer-backed enum {}", e.label()),
            },
            DeclaredType::Composite => "composite".to_string(),
        };
        if self.is_nullable() {
            format!("nullable {}", base)
        } else {
            base
        }
    }
}

fn scalar_to_wire(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Encode a single value, or `None` when the key should be absent.
///
/// Containers are not encoded here; see [`flatten`].
pub fn encode(value: &Value, ty: &DeclaredType) -> Option<String> {
    match (value, ty) {
        (Value::Null, DeclaredType::String { nullable: false }) => Some(String::new()),
        (Value::Null, _) => None,
        (_, DeclaredType::Enum(e)) => e
            .backing_of(value)
            .map(BackingValue::to_wire)
            .or_else(|| scalar_to_wire(value)),
        _ => scalar_to_wire(value),
    }
}

/// Decode a raw query value (`None` when the key is absent).
///
/// # Errors
/// - [`Error::Decode`] if `raw` does not fit `ty` (non-numeric integer,
///   unknown enum case, unrecognized boolean)
pub fn decode(raw: Option<&str>, ty: &DeclaredType, key: &str) -> Result<Value> {
    let raw = match raw {
        None => {
            return Ok(match ty {
                DeclaredType::String { nullable: false } => Value::String(String::new()),
                _ => Value::Null,
            })
        }
        Some(raw) => raw,
    };

    // `null` is written as an absent key, so `key=` only ever came from `""`.
    // Types with no empty value read it as "no value" when nullable.
    if raw.is_empty() && ty.is_nullable() && !ty.admits_empty() {
        return Ok(Value::Null);
    }

    let mismatch = || Error::decode(key, ty.describe(), raw);
    match ty {
        DeclaredType::Untyped { .. } | DeclaredType::String { .. } | DeclaredType::Composite => {
            Ok(Value::String(raw.to_string()))
        }
        DeclaredType::Integer { .. } => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch()),
        DeclaredType::Boolean { .. } => match raw {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        DeclaredType::Enum(e) => e
            .case_for(raw)
            .map(|name| Value::String(name.to_string()))
            .ok_or_else(mismatch),
    }
}

/// Loose equality between a value and an except value.
///
/// Values are compared by their encoded form, so `1` equals `"1"` and an
/// enum case equals its backing value. An absent encoding equals `""`.
pub fn loosely_equals(value: &Value, except: &Value, ty: &DeclaredType) -> bool {
    if value == except {
        return true;
    }
    if value.is_array() || value.is_object() || except.is_array() || except.is_object() {
        return false;
    }
    match (encode(value, ty), encode(except, ty)) {
        (None, None) => true,
        (None, Some(s)) | (Some(s), None) => s.is_empty(),
        (Some(a), Some(b)) => a == b,
    }
}

/// Flatten a nested value into `(segments, raw)` leaves.
///
/// `null` leaves and empty containers produce nothing.
pub fn flatten(value: &Value) -> Vec<(Vec<String>, String)> {
    let mut leaves = Vec::new();
    flatten_into(value, &mut Vec::new(), &mut leaves);
    leaves
}

fn flatten_into(value: &Value, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                prefix.push(key.clone());
                flatten_into(child, prefix, out);
                prefix.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                prefix.push(index.to_string());
                flatten_into(child, prefix, out);
                prefix.pop();
            }
        }
        leaf => {
            if let Some(raw) = scalar_to_wire(leaf) {
                out.push((prefix.clone(), raw));
            }
        }
    }
}
