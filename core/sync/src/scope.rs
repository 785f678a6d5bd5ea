//! Component scopes: one mounted instance's state and bindings.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use querysync_common::{PropertyPath, Result, ScopeId};
use querysync_store::HistoryMode;

use crate::binding::{Binding, BindingOptions, BindingRegistry};
use crate::declaration;
use crate::path;

/// A reusable component definition.
///
/// Instantiating it with different parameters yields independent scopes,
/// which is how sibling instances get distinct query keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Component name, used in logs.
    pub name: String,
    /// Initial property tree.
    #[serde(default = "empty_state")]
    pub state: Value,
    /// Binding declarations (see [`crate::declaration`]).
    #[serde(default)]
    pub query_string: Value,
}

fn empty_state() -> Value {
    Value::Object(Default::default())
}

impl ComponentDefinition {
    /// Parse a definition from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a definition file.
    ///
    /// # Errors
    /// - [`querysync_common::Error::Io`] if the file cannot be read
    /// - [`querysync_common::Error::Serialization`] if it is not a definition
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Create a scope for one instance.
    ///
    /// # Errors
    /// - Malformed declarations
    /// - Duplicate paths or keys within the instance
    pub fn instantiate(
        &self,
        params: &HashMap<String, String>,
        default_history: HistoryMode,
    ) -> Result<ComponentScope> {
        let mut scope = ComponentScope::with_default_history(&self.name, self.state.clone(), default_history);
        for decl in declaration::parse(&self.query_string, params)? {
            scope.bind_path(decl.path, decl.options)?;
        }
        Ok(scope)
    }
}

/// State and bindings of one mounted component instance.
#[derive(Debug, Clone)]
pub struct ComponentScope {
    id: ScopeId,
    name: String,
    state: Value,
    bindings: BindingRegistry,
}

impl ComponentScope {
    /// Create a scope with no bindings.
    pub fn new(name: impl Into<String>, state: Value) -> Self {
        Self::with_default_history(name, state, HistoryMode::default())
    }

    /// Create a scope whose bindings default to `mode`.
    pub fn with_default_history(name: impl Into<String>, state: Value, mode: HistoryMode) -> Self {
        Self {
            id: ScopeId::new(),
            name: name.into(),
            state,
            bindings: BindingRegistry::with_default_history(mode),
        }
    }

    /// Bind a dot/bracket notation path.
    ///
    /// The binding's default is the current value at `path`, so bind before
    /// applying any mount-time changes.
    pub fn bind(&mut self, path: &str, options: BindingOptions) -> Result<&Binding> {
        self.bind_path(PropertyPath::parse(path)?, options)
    }

    /// Bind an already parsed path.
    pub fn bind_path(&mut self, path: PropertyPath, options: BindingOptions) -> Result<&Binding> {
        self.bindings.register(path, options, &self.state)
    }

    /// Write a property without triggering a sync; used for mount logic.
    pub fn set_property(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        path::set(&mut self.state, &PropertyPath::parse(path)?, value.into());
        Ok(())
    }

    /// Read a property.
    pub fn property(&self, path: &str) -> Result<Option<&Value>> {
        Ok(path::get(&self.state, &PropertyPath::parse(path)?))
    }

    /// Scope identifier.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current property tree.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut Value {
        &mut self.state
    }

    /// Registered bindings.
    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }
}
