//! Core sync engine that mirrors a component scope into the query string.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use querysync_common::{Error, PropertyPath, Result};
use querysync_store::{join_key, segments_under, HistoryMode, QueryStringStore, Window};

use crate::binding::Binding;
use crate::codec;
use crate::path;
use crate::scope::ComponentScope;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// History mode for bindings that do not declare one.
    pub default_history: HistoryMode,
    /// Run one recompute right after mount so mount-time values reach the URL.
    pub sync_on_mount: bool,
    /// Maximum follow-up batches update hooks may queue from one batch.
    pub max_cascade: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_history: HistoryMode::Replace,
            sync_on_mount: true,
            max_cascade: 16,
        }
    }
}

/// Per-scope engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Values pulled from the URL; idle between mutations.
    Initialized,
    /// A recompute is running.
    Syncing,
}

/// A single state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Mutation {
    /// Write `value` at `path`.
    Set { path: PropertyPath, value: Value },
    /// Remove the leaf at `path`.
    Unset { path: PropertyPath },
}

impl Mutation {
    /// Build a set mutation from a path string.
    pub fn set(path: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Mutation::Set {
            path: PropertyPath::parse(path)?,
            value: value.into(),
        })
    }

    /// Build an unset mutation from a path string.
    pub fn unset(path: &str) -> Result<Self> {
        Ok(Mutation::Unset {
            path: PropertyPath::parse(path)?,
        })
    }

    /// The mutated path.
    pub fn path(&self) -> &PropertyPath {
        match self {
            Mutation::Set { path, .. } | Mutation::Unset { path } => path,
        }
    }

    fn apply(&self, state: &mut Value) {
        match self {
            Mutation::Set { path: p, value } => path::set(state, p, value.clone()),
            Mutation::Unset { path: p } => {
                path::unset(state, p);
            }
        }
    }
}

/// Mutations handled together in one recompute.
pub type MutationBatch = Vec<Mutation>;

/// Callback run while syncing after a watched path changes.
///
/// Receives the mutated path and the updated state; any mutations it
/// returns are queued and processed after the current cycle.
pub type UpdateHook = Box<dyn Fn(&PropertyPath, &Value) -> MutationBatch + Send + Sync>;

/// Result of one `apply` or `sync` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Recompute cycles run (the batch plus queued follow-ups).
    pub cycles: usize,
    /// Query keys written or removed, in order of first touch.
    pub touched: Vec<String>,
    /// History mode committed, if the store changed.
    pub committed: Option<HistoryMode>,
    /// `location.search` afterwards.
    pub search: String,
}

impl SyncReport {
    fn absorb(&mut self, touched: Vec<String>, committed: Option<HistoryMode>) {
        self.cycles += 1;
        for key in touched {
            if !self.touched.contains(&key) {
                self.touched.push(key);
            }
        }
        self.committed = match (self.committed, committed) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Mirrors one component scope into a window's query string.
pub struct SyncEngine {
    scope: ComponentScope,
    window: Window,
    config: EngineConfig,
    phase: SyncPhase,
    pending: VecDeque<MutationBatch>,
    hooks: Vec<(PropertyPath, UpdateHook)>,
}

impl SyncEngine {
    /// Mount `scope` in `window`.
    ///
    /// Pulls every bound key present in the URL into the scope's state,
    /// then, if `sync_on_mount` is set, writes the scope back with a
    /// replace commit.
    ///
    /// # Errors
    /// - [`Error::Decode`] if a present value does not fit its binding's type
    pub fn mount(scope: ComponentScope, window: Window, config: EngineConfig) -> Result<Self> {
        let mut engine = Self {
            scope,
            window,
            config,
            phase: SyncPhase::Initialized,
            pending: VecDeque::new(),
            hooks: Vec::new(),
        };

        let snapshot = engine.window.snapshot()?;
        let mut pulled = 0;
        for binding in engine.scope.bindings().clone().iter() {
            if pull(&snapshot, binding, engine.scope.state_mut())? {
                pulled += 1;
            }
        }

        info!(
            component = engine.scope.name(),
            scope = %engine.scope.id(),
            bindings = engine.scope.bindings().len(),
            pulled,
            "Mounted component"
        );

        if engine.config.sync_on_mount {
            engine.phase = SyncPhase::Syncing;
            let result = engine.recompute();
            engine.phase = SyncPhase::Initialized;
            let (touched, _) = result?;
            if !touched.is_empty() {
                engine.window.commit(HistoryMode::Replace)?;
            }
        }
        Ok(engine)
    }

    /// Register a hook for `path` and everything beneath it.
    pub fn on_updated(&mut self, path: &str, hook: UpdateHook) -> Result<()> {
        self.hooks.push((PropertyPath::parse(path)?, hook));
        Ok(())
    }

    /// Set one property and sync.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<SyncReport> {
        self.apply(vec![Mutation::set(path, value)?])
    }

    /// Unset one property and sync.
    pub fn unset(&mut self, path: &str) -> Result<SyncReport> {
        self.apply(vec![Mutation::unset(path)?])
    }

    /// Recompute without mutating, e.g. after the transport replaced state.
    pub fn sync(&mut self) -> Result<SyncReport> {
        self.apply(Vec::new())
    }

    /// Apply a mutation batch and sync the query string.
    ///
    /// Follow-up batches returned by update hooks run as further cycles
    /// before this returns. Hooks only see the state, so their return value
    /// is the one way work gets queued behind a running cycle.
    ///
    /// # Errors
    /// - [`Error::Cascade`] if hooks queue more than `max_cascade` batches
    /// - [`Error::Poisoned`] if the window's store lock is poisoned
    pub fn apply(&mut self, batch: MutationBatch) -> Result<SyncReport> {
        self.pending.push_back(batch);
        let result = self.drain();
        self.phase = SyncPhase::Initialized;
        if result.is_err() {
            self.pending.clear();
        }
        result
    }

    fn drain(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        while let Some(batch) = self.pending.pop_front() {
            if report.cycles > self.config.max_cascade {
                warn!(
                    component = self.scope.name(),
                    limit = self.config.max_cascade,
                    "Update hooks did not settle"
                );
                return Err(Error::Cascade(self.config.max_cascade));
            }
            self.phase = SyncPhase::Syncing;

            for mutation in &batch {
                mutation.apply(self.scope.state_mut());
            }
            for mutation in &batch {
                for (watched, hook) in &self.hooks {
                    if mutation.path().starts_with(watched) {
                        let follow_up = hook(mutation.path(), self.scope.state());
                        if !follow_up.is_empty() {
                            self.pending.push_back(follow_up);
                        }
                    }
                }
            }

            let (touched, mode) = self.recompute()?;
            let committed = match mode {
                Some(mode) => {
                    self.window.commit(mode)?;
                    Some(mode)
                }
                None => None,
            };
            debug!(
                component = self.scope.name(),
                mutations = batch.len(),
                touched = touched.len(),
                ?committed,
                "Sync cycle complete"
            );
            report.absorb(touched, committed);
            self.phase = SyncPhase::Initialized;
        }
        report.search = self.window.search()?;
        Ok(report)
    }

    /// Write every binding into the store; returns touched keys and the
    /// merged history mode of the bindings that touched them.
    fn recompute(&self) -> Result<(Vec<String>, Option<HistoryMode>)> {
        let state = self.scope.state();
        self.window.write(|store| {
            let mut touched = Vec::new();
            let mut mode: Option<HistoryMode> = None;
            for binding in self.scope.bindings().iter() {
                let changed = push(store, binding, path::get(state, binding.path()));
                if !changed.is_empty() {
                    mode = Some(mode.map_or(binding.history(), |m| m.merge(binding.history())));
                    touched.extend(changed);
                }
            }
            (touched, mode)
        })
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The mounted scope.
    pub fn scope(&self) -> &ComponentScope {
        &self.scope
    }

    /// The scope's property tree.
    pub fn state(&self) -> &Value {
        self.scope.state()
    }

    /// The window this engine writes to.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tear the component down. Its keys stay in the URL.
    pub fn teardown(self) -> ComponentScope {
        debug!(component = self.scope.name(), scope = %self.scope.id(), "Tearing down");
        self.scope
    }
}

/// Decode the URL value(s) for `binding` into `state`.
///
/// Returns whether anything was pulled. Absent keys leave the default.
fn pull(store: &QueryStringStore, binding: &Binding, state: &mut Value) -> Result<bool> {
    let key = binding.query_key();

    if !binding.is_composite() {
        let Some(raw) = store.get(key) else {
            return Ok(false);
        };
        let value = codec::decode(Some(raw), binding.declared_type(), key)?;
        path::set(state, binding.path(), value);
        return Ok(true);
    }

    let mut pulled = false;
    for nested in store.keys_under(key) {
        let Some(raw) = store.get(&nested) else {
            continue;
        };
        let Some(segments) = segments_under(&nested, key) else {
            warn!(key = %nested, "Skipping malformed bracket key");
            continue;
        };
        let mut target = binding.path().clone();
        for segment in segments {
            target = target.join(segment)?;
        }
        if !path::is_dense(state, &target) {
            warn!(key = %nested, "Skipping out-of-range array index");
            continue;
        }
        path::set(state, &target, Value::String(raw.to_string()));
        pulled = true;
    }
    Ok(pulled)
}

/// The key/value pairs `binding` should currently contribute.
fn desired(binding: &Binding, value: Option<&Value>) -> Vec<(String, String)> {
    let Some(value) = value else {
        return Vec::new();
    };
    if binding.is_suppressed(value) {
        return Vec::new();
    }
    if value.is_object() || value.is_array() {
        if !binding.is_composite() {
            warn!(
                path = %binding.path(),
                key = binding.query_key(),
                "Container value on a scalar binding is not written"
            );
            return Vec::new();
        }
        return codec::flatten(value)
            .into_iter()
            .map(|(segments, raw)| (join_key(binding.query_key(), &segments), raw))
            .collect();
    }
    codec::encode(value, binding.declared_type())
        .map(|raw| vec![(binding.query_key().to_string(), raw)])
        .unwrap_or_default()
}

/// Bring the store in line with `binding`; returns the keys that changed.
fn push(store: &mut QueryStringStore, binding: &Binding, value: Option<&Value>) -> Vec<String> {
    let wanted = desired(binding, value);
    let owned = if binding.is_composite() {
        store.keys_under(binding.query_key())
    } else {
        vec![binding.query_key().to_string()]
    };

    let mut changed = Vec::new();
    for key in owned {
        if !wanted.iter().any(|(k, _)| *k == key) && store.delete(&key) {
            changed.push(key);
        }
    }
    for (key, raw) in wanted {
        if store.set(key.clone(), raw) {
            changed.push(key);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use querysync_store::MemoryHistory;
    use serde_json::json;

    use crate::binding::BindingOptions;
    use crate::codec::{BackingValue, DeclaredType, EnumBacking, EnumType};
    use crate::scope::ComponentDefinition;

    fn definition(json: Value) -> ComponentDefinition {
        serde_json::from_value(json).unwrap()
    }

    fn mount_at(def: &ComponentDefinition, search: &str) -> (SyncEngine, Arc<MemoryHistory>) {
        mount_with(def, search, &HashMap::new())
    }

    fn mount_with(
        def: &ComponentDefinition,
        search: &str,
        params: &HashMap<String, String>,
    ) -> (SyncEngine, Arc<MemoryHistory>) {
        let (window, history) = Window::in_memory(search);
        let scope = def.instantiate(params, HistoryMode::Replace).unwrap();
        let engine = SyncEngine::mount(scope, window, EngineConfig::default()).unwrap();
        (engine, history)
    }

    /// Simulate a full page reload at the current URL.
    fn reload(def: &ComponentDefinition, history: &MemoryHistory) -> (SyncEngine, Arc<MemoryHistory>) {
        mount_at(def, &history.current())
    }

    fn has(engine: &SyncEngine, key: &str) -> Option<String> {
        engine.window().get(key).unwrap()
    }

    #[test]
    fn test_null_leaves_of_composite_stay_out_of_url() {
        let def = definition(json!({
            "name": "filters",
            "state": {"tableFilters": {
                "filter_1": {"value": null},
                "filter_2": {"value": null},
                "filter_3": {"value": null}
            }},
            "query_string": ["tableFilters"]
        }));
        let (mut engine, history) = mount_at(&def, "");
        assert!(engine.window().read(|s| s.keys_under("tableFilters")).unwrap().is_empty());

        engine.set("tableFilters.filter_1.value", "test").unwrap();
        let form = engine.window().read(|s| s.serialize_form()).unwrap();
        assert_eq!(form, "tableFilters%5Bfilter_1%5D%5Bvalue%5D=test");

        let (reloaded, _) = reload(&def, &history);
        assert_eq!(
            reloaded.scope().property("tableFilters.filter_1.value").unwrap(),
            Some(&json!("test"))
        );
        assert_eq!(
            reloaded.scope().property("tableFilters.filter_2.value").unwrap(),
            Some(&Value::Null)
        );
    }

    #[test]
    fn test_spaces_and_commas() {
        let def = definition(json!({
            "name": "encode",
            "state": {"space": "", "comma": ""},
            "query_string": ["space", "comma"]
        }));
        let (mut engine, _) = mount_at(&def, "");
        engine.set("space", "foo bar").unwrap();
        let report = engine.set("comma", "foo,bar").unwrap();
        assert_eq!(report.search, "?space=foo+bar&comma=foo,bar");
    }

    #[test]
    fn test_reserved_characters_survive_reparse() {
        let def = definition(json!({
            "name": "reserved",
            "state": {"exclamation": "", "quote": "", "parentheses": "", "asterisk": ""},
            "query_string": ["exclamation", "quote", "parentheses", "asterisk"]
        }));
        let (mut engine, _) = mount_at(&def, "");
        engine.set("exclamation", "foo!").unwrap();
        engine.set("quote", "it's").unwrap();
        engine.set("parentheses", "foo(bar)").unwrap();
        let report = engine.set("asterisk", "foo*").unwrap();

        assert!(report.search.contains("exclamation=foo!"));
        assert!(report.search.contains("parentheses=foo(bar)"));
        assert!(report.search.contains("asterisk=foo*"));

        let parsed: Vec<(String, String)> = url::form_urlencoded::parse(report.search[1..].as_bytes())
            .into_owned()
            .collect();
        assert_eq!(
            parsed,
            vec![
                ("exclamation".to_string(), "foo!".to_string()),
                ("quote".to_string(), "it's".to_string()),
                ("parentheses".to_string(), "foo(bar)".to_string()),
                ("asterisk".to_string(), "foo*".to_string()),
            ]
        );
    }

    #[test]
    fn test_except_other_than_initial_value() {
        let mut scope = ComponentScope::new("search", json!({"search": ""}));
        scope.bind("search", BindingOptions::new().except("")).unwrap();
        scope.set_property("search", "foo").unwrap();

        let (window, history) = Window::in_memory("");
        let mut engine = SyncEngine::mount(scope, window, EngineConfig::default()).unwrap();
        assert_eq!(has(&engine, "search").as_deref(), Some("foo"));
        assert_eq!(history.count(HistoryMode::Replace), 1);

        engine.set("search", "bar").unwrap();
        assert_eq!(has(&engine, "search").as_deref(), Some("bar"));
        engine.set("search", " ").unwrap();
        engine.set("search", "").unwrap();
        assert_eq!(has(&engine, "search"), None);
    }

    #[test]
    fn test_initial_query_value_wins_over_default() {
        let def = definition(json!({
            "name": "perPage",
            "state": {"perPage": "15"},
            "query_string": ["perPage"]
        }));
        let (engine, history) = mount_at(&def, "?perPage=25");
        assert_eq!(engine.state()["perPage"], json!("25"));
        assert_eq!(has(&engine, "perPage").as_deref(), Some("25"));
        assert!(history.log().is_empty());
    }

    #[test]
    fn test_form_object_properties() {
        let def = definition(json!({
            "name": "form",
            "state": {"form": {"foo": "bar", "bob": "lob"}},
            "query_string": {"form.foo": {}, "form.bob": {"as": "aliased"}}
        }));
        let (mut engine, _) = mount_at(&def, "");
        assert_eq!(engine.window().search().unwrap(), "");

        engine.set("form.foo", "baz").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some("baz"));
        assert_eq!(has(&engine, "bob"), None);
        assert_eq!(has(&engine, "aliased"), None);

        engine.set("form.bob", "law").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some("baz"));
        assert_eq!(has(&engine, "bob"), None);
        assert_eq!(has(&engine, "aliased").as_deref(), Some("law"));
    }

    fn enum_scope(backing: EnumBacking, first: BackingValue, second: BackingValue) -> ComponentScope {
        let ty = EnumType::new(backing, [("First", first), ("Second", second)]).unwrap();
        let mut scope = ComponentScope::new("enum", json!({"foo": "First"}));
        scope
            .bind("foo", BindingOptions::new().typed(DeclaredType::Enum(ty)))
            .unwrap();
        scope
    }

    #[test]
    fn test_string_backed_enum() {
        let make = || {
            enum_scope(
                EnumBacking::String,
                BackingValue::String("first".into()),
                BackingValue::String("second".into()),
            )
        };
        let (window, history) = Window::in_memory("");
        let mut engine = SyncEngine::mount(make(), window, EngineConfig::default()).unwrap();
        assert_eq!(has(&engine, "foo"), None);

        engine.set("foo", "Second").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some("second"));

        let (window, _) = Window::in_memory(&history.current());
        let reloaded = SyncEngine::mount(make(), window, EngineConfig::default()).unwrap();
        assert_eq!(reloaded.state()["foo"], json!("Second"));
        assert_eq!(has(&reloaded, "foo").as_deref(), Some("second"));
    }

    #[test]
    fn test_integer_backed_enum() {
        let make = || enum_scope(EnumBacking::Integer, BackingValue::Integer(1), BackingValue::Integer(2));
        let (window, history) = Window::in_memory("");
        let mut engine = SyncEngine::mount(make(), window, EngineConfig::default()).unwrap();
        assert_eq!(has(&engine, "foo"), None);

        engine.set("foo", "Second").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some("2"));

        let (window, _) = Window::in_memory(&history.current());
        let reloaded = SyncEngine::mount(make(), window, EngineConfig::default()).unwrap();
        assert_eq!(reloaded.state()["foo"], json!("Second"));
    }

    #[test]
    fn test_integer_enum_mismatch_fails_mount() {
        let scope = enum_scope(EnumBacking::Integer, BackingValue::Integer(1), BackingValue::Integer(2));
        let (window, _) = Window::in_memory("?foo=abc");
        let result = SyncEngine::mount(scope, window, EngineConfig::default());
        assert!(matches!(result, Err(Error::Decode { ref key, .. }) if key == "foo"));
    }

    #[test]
    fn test_string_typed_property_decodes() {
        let def = definition(json!({
            "name": "typed",
            "state": {"foo": ""},
            "query_string": {"foo": {"type": {"kind": "string"}}}
        }));
        let (engine, _) = mount_at(&def, "?foo=bar");
        assert_eq!(engine.state()["foo"], json!("bar"));
    }

    #[test]
    fn test_unset_nested_leaf_removes_alias_key() {
        let declarations = [
            json!({"tableFilters.filter_1.value": {"as": "filter"}}),
            json!({"tableFilters.filter_1.value": {"as": "filter", "except": ""}}),
            json!({"tableFilters": {"filter_1": {"value": {"as": "filter"}}}}),
            json!({"tableFilters": {"filter_1": {"value": {"as": "filter", "except": ""}}}}),
        ];
        for query_string in declarations {
            let def = definition(json!({
                "name": "unset",
                "state": {"tableFilters": []},
                "query_string": query_string
            }));
            let (mut engine, _) = mount_at(&def, "");
            assert_eq!(has(&engine, "filter"), None);

            engine.set("tableFilters.filter_1.value", "foo").unwrap();
            assert_eq!(
                serde_json::to_string(&engine.state()["tableFilters"]).unwrap(),
                r#"{"filter_1":{"value":"foo"}}"#
            );
            assert_eq!(has(&engine, "filter").as_deref(), Some("foo"));

            let report = engine.unset("tableFilters.filter_1.value").unwrap();
            assert_eq!(engine.state()["tableFilters"], json!({"filter_1": {}}));
            assert_eq!(has(&engine, "filter"), None);
            assert_eq!(report.touched, vec!["filter".to_string()]);
        }
    }

    #[test]
    fn test_empty_value_kept_as_empty_string() {
        let def = definition(json!({
            "name": "empty",
            "state": {"foo": null},
            "query_string": ["foo"]
        }));
        let (mut engine, history) = mount_at(&def, "");
        assert_eq!(has(&engine, "foo"), None);

        engine.set("foo", "bar").unwrap();
        let (mut engine, history) = reload(&def, &history);
        assert_eq!(engine.state()["foo"], json!("bar"));

        engine.set("foo", "").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some(""));
        assert_eq!(history.current(), "?foo=");

        let (reloaded, _) = reload(&def, &history);
        assert_eq!(reloaded.state()["foo"], json!(""));
        assert_eq!(has(&reloaded, "foo").as_deref(), Some(""));
    }

    #[test]
    fn test_nullable_no_value_is_null() {
        let def = definition(json!({
            "name": "nullable",
            "state": {"foo": null},
            "query_string": {"foo": {"nullable": true}}
        }));
        let (mut engine, history) = mount_at(&def, "");
        engine.set("foo", "bar").unwrap();
        assert_eq!(has(&engine, "foo").as_deref(), Some("bar"));

        engine.set("foo", Value::Null).unwrap();
        assert_eq!(has(&engine, "foo"), None);
        let (reloaded, _) = reload(&def, &history);
        assert_eq!(reloaded.state()["foo"], Value::Null);

        let (from_empty, _) = mount_at(&def, "?foo=");
        assert_eq!(from_empty.state()["foo"], json!(""));
        assert_eq!(has(&from_empty, "foo").as_deref(), Some(""));
    }

    #[test]
    fn test_nullable_empty_string_survives_reload() {
        let def = definition(json!({
            "name": "nullable",
            "state": {},
            "query_string": {"foo": {"type": {"kind": "string", "nullable": true}}}
        }));
        let (mut engine, history) = mount_at(&def, "");
        engine.set("foo", "").unwrap();
        assert_eq!(history.current(), "?foo=");

        let (reloaded, reloaded_history) = reload(&def, &history);
        assert_eq!(reloaded.state()["foo"], json!(""));
        assert_eq!(reloaded.window().search().unwrap(), "?foo=");
        assert_eq!(reloaded_history.current(), "?foo=");
    }

    #[test]
    fn test_null_or_empty_by_declared_type() {
        let def = definition(json!({
            "name": "typehints",
            "state": {},
            "query_string": {
                "nullableFoo": {"type": {"kind": "string", "nullable": true}},
                "notNullableFoo": {"type": {"kind": "string"}},
                "notTypehintingFoo": {}
            }
        }));
        let (mut engine, history) = mount_at(&def, "");
        assert_eq!(engine.window().search().unwrap(), "");

        engine
            .apply(vec![
                Mutation::set("nullableFoo", "bar").unwrap(),
                Mutation::set("notNullableFoo", "bar").unwrap(),
                Mutation::set("notTypehintingFoo", "bar").unwrap(),
            ])
            .unwrap();
        assert_eq!(
            history.current(),
            "?nullableFoo=bar&notNullableFoo=bar&notTypehintingFoo=bar"
        );

        let (mut engine, history) = reload(&def, &history);
        engine
            .apply(vec![
                Mutation::set("nullableFoo", Value::Null).unwrap(),
                Mutation::set("notNullableFoo", "").unwrap(),
                Mutation::set("notTypehintingFoo", Value::Null).unwrap(),
            ])
            .unwrap();
        assert_eq!(has(&engine, "nullableFoo"), None);
        assert_eq!(has(&engine, "notNullableFoo").as_deref(), Some(""));
        assert_eq!(has(&engine, "notTypehintingFoo"), None);

        let (reloaded, _) = reload(&def, &history);
        assert_eq!(reloaded.state()["notNullableFoo"], json!(""));

        let (empties, _) = mount_at(&def, "?nullableFoo=&notNullableFoo=&notTypehintingFoo=");
        assert_eq!(empties.state()["nullableFoo"], json!(""));
        assert_eq!(empties.state()["notNullableFoo"], json!(""));
        assert_eq!(empties.state()["notTypehintingFoo"], json!(""));
    }

    #[test]
    fn test_sibling_instances_are_isolated() {
        let def = definition(json!({
            "name": "child",
            "state": {"value": ""},
            "query_string": {"value": {"as": "{queryParameterName}"}}
        }));
        let (window, _) = Window::in_memory("");
        let mut engines: Vec<SyncEngine> = ["foo", "bar"]
            .iter()
            .map(|name| {
                let mut params = HashMap::new();
                params.insert("queryParameterName".to_string(), name.to_string());
                let scope = def.instantiate(&params, HistoryMode::Replace).unwrap();
                SyncEngine::mount(scope, window.clone(), EngineConfig::default()).unwrap()
            })
            .collect();

        engines[0].set("value", "test").unwrap();
        assert_eq!(window.get("foo").unwrap().as_deref(), Some("test"));
        assert_eq!(window.get("bar").unwrap(), None);
        assert_eq!(engines[1].state()["value"], json!(""));
    }

    #[test]
    fn test_other_keys_untouched() {
        let def = definition(json!({"name": "c", "state": {"q": ""}, "query_string": ["q"]}));
        let (mut engine, _) = mount_at(&def, "?utm_source=mail&q=old");
        engine.set("q", "").unwrap();
        assert_eq!(engine.window().search().unwrap(), "?utm_source=mail");
    }

    #[test]
    fn test_push_wins_within_batch() {
        let def = definition(json!({
            "name": "history",
            "state": {"page": 1, "search": ""},
            "query_string": {"page": {"history": true}, "search": {}}
        }));
        let (mut engine, history) = mount_at(&def, "");

        let report = engine.set("search", "abc").unwrap();
        assert_eq!(report.committed, Some(HistoryMode::Replace));
        assert_eq!(history.len(), 1);

        let report = engine
            .apply(vec![Mutation::set("page", 2).unwrap(), Mutation::set("search", "abcd").unwrap()])
            .unwrap();
        assert_eq!(report.committed, Some(HistoryMode::Push));
        assert_eq!(history.len(), 2);
        assert_eq!(history.current(), "?search=abcd&page=2");
    }

    #[test]
    fn test_unchanged_state_does_not_commit() {
        let def = definition(json!({"name": "c", "state": {"q": ""}, "query_string": ["q"]}));
        let (mut engine, history) = mount_at(&def, "");
        engine.set("q", "x").unwrap();
        let report = engine.set("q", "x").unwrap();
        assert_eq!(report.committed, None);
        assert!(report.touched.is_empty());
        assert_eq!(history.log().len(), 1);
    }

    #[test]
    fn test_hook_mutations_run_after_cycle() {
        let def = definition(json!({
            "name": "paged",
            "state": {"search": "", "page": 1},
            "query_string": ["search", "page"]
        }));
        let (window, _) = Window::in_memory("?page=3");
        let scope = def.instantiate(&HashMap::new(), HistoryMode::Replace).unwrap();
        let mut engine = SyncEngine::mount(
            scope,
            window,
            EngineConfig {
                sync_on_mount: false,
                ..EngineConfig::default()
            },
        )
        .unwrap();
        // Untyped bindings decode to strings.
        assert_eq!(engine.state()["page"], json!("3"));

        engine
            .on_updated(
                "search",
                Box::new(|_: &PropertyPath, _: &Value| vec![Mutation::set("page", 1).unwrap()]),
            )
            .unwrap();

        let report = engine.set("search", "rust").unwrap();
        assert_eq!(report.cycles, 2);
        assert_eq!(report.touched, vec!["search".to_string(), "page".to_string()]);
        assert_eq!(report.search, "?search=rust");
        assert_eq!(engine.phase(), SyncPhase::Initialized);
    }

    #[test]
    fn test_hook_follow_up_runs_after_whole_batch() {
        let def = definition(json!({
            "name": "paged",
            "state": {"search": "", "page": 1},
            "query_string": ["search", "page"]
        }));
        let (mut engine, history) = mount_at(&def, "");
        engine
            .on_updated(
                "search",
                Box::new(|_: &PropertyPath, _: &Value| vec![Mutation::set("page", 1).unwrap()]),
            )
            .unwrap();

        let report = engine
            .apply(vec![Mutation::set("search", "rust").unwrap(), Mutation::set("page", 5).unwrap()])
            .unwrap();
        assert_eq!(report.cycles, 2);
        assert_eq!(engine.state()["page"], json!(1));
        assert_eq!(report.search, "?search=rust");
        assert_eq!(history.entries(), vec!["?search=rust".to_string()]);
        assert_eq!(engine.phase(), SyncPhase::Initialized);
    }

    #[test]
    fn test_runaway_hooks_fail() {
        let def = definition(json!({"name": "c", "state": {"n": 0}, "query_string": ["n"]}));
        let (window, _) = Window::in_memory("");
        let scope = def.instantiate(&HashMap::new(), HistoryMode::Replace).unwrap();
        let config = EngineConfig {
            max_cascade: 3,
            ..EngineConfig::default()
        };
        let mut engine = SyncEngine::mount(scope, window, config).unwrap();
        engine
            .on_updated(
                "n",
                Box::new(|_: &PropertyPath, state: &Value| {
                    let next = state["n"].as_i64().unwrap_or(0) + 1;
                    vec![Mutation::set("n", next).unwrap()]
                }),
            )
            .unwrap();

        let result = engine.set("n", 1);
        assert!(matches!(result, Err(Error::Cascade(3))));
        assert_eq!(engine.phase(), SyncPhase::Initialized);
        assert!(engine.sync().is_ok());
    }

    #[test]
    fn test_malformed_bracket_key_ignored() {
        let def = definition(json!({
            "name": "filters",
            "state": {"tableFilters": {"a": null}},
            "query_string": ["tableFilters"]
        }));
        let (engine, _) = mount_at(&def, "?tableFilters[a=1&tableFilters[a]=2");
        assert_eq!(engine.state()["tableFilters"], json!({"a": "2"}));
    }

    #[test]
    fn test_out_of_range_array_index_ignored() {
        let def = definition(json!({
            "name": "tags",
            "state": {"tags": []},
            "query_string": ["tags"]
        }));
        let (engine, history) = mount_at(&def, "?tags[18446744073709551615]=x&tags[1000000000]=y");
        assert_eq!(engine.state()["tags"], json!([]));
        assert_eq!(engine.window().search().unwrap(), "");
        assert_eq!(history.count(HistoryMode::Replace), 1);

        let (engine, _) = mount_at(&def, "?tags[0]=a&tags[5]=b&tags[1]=c");
        assert_eq!(engine.state()["tags"], json!(["a", "c"]));
    }

    #[test]
    fn test_composite_array_round_trip() {
        let def = definition(json!({
            "name": "tags",
            "state": {"tags": []},
            "query_string": ["tags"]
        }));
        let (mut engine, history) = mount_at(&def, "");
        engine.set("tags", json!(["a", "b"])).unwrap();
        assert_eq!(history.current(), "?tags[0]=a&tags[1]=b");

        let (reloaded, _) = reload(&def, &history);
        assert_eq!(reloaded.state()["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_composite_back_to_default_clears_keys() {
        let def = definition(json!({
            "name": "filters",
            "state": {"tableFilters": {"filter_1": {"value": null}}},
            "query_string": ["tableFilters"]
        }));
        let (mut engine, _) = mount_at(&def, "");
        engine.set("tableFilters.filter_1.value", "x").unwrap();
        engine.set("tableFilters.filter_1.extra", "y").unwrap();
        assert_eq!(engine.window().read(|s| s.len()).unwrap(), 2);

        engine.unset("tableFilters.filter_1.extra").unwrap();
        assert_eq!(engine.window().search().unwrap(), "?tableFilters[filter_1][value]=x");
        engine.set("tableFilters.filter_1.value", Value::Null).unwrap();
        assert_eq!(engine.window().search().unwrap(), "");
    }

    #[test]
    fn test_container_on_scalar_binding_is_dropped() {
        let def = definition(json!({"name": "c", "state": {"foo": null}, "query_string": ["foo"]}));
        let (mut engine, history) = mount_at(&def, "");
        engine.set("foo", "bar").unwrap();

        let report = engine.set("foo", json!({"a": 1})).unwrap();
        assert_eq!(report.touched, vec!["foo".to_string()]);
        assert_eq!(has(&engine, "foo"), None);
        assert_eq!(has(&engine, "foo[a]"), None);
        assert_eq!(history.current(), "");
    }

    #[test]
    fn test_keep_writes_default() {
        let def = definition(json!({
            "name": "kept",
            "state": {"sort": "asc"},
            "query_string": {"sort": {"keep": true}}
        }));
        let (engine, history) = mount_at(&def, "");
        assert_eq!(has(&engine, "sort").as_deref(), Some("asc"));
        assert_eq!(history.count(HistoryMode::Replace), 1);
    }

    #[test]
    fn test_teardown_returns_scope() {
        let def = definition(json!({"name": "c", "state": {"q": ""}, "query_string": ["q"]}));
        let (mut engine, _) = mount_at(&def, "");
        engine.set("q", "kept").unwrap();
        let window = engine.window().clone();
        let scope = engine.teardown();
        assert_eq!(scope.state()["q"], json!("kept"));
        assert_eq!(window.get("q").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_mutation_serde() {
        let mutation: Mutation =
            serde_json::from_value(json!({"op": "set", "path": "a.b", "value": 1})).unwrap();
        assert_eq!(mutation, Mutation::set("a.b", 1).unwrap());
        let unset: Mutation = serde_json::from_value(json!({"op": "unset", "path": "a"})).unwrap();
        assert_eq!(unset.path().to_dotted(), "a");
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: EngineConfig = serde_json::from_value(json!({"default_history": "push"})).unwrap();
        assert_eq!(config.default_history, HistoryMode::Push);
        assert!(config.sync_on_mount);
        assert_eq!(config.max_cascade, 16);
    }
}
