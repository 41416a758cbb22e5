use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::middleware::devtools::Devtools;
use crate::middleware::Middleware;
use crate::scheduler::FlushMode;

/// Host-provided wrapper that groups a pass of listener calls into one UI update.
pub type Batcher = Arc<dyn Fn(&mut dyn FnMut()) + Send + Sync>;

/// Custom merge of a JSON patch into the JSON form of the current state.
pub type MergeFn = Arc<dyn Fn(Value, Value) -> Result<Value> + Send + Sync>;

/// Plain-data selector for the built-in merge policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    ShallowMerge,
    Replace,
}

/// How a partial update combines with the current state when a store has no
/// mutator of its own.
#[derive(Clone)]
pub enum MergePolicy {
    /// Top-level keys of the patch overwrite those of the state.
    ShallowMerge,
    /// The patch becomes the new state.
    Replace,
    Custom(MergeFn),
}

impl MergePolicy {
    pub fn apply(&self, store: &str, current: Value, patch: Value) -> Result<Value> {
        match self {
            MergePolicy::ShallowMerge => shallow_merge(store, current, patch),
            MergePolicy::Replace => Ok(patch),
            MergePolicy::Custom(merge) => merge(current, patch),
        }
    }
}

impl From<MergeMode> for MergePolicy {
    fn from(mode: MergeMode) -> Self {
        match mode {
            MergeMode::ShallowMerge => MergePolicy::ShallowMerge,
            MergeMode::Replace => MergePolicy::Replace,
        }
    }
}

impl std::fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::ShallowMerge => f.write_str("ShallowMerge"),
            MergePolicy::Replace => f.write_str("Replace"),
            MergePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Overwrite the top-level keys of `current` with those of `patch`.
///
/// Nested objects are replaced wholesale, never merged. A non-object state
/// is replaced by the patch.
pub fn shallow_merge(store: &str, current: Value, patch: Value) -> Result<Value> {
    match (current, patch) {
        (Value::Object(mut state), Value::Object(partial)) => {
            for (key, value) in partial {
                state.insert(key, value);
            }
            Ok(Value::Object(state))
        }
        (Value::Object(_), other) => Err(StoreError::InvalidPatch {
            store: store.to_string(),
            reason: format!("expected an object patch, got {}", kind_of(&other)),
        }),
        (_, patch) => Ok(patch),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Serializable subset of [`Defaults`], loadable from JSON or the environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub devtools: bool,
    pub batch_updates: bool,
    pub merge: MergeMode,
    pub flush: FlushMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devtools: false,
            batch_updates: true,
            merge: MergeMode::ShallowMerge,
            flush: FlushMode::Auto,
        }
    }
}

impl Settings {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read `CANOPY_DEVTOOLS`, `CANOPY_BATCH_UPDATES`, `CANOPY_MERGE` and
    /// `CANOPY_FLUSH`. Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Settings::default();
        let mut overrides = Map::new();
        for (var, field) in [
            ("CANOPY_DEVTOOLS", "devtools"),
            ("CANOPY_BATCH_UPDATES", "batch_updates"),
            ("CANOPY_MERGE", "merge"),
            ("CANOPY_FLUSH", "flush"),
        ] {
            let Some(raw) = lookup(var) else { continue };
            let value = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Value::Bool(true),
                "0" | "false" | "no" | "off" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            overrides.insert(field.to_string(), value);
        }
        for (field, value) in overrides {
            let mut single = Map::new();
            single.insert(field.clone(), value);
            match serde_json::from_value::<Settings>(Value::Object(single)) {
                Ok(parsed) => settings.take_field(&field, parsed),
                Err(err) => tracing::warn!(%field, %err, "ignoring invalid canopy setting"),
            }
        }
        settings
    }

    fn take_field(&mut self, field: &str, parsed: Settings) {
        match field {
            "devtools" => self.devtools = parsed.devtools,
            "batch_updates" => self.batch_updates = parsed.batch_updates,
            "merge" => self.merge = parsed.merge,
            "flush" => self.flush = parsed.flush,
            _ => {}
        }
    }
}

/// Process-wide knobs read by every store of a runtime.
pub struct Defaults {
    pub devtools: bool,
    pub batch_updates: bool,
    pub merge: MergePolicy,
    pub batcher: Option<Batcher>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) devtools_connection: Option<Arc<dyn Devtools>>,
}

impl Defaults {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            devtools: settings.devtools,
            batch_updates: settings.batch_updates,
            merge: settings.merge.into(),
            batcher: None,
            middlewares: Vec::new(),
            devtools_connection: None,
        }
    }

    /// Number of user middlewares installed so far.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
