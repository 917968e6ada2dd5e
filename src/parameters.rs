//! ParameterSet - ordered, named collections of typed configuration values
//!
//! A parameter set is the unit that moves between modules during a settings
//! change. Sets are cheap to clone: the entries are shared until one of the
//! copies is written to, at which point that copy detaches (copy-on-write).
//! This makes it safe to hand the same snapshot to every module in a
//! broadcast and to keep old snapshots around for rollback.
//!
//! Entries are kept in insertion order. A value may itself be a nested
//! [`ParameterSet`]; the settings coordinator keeps one such section per
//! module, keyed by module name.
//!
//! # Example
//!
//! ```rust
//! use storm_hal::parameters::{Parameter, ParameterSet};
//!
//! let mut stage = ParameterSet::new("stage");
//! stage.add("velocity", Parameter::new(5.0).with_range(0.0, 10.0));
//!
//! let snapshot = stage.clone();
//! stage.set("velocity", 7.5.into()).unwrap();
//!
//! assert_eq!(snapshot.get("velocity").and_then(|v| v.as_float()), Some(5.0));
//! assert_eq!(stage.get("velocity").and_then(|v| v.as_float()), Some(7.5));
//! ```

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppResult, HalError};

/// Name of the bookkeeping entry marking a set that every module has accepted.
pub const INITIALIZED: &str = "initialized";

// =============================================================================
// Values
// =============================================================================

/// A typed parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Free text, or one of a set of choices
    Text(String),
    /// Nested set, used for per-module sections.
    Section(ParameterSet),
}

impl ParameterValue {
    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Int(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::Text(_) => "text",
            ParameterValue::Section(_) => "section",
        }
    }

    /// The value if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value if it is an integer. Floats are not truncated.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(f) => Some(*f),
            ParameterValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The value if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The nested set, for section entries.
    pub fn as_section(&self) -> Option<&ParameterSet> {
        match self {
            ParameterValue::Section(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line style literal (`true`, `12`, `0.5`, anything else is text).
    pub fn parse_literal(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            ParameterValue::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            ParameterValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            ParameterValue::Float(f)
        } else {
            ParameterValue::Text(raw.to_string())
        }
    }

    fn from_toml(name: &str, value: &toml::Value) -> AppResult<Self> {
        Ok(match value {
            toml::Value::Boolean(b) => ParameterValue::Bool(*b),
            toml::Value::Integer(i) => ParameterValue::Int(*i),
            toml::Value::Float(f) => ParameterValue::Float(*f),
            toml::Value::String(s) => ParameterValue::Text(s.clone()),
            toml::Value::Table(table) => {
                ParameterValue::Section(ParameterSet::from_table(name, table)?)
            }
            toml::Value::Array(_) => {
                return Err(HalError::ParameterType {
                    name: name.to_string(),
                    expected: "scalar or table",
                    found: "array",
                })
            }
            toml::Value::Datetime(_) => {
                return Err(HalError::ParameterType {
                    name: name.to_string(),
                    expected: "scalar or table",
                    found: "datetime",
                })
            }
        })
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            ParameterValue::Bool(b) => toml::Value::Boolean(*b),
            ParameterValue::Int(i) => toml::Value::Integer(*i),
            ParameterValue::Float(f) => toml::Value::Float(*f),
            ParameterValue::Text(s) => toml::Value::String(s.clone()),
            ParameterValue::Section(s) => toml::Value::Table(s.to_table()),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{b}"),
            ParameterValue::Int(i) => write!(f, "{i}"),
            ParameterValue::Float(x) => write!(f, "{x}"),
            ParameterValue::Text(s) => f.write_str(s),
            ParameterValue::Section(s) => write!(f, "[{}]", s.name()),
        }
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParameterValue::Bool(b) => serializer.serialize_bool(*b),
            ParameterValue::Int(i) => serializer.serialize_i64(*i),
            ParameterValue::Float(f) => serializer.serialize_f64(*f),
            ParameterValue::Text(s) => serializer.serialize_str(s),
            ParameterValue::Section(s) => s.serialize(serializer),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl From<ParameterSet> for ParameterValue {
    fn from(value: ParameterSet) -> Self {
        ParameterValue::Section(value)
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// Parameter constraints for validation
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Constraints {
    /// No constraints
    #[default]
    None,

    /// Inclusive numeric range
    Range {
        /// Smallest accepted value
        min: f64,
        /// Largest accepted value
        max: f64,
    },

    /// Allowed text values
    Choices(Vec<String>),
}

impl Constraints {
    /// Validate value against constraints
    ///
    /// NaN is never inside a range.
    pub fn validate(&self, name: &str, value: &ParameterValue) -> AppResult<()> {
        match self {
            Constraints::None => Ok(()),

            Constraints::Range { min, max } => match value.as_float() {
                Some(v) if v.is_nan() || v < *min || v > *max => Err(HalError::ParameterOutOfRange {
                    name: name.to_string(),
                    value: v,
                    min: *min,
                    max: *max,
                }),
                _ => Ok(()),
            },

            Constraints::Choices(choices) => match value.as_str() {
                Some(s) if !choices.iter().any(|c| c == s) => {
                    Err(HalError::ParameterInvalidChoice {
                        name: name.to_string(),
                        value: s.to_string(),
                    })
                }
                _ => Ok(()),
            },
        }
    }

    /// Pull a numeric value into range; other values pass through unchanged.
    ///
    /// NaN, and integers when no integer fits the range, are left as they
    /// are for [`validate`](Self::validate) to reject.
    pub fn clamp(&self, value: ParameterValue) -> ParameterValue {
        let Constraints::Range { min, max } = self else {
            return value;
        };
        if min.is_nan() || max.is_nan() || min > max {
            return value;
        }
        match value {
            ParameterValue::Float(f) if !f.is_nan() => ParameterValue::Float(f.clamp(*min, *max)),
            ParameterValue::Int(i) => {
                let (lo, hi) = (min.ceil(), max.floor());
                if lo > hi {
                    ParameterValue::Int(i)
                } else {
                    ParameterValue::Int(i.clamp(lo as i64, hi as i64))
                }
            }
            other => other,
        }
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// A single entry: value plus the flags that govern editing and saving.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    value: ParameterValue,
    description: Option<String>,
    constraints: Constraints,
    is_mutable: bool,
    is_saved: bool,
}

impl Parameter {
    /// Create a mutable, saved parameter.
    pub fn new(value: impl Into<ParameterValue>) -> Self {
        Self {
            value: value.into(),
            description: None,
            constraints: Constraints::None,
            is_mutable: true,
            is_saved: true,
        }
    }

    /// Attach a human readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict numeric values to `min..=max`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints = Constraints::Range { min, max };
        self
    }

    /// Restrict text values to `choices`.
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = Constraints::Choices(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Not editable through [`ParameterSet::set`] or file updates.
    pub fn immutable(mut self) -> Self {
        self.is_mutable = false;
        self
    }

    /// Skipped when the set is written to disk.
    pub fn unsaved(mut self) -> Self {
        self.is_saved = false;
        self
    }

    /// Current value.
    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    /// Description, if one was given.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Range or choices the value must satisfy.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Whether the entry can be changed through [`ParameterSet::set`].
    pub fn is_mutable(&self) -> bool {
        self.is_mutable
    }

    /// Whether the entry is written out by [`ParameterSet::save`].
    pub fn is_saved(&self) -> bool {
        self.is_saved
    }

    /// Pull `incoming` into this entry's range after widening integers
    /// for float entries.
    pub fn clamp(&self, incoming: ParameterValue) -> ParameterValue {
        let value = match (&self.value, incoming) {
            (ParameterValue::Float(_), ParameterValue::Int(i)) => ParameterValue::Float(i as f64),
            (_, other) => other,
        };
        self.constraints.clamp(value)
    }

    /// Convert `incoming` to this entry's type and check constraints.
    fn accept(&self, name: &str, incoming: &ParameterValue) -> AppResult<ParameterValue> {
        let value = match (&self.value, incoming) {
            (ParameterValue::Float(_), ParameterValue::Int(i)) => ParameterValue::Float(*i as f64),
            (current, new) if current.kind() == new.kind() => new.clone(),
            (current, new) => {
                return Err(HalError::ParameterType {
                    name: name.to_string(),
                    expected: current.kind(),
                    found: new.kind(),
                })
            }
        };
        self.constraints.validate(name, &value)?;
        Ok(value)
    }
}

// =============================================================================
// ParameterSet
// =============================================================================

/// Ordered, named collection of parameters with copy-on-write clones.
///
/// Equality compares entries only; the set name and source path are labels.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    name: String,
    source: Option<PathBuf>,
    entries: Arc<IndexMap<String, Parameter>>,
}

impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || self.entries == other.entries
    }
}

impl ParameterSet {
    /// Empty set called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            entries: Arc::new(IndexMap::new()),
        }
    }

    /// Record the file this set was loaded from.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Set name; the file stem for loaded sets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the set.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// File this set was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a top-level entry `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Full entry for `key`, flags and constraints included.
    pub fn parameter(&self, key: &str) -> Option<&Parameter> {
        self.entries.get(key)
    }

    /// Value of the top-level entry `key`.
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.entries.get(key).map(Parameter::value)
    }

    /// Look up a dotted path such as `mosaic.objective`.
    pub fn get_path(&self, path: &str) -> Option<&ParameterValue> {
        match path.split_once('.') {
            Some((head, rest)) => self.section(head)?.get_path(rest),
            None => self.get(path),
        }
    }

    /// Insert or replace an entry, returning the previous one.
    pub fn add(&mut self, key: impl Into<String>, parameter: Parameter) -> Option<Parameter> {
        Arc::make_mut(&mut self.entries).insert(key.into(), parameter)
    }

    /// Change an existing entry, honouring mutability, type and constraints.
    pub fn set(&mut self, key: &str, value: ParameterValue) -> AppResult<()> {
        let parameter = self
            .entries
            .get(key)
            .ok_or_else(|| HalError::ParameterNotFound(key.to_string()))?;
        if !parameter.is_mutable {
            return Err(HalError::ParameterReadOnly(key.to_string()));
        }
        let value = parameter.accept(key, &value)?;
        self.write(key, value);
        Ok(())
    }

    /// [`set`](Self::set) through a dotted path.
    pub fn set_path(&mut self, path: &str, value: ParameterValue) -> AppResult<()> {
        let Some((head, rest)) = path.split_once('.') else {
            return self.set(path, value);
        };
        let mut section = self
            .section(head)
            .cloned()
            .ok_or_else(|| HalError::ParameterNotFound(head.to_string()))?;
        section.set_path(rest, value)?;
        self.write(head, ParameterValue::Section(section));
        Ok(())
    }

    /// Replace a value in place, bypassing the mutability flag.
    fn write(&mut self, key: &str, value: ParameterValue) {
        if let Some(parameter) = Arc::make_mut(&mut self.entries).get_mut(key) {
            parameter.value = value;
        }
    }

    /// Nested set stored under `name`.
    pub fn section(&self, name: &str) -> Option<&ParameterSet> {
        self.get(name).and_then(ParameterValue::as_section)
    }

    /// Store `set` as the section `name`, creating the entry if needed.
    pub fn set_section(&mut self, name: &str, set: ParameterSet) {
        if self.contains(name) {
            self.write(name, ParameterValue::Section(set));
        } else {
            self.add(name, Parameter::new(set));
        }
    }

    /// Merge the values of `incoming` into this set.
    ///
    /// Only keys this set already has are considered; immutable entries are
    /// left alone; nested sections merge recursively. Either every value is
    /// applied or, on the first invalid value, none is. Returns the changed
    /// keys as dotted paths.
    pub fn update_from(&mut self, incoming: &ParameterSet) -> AppResult<Vec<String>> {
        let mut next = self.clone();
        let mut changed = Vec::new();
        for (key, theirs) in incoming.iter() {
            let Some(ours) = self.entries.get(key) else {
                continue;
            };
            if !ours.is_mutable {
                continue;
            }
            match (&ours.value, &theirs.value) {
                (ParameterValue::Section(our_section), ParameterValue::Section(their_section)) => {
                    let mut merged = our_section.clone();
                    let inner = merged.update_from(their_section)?;
                    if !inner.is_empty() {
                        changed.extend(inner.into_iter().map(|k| format!("{key}.{k}")));
                        next.write(key, ParameterValue::Section(merged));
                    }
                }
                _ => {
                    let value = ours.accept(key, &theirs.value)?;
                    if value != ours.value {
                        changed.push(key.to_string());
                        next.write(key, value);
                    }
                }
            }
        }
        *self = next;
        Ok(changed)
    }

    /// Whether every module has accepted this set at least once.
    pub fn is_initialized(&self) -> bool {
        self.get(INITIALIZED)
            .and_then(ParameterValue::as_bool)
            .unwrap_or(false)
    }

    /// Flag the set as exercised, adding the bookkeeping entry if missing.
    pub fn mark_initialized(&mut self) {
        if self.contains(INITIALIZED) {
            self.write(INITIALIZED, ParameterValue::Bool(true));
        } else {
            self.add(INITIALIZED, initialized_flag(true));
        }
    }

    /// Add the `initialized` entry (false) unless it is already present.
    pub fn ensure_initialized_flag(&mut self) {
        if !self.contains(INITIALIZED) {
            self.add(INITIALIZED, initialized_flag(false));
        }
    }

    /// Copy holding only the entries flagged `is_saved`, recursively.
    pub fn saved_only(&self) -> ParameterSet {
        let mut out = ParameterSet {
            name: self.name.clone(),
            source: self.source.clone(),
            entries: Arc::new(IndexMap::new()),
        };
        for (key, parameter) in self.iter().filter(|(_, p)| p.is_saved) {
            let mut parameter = parameter.clone();
            if let ParameterValue::Section(section) = &parameter.value {
                parameter.value = ParameterValue::Section(section.saved_only());
            }
            out.add(key, parameter);
        }
        out
    }

    // -------------------------------------------------------------------------
    // TOML
    // -------------------------------------------------------------------------

    fn from_table(name: &str, table: &toml::Table) -> AppResult<Self> {
        let mut set = ParameterSet::new(name);
        for (key, value) in table {
            set.add(key.clone(), Parameter::new(ParameterValue::from_toml(key, value)?));
        }
        Ok(set)
    }

    /// Build a set from a TOML value (a table, or an empty value for none).
    pub fn from_toml_value(name: &str, value: &toml::Value) -> AppResult<Self> {
        match value {
            toml::Value::Table(table) => Self::from_table(name, table),
            other => Err(HalError::ParameterType {
                name: name.to_string(),
                expected: "table",
                found: other.type_str(),
            }),
        }
    }

    /// Parse a TOML document; top-level tables become sections.
    pub fn from_toml_str(name: &str, text: &str) -> AppResult<Self> {
        let table: toml::Table = toml::from_str(text)?;
        Self::from_table(name, &table)
    }

    /// Load a parameters file. The set is named after the file stem.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                HalError::ParametersFileNotFound(path.display().to_string())
            }
            _ => HalError::Io(err),
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_toml_str(&name, &text)?.with_source(path))
    }

    fn to_table(&self) -> toml::Table {
        self.iter()
            .map(|(k, p)| (k.to_string(), p.value.to_toml()))
            .collect()
    }

    /// Render the saved entries as a TOML document.
    pub fn to_toml_string(&self) -> AppResult<String> {
        Ok(toml::to_string_pretty(&self.saved_only().to_table())?)
    }

    /// Write the saved entries to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// JSON rendering of every entry, for display and logging.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, parameter) in self.entries.iter() {
            map.serialize_entry(key, &parameter.value)?;
        }
        map.end()
    }
}

fn initialized_flag(value: bool) -> Parameter {
    Parameter::new(value)
        .with_description("Set has been accepted by every module")
        .immutable()
        .unsaved()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> ParameterSet {
        let mut set = ParameterSet::new("stage");
        set.add("velocity", Parameter::new(5.0).with_range(0.0, 10.0));
        set.add("steps", Parameter::new(10i64));
        set.add("mode", Parameter::new("auto").with_choices(["auto", "manual"]));
        set
    }

    #[test]
    fn clones_are_copy_on_write() {
        let mut set = stage();
        let snapshot = set.clone();
        assert!(Arc::ptr_eq(&set.entries, &snapshot.entries));

        set.set("steps", 20i64.into()).unwrap();

        assert_eq!(snapshot.get("steps"), Some(&ParameterValue::Int(10)));
        assert_eq!(set.get("steps"), Some(&ParameterValue::Int(20)));
        assert_ne!(set, snapshot);
    }

    #[test]
    fn set_validates_constraints_and_type() {
        let mut set = stage();
        assert!(matches!(
            set.set("velocity", 11.0.into()),
            Err(HalError::ParameterOutOfRange { .. })
        ));
        assert!(matches!(
            set.set("mode", "turbo".into()),
            Err(HalError::ParameterInvalidChoice { .. })
        ));
        assert!(matches!(
            set.set("steps", "many".into()),
            Err(HalError::ParameterType { .. })
        ));
        // Integers widen into float entries.
        set.set("velocity", 3i64.into()).unwrap();
        assert_eq!(set.get("velocity"), Some(&ParameterValue::Float(3.0)));
    }

    #[test]
    fn immutable_entries_reject_set() {
        let mut set = stage();
        set.ensure_initialized_flag();
        assert!(matches!(
            set.set(INITIALIZED, true.into()),
            Err(HalError::ParameterReadOnly(_))
        ));
        set.mark_initialized();
        assert!(set.is_initialized());
    }

    #[test]
    fn update_from_is_all_or_nothing() {
        let mut set = stage();
        let mut incoming = ParameterSet::new("incoming");
        incoming.add("steps", Parameter::new(3i64));
        incoming.add("velocity", Parameter::new(50.0));

        assert!(set.update_from(&incoming).is_err());
        assert_eq!(set, stage());

        incoming.add("velocity", Parameter::new(2.0));
        incoming.add("unknown", Parameter::new(true));
        let changed = set.update_from(&incoming).unwrap();
        assert_eq!(changed, vec!["steps".to_string(), "velocity".to_string()]);
    }

    #[test]
    fn nested_paths() {
        let mut root = ParameterSet::new("default");
        root.set_section("stage", stage());

        assert_eq!(
            root.get_path("stage.mode").and_then(ParameterValue::as_str),
            Some("auto")
        );
        root.set_path("stage.mode", "manual".into()).unwrap();
        assert_eq!(
            root.get_path("stage.mode").and_then(ParameterValue::as_str),
            Some("manual")
        );
        assert!(root.set_path("camera.exposure", 1.0.into()).is_err());
    }

    #[test]
    fn toml_excludes_unsaved_entries() {
        let mut root = ParameterSet::new("default");
        root.ensure_initialized_flag();
        root.set_section("stage", stage());

        let text = root.to_toml_string().unwrap();
        assert!(!text.contains(INITIALIZED));

        let parsed = ParameterSet::from_toml_str("copy", &text).unwrap();
        assert_eq!(parsed.get_path("stage.steps"), Some(&ParameterValue::Int(10)));
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["stage"]);
    }

    #[test]
    fn toml_rejects_arrays() {
        let err = ParameterSet::from_toml_str("bad", "values = [1, 2]").unwrap_err();
        assert!(matches!(err, HalError::ParameterType { found: "array", .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ParameterSet::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, HalError::ParametersFileNotFound(_)));
    }

    #[test]
    fn clamp_keeps_kind() {
        let range = Constraints::Range { min: 0.0, max: 10.0 };
        assert_eq!(range.clamp(ParameterValue::Float(12.0)), ParameterValue::Float(10.0));
        assert_eq!(range.clamp(ParameterValue::Int(-3)), ParameterValue::Int(0));
        assert_eq!(range.clamp("x".into()), ParameterValue::Text("x".into()));

        // No integer fits; left for validation instead of panicking.
        let narrow = Constraints::Range { min: 0.2, max: 0.8 };
        assert_eq!(narrow.clamp(ParameterValue::Int(5)), ParameterValue::Int(5));
    }

    #[test]
    fn nan_is_out_of_range() {
        let mut set = stage();
        assert!(matches!(
            set.set("velocity", f64::NAN.into()),
            Err(HalError::ParameterOutOfRange { .. })
        ));
        assert_eq!(set.get("velocity"), Some(&ParameterValue::Float(5.0)));

        let range = Constraints::Range { min: 0.0, max: 10.0 };
        assert!(matches!(range.clamp(f64::NAN.into()), ParameterValue::Float(f) if f.is_nan()));
    }

    #[test]
    fn integers_clamp_as_floats_for_float_entries() {
        let velocity = Parameter::new(5.0).with_range(0.1, 10.0);
        assert_eq!(velocity.clamp(ParameterValue::Int(0)), ParameterValue::Float(0.1));
        assert_eq!(velocity.clamp(ParameterValue::Int(25)), ParameterValue::Float(10.0));

        let steps = Parameter::new(10i64).with_range(1.0, 100.0);
        assert_eq!(steps.clamp(ParameterValue::Int(0)), ParameterValue::Int(1));
    }

    #[test]
    fn saved_only_drops_unsaved_entries_recursively() {
        let mut inner = stage();
        inner.add("scratch", Parameter::new(1i64).unsaved());
        let mut root = ParameterSet::new("default");
        root.ensure_initialized_flag();
        root.set_section("stage", inner);

        let saved = root.saved_only();
        assert!(!saved.contains(INITIALIZED));
        assert!(saved.get_path("stage.scratch").is_none());
        assert_eq!(saved.get_path("stage.steps"), Some(&ParameterValue::Int(10)));
    }

    #[test]
    fn json_rendering_nests_sections() {
        let mut root = ParameterSet::new("default");
        root.set_section("stage", stage());
        let json = root.to_json();
        assert_eq!(json["stage"]["velocity"], serde_json::json!(5.0));
        assert_eq!(json["stage"]["mode"], serde_json::json!("auto"));
    }

    #[test]
    fn parse_literal_guesses_type() {
        assert_eq!(ParameterValue::parse_literal("true"), ParameterValue::Bool(true));
        assert_eq!(ParameterValue::parse_literal("12"), ParameterValue::Int(12));
        assert_eq!(ParameterValue::parse_literal("0.5"), ParameterValue::Float(0.5));
        assert_eq!(
            ParameterValue::parse_literal("obj1"),
            ParameterValue::Text("obj1".into())
        );
    }
}
