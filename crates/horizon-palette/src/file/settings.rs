//! Persistent application settings.
//!
//! [`Settings`] is a hierarchical key/value store. Keys are paths whose
//! components are separated by `.` or `/`; the auto-palette glue uses
//! two-level `group/key` paths such as `Style/Theme`:
//!
//! ```ignore
//! use horizon_palette::file::{Settings, SettingsFormat};
//!
//! let settings = Settings::open("settings.toml", SettingsFormat::Toml)?;
//! settings.write("Style", "AutoPalette", true)?;
//!
//! let auto: bool = settings.value_or("Style", "AutoPalette", false);
//! ```
//!
//! Stores are persisted as JSON, TOML or INI. Every save replaces the file
//! atomically. Concurrent writers are not coordinated: the last write wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use horizon_palette_core::Signal;
use horizon_palette_core::logging::targets;
use ini::Ini;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::{FileError, FileResult};
use super::operations::{atomic_write, read_text};

const TARGET: &str = targets::SETTINGS;

/// A value held in a [`Settings`] store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    /// A null/empty value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A string value.
    String(String),
    /// A nested group.
    Group(BTreeMap<String, SettingsValue>),
}

impl SettingsValue {
    /// Returns this value as a boolean, if it is one.
    ///
    /// Integers are accepted too, as stores written by other tools often
    /// keep flags as `0`/`1`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingsValue::Bool(v) => Some(*v),
            SettingsValue::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Returns this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingsValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns this value as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingsValue::Float(v) => Some(*v),
            SettingsValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingsValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns this value as a group, if it is one.
    pub fn as_group(&self) -> Option<&BTreeMap<String, SettingsValue>> {
        match self {
            SettingsValue::Group(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for SettingsValue {
    fn default() -> Self {
        SettingsValue::Null
    }
}

impl From<bool> for SettingsValue {
    fn from(v: bool) -> Self {
        SettingsValue::Bool(v)
    }
}

impl From<i32> for SettingsValue {
    fn from(v: i32) -> Self {
        SettingsValue::Integer(v.into())
    }
}

impl From<i64> for SettingsValue {
    fn from(v: i64) -> Self {
        SettingsValue::Integer(v)
    }
}

impl From<f64> for SettingsValue {
    fn from(v: f64) -> Self {
        SettingsValue::Float(v)
    }
}

impl From<String> for SettingsValue {
    fn from(v: String) -> Self {
        SettingsValue::String(v)
    }
}

impl From<&str> for SettingsValue {
    fn from(v: &str) -> Self {
        SettingsValue::String(v.to_string())
    }
}

/// On-disk representation of a settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsFormat {
    /// JSON.
    Json,
    /// TOML.
    #[default]
    Toml,
    /// INI key file. The general section holds top-level keys and each
    /// `[Section]` becomes a group; deeper groups are written as
    /// `sub/key` entries.
    Ini,
}

impl SettingsFormat {
    /// Guess the format from a file extension, defaulting to TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            Some(ext) if ext.eq_ignore_ascii_case("ini") => Self::Ini,
            _ => Self::Toml,
        }
    }
}

impl FromStr for SettingsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            "ini" => Ok(Self::Ini),
            other => Err(format!("unknown settings format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
struct AutoSave {
    path: PathBuf,
    format: SettingsFormat,
}

type Tree = BTreeMap<String, SettingsValue>;

/// A hierarchical key/value settings store.
///
/// All methods take `&self`; the store is safe to share behind an `Arc`.
pub struct Settings {
    data: RwLock<Tree>,
    changed: Signal<String>,
    auto_save: RwLock<Option<AutoSave>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Creates an empty, in-memory store.
    pub fn new() -> Self {
        Self::from_tree(Tree::new())
    }

    fn from_tree(data: Tree) -> Self {
        Self {
            data: RwLock::new(data),
            changed: Signal::new(),
            auto_save: RwLock::new(None),
        }
    }

    /// Opens the store persisted at `path`, saving back to it on every change.
    ///
    /// A missing file yields an empty store; it is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>, format: SettingsFormat) -> FileResult<Self> {
        let path = path.as_ref();
        let settings = match Self::load(path, format) {
            Ok(settings) => settings,
            Err(err) if err.is_not_found() => {
                tracing::debug!(target: TARGET, path = %path.display(), "no settings file yet");
                Self::new()
            }
            Err(err) => return Err(err),
        };
        settings.set_auto_save(path, format);
        Ok(settings)
    }

    /// Loads a store from `path`.
    pub fn load(path: impl AsRef<Path>, format: SettingsFormat) -> FileResult<Self> {
        let path = path.as_ref();
        let content = read_text(path)?;
        let data = match format {
            SettingsFormat::Json => {
                serde_json::from_str(&content).map_err(|e| FileError::invalid_data(path, e))?
            }
            SettingsFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(&content).map_err(|e| FileError::invalid_data(path, e))?;
                table
                    .into_iter()
                    .map(|(key, value)| (key, toml_to_value(value)))
                    .collect()
            }
            SettingsFormat::Ini => {
                let ini = Ini::load_from_str(&content)
                    .map_err(|e| FileError::invalid_data(path, e))?;
                ini_to_tree(&ini)
            }
        };
        tracing::debug!(target: TARGET, path = %path.display(), ?format, "settings loaded");
        Ok(Self::from_tree(data))
    }

    /// Writes the whole store to `path`.
    pub fn save(&self, path: impl AsRef<Path>, format: SettingsFormat) -> FileResult<()> {
        let path = path.as_ref();
        let bytes = {
            let data = self.data.read();
            match format {
                SettingsFormat::Json => serde_json::to_string_pretty(&*data)
                    .map_err(|e| FileError::invalid_data(path, e))?
                    .into_bytes(),
                SettingsFormat::Toml => {
                    let table: toml::Table = data
                        .iter()
                        .filter_map(|(key, value)| Some((key.clone(), value_to_toml(value)?)))
                        .collect();
                    toml::to_string_pretty(&table)
                        .map_err(|e| FileError::invalid_data(path, e))?
                        .into_bytes()
                }
                SettingsFormat::Ini => {
                    let mut bytes = Vec::new();
                    tree_to_ini(&data)
                        .write_to(&mut bytes)
                        .map_err(|e| FileError::from_io(e, path))?;
                    bytes
                }
            }
        };

        atomic_write(path, |writer| writer.write_bytes(&bytes))
    }

    /// Saves to the auto-save target, if one is configured.
    pub fn sync(&self) -> FileResult<()> {
        let target = self.auto_save.read().clone();
        match target {
            Some(AutoSave { path, format }) => self.save(path, format),
            None => Ok(()),
        }
    }

    /// Persist to `path` after every change.
    pub fn set_auto_save(&self, path: impl AsRef<Path>, format: SettingsFormat) {
        *self.auto_save.write() = Some(AutoSave {
            path: path.as_ref().to_path_buf(),
            format,
        });
    }

    /// Stop persisting changes automatically.
    pub fn disable_auto_save(&self) {
        *self.auto_save.write() = None;
    }

    /// Returns the auto-save target path, if any.
    pub fn auto_save_path(&self) -> Option<PathBuf> {
        self.auto_save.read().as_ref().map(|a| a.path.clone())
    }

    /// Emitted with the key path after every modification.
    pub fn changed(&self) -> &Signal<String> {
        &self.changed
    }

    // ========================================================================
    // Group/key access
    // ========================================================================

    /// The raw value of `key` in `group`.
    pub fn read(&self, group: &str, key: &str) -> Option<SettingsValue> {
        self.get_raw(&group_path(group, key))
    }

    /// The value of `key` in `group` converted to `T`, or `default` when it
    /// is missing or of another type.
    pub fn value_or<T: FromSettingsValue>(&self, group: &str, key: &str, default: T) -> T {
        self.get(&group_path(group, key)).unwrap_or(default)
    }

    /// Sets `key` in `group` and persists the store if auto-save is enabled.
    ///
    /// # Errors
    ///
    /// The in-memory value is always updated; an error means it could not be
    /// written to disk.
    pub fn write<V: Into<SettingsValue>>(&self, group: &str, key: &str, value: V) -> FileResult<()> {
        let path = group_path(group, key);
        if self.store(&path, value.into()) {
            self.changed.emit(path);
            self.sync()?;
        }
        Ok(())
    }

    // ========================================================================
    // Path access
    // ========================================================================

    /// Sets the value at `path`, creating intermediate groups.
    ///
    /// Auto-save failures are logged rather than returned; use
    /// [`write`](Self::write) to observe them.
    pub fn set<V: Into<SettingsValue>>(&self, path: &str, value: V) {
        if self.store(path, value.into()) {
            self.changed.emit(path.to_string());
            if let Err(err) = self.sync() {
                tracing::error!(target: TARGET, error = %err, key = path, "failed to auto-save settings");
            }
        }
    }

    /// The value at `path` converted to `T`.
    pub fn get<T: FromSettingsValue>(&self, path: &str) -> Option<T> {
        let data = self.data.read();
        lookup(&data, &split_path(path)).and_then(T::from_settings_value)
    }

    /// The raw value at `path`.
    pub fn get_raw(&self, path: &str) -> Option<SettingsValue> {
        let data = self.data.read();
        lookup(&data, &split_path(path)).cloned()
    }

    /// Returns true if a value exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        let data = self.data.read();
        lookup(&data, &split_path(path)).is_some()
    }

    /// Removes and returns the value at `path`.
    pub fn remove(&self, path: &str) -> Option<SettingsValue> {
        let parts = split_path(path);
        let removed = remove(&mut self.data.write(), &parts);
        if removed.is_some() {
            self.changed.emit(path.to_string());
            if let Err(err) = self.sync() {
                tracing::error!(target: TARGET, error = %err, key = path, "failed to auto-save settings");
            }
        }
        removed
    }

    /// Keys directly under `group`.
    pub fn group_keys(&self, group: &str) -> Vec<String> {
        let data = self.data.read();
        match lookup(&data, &split_path(group)) {
            Some(SettingsValue::Group(children)) => children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns true if the value changed.
    fn store(&self, path: &str, value: SettingsValue) -> bool {
        let parts = split_path(path);
        if parts.is_empty() {
            return false;
        }
        let mut data = self.data.write();
        if lookup(&data, &parts) == Some(&value) {
            return false;
        }
        insert(&mut data, &parts, value);
        true
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("data", &*self.data.read())
            .field("auto_save", &*self.auto_save.read())
            .finish()
    }
}

fn group_path(group: &str, key: &str) -> String {
    format!("{group}/{key}")
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(['.', '/']).filter(|s| !s.is_empty()).collect()
}

fn lookup<'a>(data: &'a Tree, parts: &[&str]) -> Option<&'a SettingsValue> {
    let (first, rest) = parts.split_first()?;
    let value = data.get(*first)?;
    if rest.is_empty() {
        Some(value)
    } else {
        lookup(value.as_group()?, rest)
    }
}

fn insert(data: &mut Tree, parts: &[&str], value: SettingsValue) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        data.insert(first.to_string(), value);
        return;
    }

    let entry = data
        .entry(first.to_string())
        .or_insert_with(|| SettingsValue::Group(Tree::new()));
    if !matches!(entry, SettingsValue::Group(_)) {
        // A scalar in the way is replaced by a group.
        *entry = SettingsValue::Group(Tree::new());
    }
    if let SettingsValue::Group(children) = entry {
        insert(children, rest, value);
    }
}

fn remove(data: &mut Tree, parts: &[&str]) -> Option<SettingsValue> {
    let (first, rest) = parts.split_first()?;
    if rest.is_empty() {
        return data.remove(*first);
    }
    match data.get_mut(*first)? {
        SettingsValue::Group(children) => remove(children, rest),
        _ => None,
    }
}

fn toml_to_value(value: toml::Value) -> SettingsValue {
    match value {
        toml::Value::String(s) => SettingsValue::String(s),
        toml::Value::Integer(i) => SettingsValue::Integer(i),
        toml::Value::Float(f) => SettingsValue::Float(f),
        toml::Value::Boolean(b) => SettingsValue::Bool(b),
        toml::Value::Datetime(dt) => SettingsValue::String(dt.to_string()),
        // Lists are not settings values; keep their text so nothing is lost silently.
        toml::Value::Array(items) => SettingsValue::String(toml::Value::Array(items).to_string()),
        toml::Value::Table(table) => SettingsValue::Group(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_value(v)))
                .collect(),
        ),
    }
}

/// `None` for `Null`, which TOML cannot represent.
fn value_to_toml(value: &SettingsValue) -> Option<toml::Value> {
    Some(match value {
        SettingsValue::Null => return None,
        SettingsValue::Bool(b) => toml::Value::Boolean(*b),
        SettingsValue::Integer(i) => toml::Value::Integer(*i),
        SettingsValue::Float(f) => toml::Value::Float(*f),
        SettingsValue::String(s) => toml::Value::String(s.clone()),
        SettingsValue::Group(children) => toml::Value::Table(
            children
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), value_to_toml(v)?)))
                .collect(),
        ),
    })
}

fn ini_to_tree(ini: &Ini) -> Tree {
    let mut tree = Tree::new();
    for (section, properties) in ini.iter() {
        for (key, raw) in properties.iter() {
            let mut parts: Vec<&str> = section.into_iter().collect();
            parts.extend(split_path(key));
            insert(&mut tree, &parts, parse_ini_value(raw));
        }
    }
    tree
}

/// INI values are untyped; take the narrowest type the text parses as.
fn parse_ini_value(raw: &str) -> SettingsValue {
    if raw.eq_ignore_ascii_case("true") {
        SettingsValue::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        SettingsValue::Bool(false)
    } else if let Ok(i) = raw.parse::<i64>() {
        SettingsValue::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        SettingsValue::Float(f)
    } else {
        SettingsValue::String(raw.to_string())
    }
}

fn tree_to_ini(tree: &Tree) -> Ini {
    let mut ini = Ini::new();
    for (key, value) in tree {
        match value {
            SettingsValue::Group(children) => {
                let mut entries = Vec::new();
                flatten_ini(None, children, &mut entries);
                let mut section = ini.with_section(Some(key.as_str()));
                for (name, text) in entries {
                    section.set(name, text);
                }
            }
            scalar => {
                if let Some(text) = ini_text(scalar) {
                    ini.with_general_section().set(key.as_str(), text);
                }
            }
        }
    }
    ini
}

fn flatten_ini(prefix: Option<&str>, tree: &Tree, out: &mut Vec<(String, String)>) {
    for (key, value) in tree {
        let name = match prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.clone(),
        };
        match value {
            SettingsValue::Group(children) => flatten_ini(Some(&name), children, out),
            scalar => {
                if let Some(text) = ini_text(scalar) {
                    out.push((name, text));
                }
            }
        }
    }
}

/// `None` for `Null` and groups, which have no INI value text.
fn ini_text(value: &SettingsValue) -> Option<String> {
    match value {
        SettingsValue::Null | SettingsValue::Group(_) => None,
        SettingsValue::Bool(b) => Some(b.to_string()),
        SettingsValue::Integer(i) => Some(i.to_string()),
        // Debug keeps the fraction, so `1.0` does not reload as an integer.
        SettingsValue::Float(f) => Some(format!("{f:?}")),
        SettingsValue::String(s) => Some(s.clone()),
    }
}

/// Conversion out of a [`SettingsValue`].
pub trait FromSettingsValue: Sized {
    /// Attempts the conversion.
    fn from_settings_value(value: &SettingsValue) -> Option<Self>;
}

impl FromSettingsValue for bool {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSettingsValue for i64 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_integer()
    }
}

impl FromSettingsValue for i32 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_integer().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSettingsValue for f64 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_float()
    }
}

impl FromSettingsValue for String {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromSettingsValue for SettingsValue {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        Some(value.clone())
    }
}
