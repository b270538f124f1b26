//! Core data types for the Warden gate and registry.
//!
//! Everything here is plain data: the typed parameter schema, program
//! metadata, declared test cases, and plugin output. Shape checking of
//! untrusted metadata lives here too, so the validator and the registry
//! agree on what well-formed means.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Name of the metadata constant every plugin must declare.
pub const METADATA_CONST: &str = "PROGRAM";
/// Name of the optional declared-tests constant.
pub const TESTS_CONST: &str = "TESTS";
/// Fixed entry-point name shared by all plugins.
pub const ENTRY_POINT: &str = "run";

/// Declared type of one plugin parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
    Select,
    ListInt,
    ListFloat,
    ListStr,
}

impl ParamType {
    /// Parse the wire name used inside plugin metadata.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "bool" => Some(Self::Bool),
            "select" => Some(Self::Select),
            "list_int" => Some(Self::ListInt),
            "list_float" => Some(Self::ListFloat),
            "list_str" => Some(Self::ListStr),
            _ => None,
        }
    }

    /// Whether values of this type are lists.
    pub fn is_list(self) -> bool {
        matches!(self, Self::ListInt | Self::ListFloat | Self::ListStr)
    }

    fn wire_name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Select => "select",
            Self::ListInt => "list_int",
            Self::ListFloat => "list_float",
            Self::ListStr => "list_str",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One entry of a plugin's declared parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchemaItem {
    pub key: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// What a plugin produces when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    Module,
    ProjectGenerator,
    Utility,
}

impl ProgramKind {
    /// Parse the wire name used inside plugin metadata.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "project_generator" => Some(Self::ProjectGenerator),
            "utility" => Some(Self::Utility),
            _ => None,
        }
    }
}

impl Default for ProgramKind {
    fn default() -> Self {
        Self::Module
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Module => "module",
            Self::ProjectGenerator => "project_generator",
            Self::Utility => "utility",
        };
        f.write_str(name)
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Metadata snapshot declared by a plugin as `const PROGRAM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ProgramKind,
    pub params: Vec<ParamSchemaItem>,
}

impl ProgramMetadata {
    /// Check the shape of a raw metadata value and parse it if well-formed.
    ///
    /// Returns the typed metadata only when every check passes; all shape
    /// defects found are reported together so a single regeneration round
    /// can fix them all.
    pub fn from_value(value: &Value) -> (Option<Self>, Vec<String>) {
        let mut errors = Vec::new();

        let Some(map) = value.as_object() else {
            return (None, vec![format!("{METADATA_CONST} must be a map")]);
        };

        match map.get("params") {
            None => errors.push(format!("{METADATA_CONST}.params is missing")),
            Some(Value::Array(items)) => {
                let mut seen = BTreeSet::new();
                for (i, item) in items.iter().enumerate() {
                    Self::check_param_item(i, item, &mut seen, &mut errors);
                }
            }
            Some(_) => errors.push(format!(
                "{METADATA_CONST}.params must be a list (use [] if no inputs)"
            )),
        }

        if let Some(kind) = map.get("kind") {
            let valid = kind
                .as_str()
                .map(|s| ProgramKind::parse(s).is_some())
                .unwrap_or(false);
            if !valid {
                errors.push(format!(
                    "{METADATA_CONST}.kind must be one of module, project_generator, utility"
                ));
            }
        }

        if !errors.is_empty() {
            return (None, errors);
        }

        match serde_json::from_value::<Self>(value.clone()) {
            Ok(metadata) => (Some(metadata), errors),
            Err(e) => (None, vec![format!("{METADATA_CONST} is malformed: {e}")]),
        }
    }

    fn check_param_item(
        i: usize,
        item: &Value,
        seen: &mut BTreeSet<String>,
        errors: &mut Vec<String>,
    ) {
        let Some(obj) = item.as_object() else {
            errors.push(format!("params[{i}] must be a map schema object"));
            return;
        };

        let key = obj.get("key").and_then(Value::as_str).unwrap_or("");
        if key.is_empty() {
            errors.push(format!("params[{i}].key must be a non-empty string"));
        } else if !seen.insert(key.to_string()) {
            errors.push(format!("params[{i}].key '{key}' is declared twice"));
        }

        let param_type = obj.get("type").and_then(Value::as_str);
        match param_type.map(ParamType::parse) {
            Some(Some(_)) => {}
            _ => errors.push(format!(
                "params[{i}].type must be one of int, float, str, bool, select, \
                 list_int, list_float, list_str"
            )),
        }

        if !matches!(obj.get("required"), Some(Value::Bool(_))) {
            errors.push(format!("params[{i}].required must be a bool"));
        }

        if param_type == Some("select") {
            let choices_ok = matches!(obj.get("choices"), Some(Value::Array(c)) if !c.is_empty());
            if !choices_ok {
                errors.push(format!(
                    "params[{i}].choices must be a non-empty list for select params"
                ));
            }
        }
    }

    /// Coerce caller-supplied parameters against the declared schema.
    ///
    /// Fills defaults, enforces `required`, casts string inputs to declared
    /// types, validates `select` choices and splits comma-separated list
    /// inputs. Values that already match their declared type pass through
    /// unchanged, and keys the schema does not mention are left alone.
    pub fn coerce_params(
        &self,
        supplied: &BTreeMap<String, Value>,
    ) -> std::result::Result<BTreeMap<String, Value>, Vec<String>> {
        let mut out = supplied.clone();
        let mut errors = Vec::new();

        for item in &self.params {
            let present = out.get(&item.key).filter(|v| !v.is_null()).cloned();
            match present {
                Some(value) => match coerce_value(item, &value) {
                    Ok(coerced) => {
                        out.insert(item.key.clone(), coerced);
                    }
                    Err(e) => errors.push(format!("param '{}': {e}", item.key)),
                },
                None => {
                    if let Some(default) = &item.default {
                        out.insert(item.key.clone(), default.clone());
                    } else if item.required {
                        errors.push(format!("missing required param '{}'", item.key));
                    } else {
                        out.insert(item.key.clone(), Value::Null);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }
}

fn coerce_value(item: &ParamSchemaItem, value: &Value) -> std::result::Result<Value, String> {
    match item.param_type {
        ParamType::Int => coerce_int(value).map(Value::from),
        ParamType::Float => coerce_float(value).map(Value::from),
        ParamType::Bool => coerce_bool(value).map(Value::from),
        ParamType::Str => match value {
            Value::String(_) => Ok(value.clone()),
            other => Ok(Value::String(render_scalar(other))),
        },
        ParamType::Select => {
            let choices = item.choices.as_deref().unwrap_or(&[]);
            let rendered = render_scalar(value);
            let matched = choices
                .iter()
                .any(|c| *c == *value || render_scalar(c) == rendered);
            if matched {
                Ok(value.clone())
            } else {
                let options: Vec<String> = choices.iter().map(render_scalar).collect();
                Err(format!(
                    "'{rendered}' is not one of the declared choices {options:?}"
                ))
            }
        }
        ParamType::ListInt => coerce_list(value, coerce_int).map(|v| Value::Array(v)),
        ParamType::ListFloat => coerce_list(value, coerce_float).map(|v| Value::Array(v)),
        ParamType::ListStr => match value {
            Value::Array(items) => Ok(Value::Array(
                items.iter().map(|v| Value::String(render_scalar(v))).collect(),
            )),
            Value::String(s) => Ok(Value::Array(
                split_csv(s).map(|part| Value::String(part.to_string())).collect(),
            )),
            other => Err(format!("expected a list of strings, got {other}")),
        },
    }
}

fn coerce_int(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) if n.is_i64() => Ok(n.as_i64().unwrap()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an int")),
        other => Err(format!("expected an int, got {other}")),
    }
}

fn coerce_float(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("'{n}' is not a float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a float")),
        other => Err(format!("expected a float, got {other}")),
    }
}

fn coerce_bool(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => Ok(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "t" | "yes" | "y" | "on"
        )),
        other => Err(format!("expected a bool, got {other}")),
    }
}

fn coerce_list<T: Into<Value>>(
    value: &Value,
    elem: fn(&Value) -> std::result::Result<T, String>,
) -> std::result::Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => items.iter().map(|v| elem(v).map(Into::into)).collect(),
        Value::String(s) => split_csv(s)
            .map(|part| elem(&Value::String(part.to_string())).map(Into::into))
            .collect(),
        other => Err(format!("expected a list, got {other}")),
    }
}

fn split_csv(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|part| !part.is_empty())
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result-shape constraint a declared test may assert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    String,
    PathContentMap,
}

/// Expectations of one declared test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectations {
    #[serde(default)]
    pub contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OutputKind>,
}

/// One test case declared inside a plugin as part of `const TESTS`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub mocks: BTreeMap<String, Value>,
    #[serde(default)]
    pub expect: Expectations,
}

impl TestCase {
    /// Display label: the declared name, or a positional fallback.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("test_{}", index + 1))
    }
}

/// Outcome of one harness test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl TestOutcome {
    /// A passing outcome with an output preview.
    pub fn passed(name: String, preview: Option<String>) -> Self {
        Self {
            name,
            ok: true,
            error: None,
            preview,
        }
    }

    /// A failing outcome carrying the failure detail.
    pub fn failed(name: String, error: String, preview: Option<String>) -> Self {
        Self {
            name,
            ok: false,
            error: Some(error),
            preview,
        }
    }
}

/// Limits on project-generator output, per entry.
const MAX_FILE_PATH_LEN: usize = 2_000;
const MAX_FILE_CONTENT_LEN: usize = 2_000_000;

/// What a plugin invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PluginOutput {
    /// Plain text output (kind = module / utility)
    Text(String),
    /// Relative path → file content (kind = project_generator)
    Files(BTreeMap<String, String>),
}

impl PluginOutput {
    /// Classify a raw result value against the declared program kind.
    ///
    /// A project generator that returns anything other than a well-formed
    /// path→content map degrades to text, matching how the menu layer of
    /// the original system refused to scatter files from a suspect result.
    pub fn classify(value: &Value, kind: ProgramKind) -> Self {
        if kind == ProgramKind::ProjectGenerator {
            if let Some(files) = Self::files_from(value) {
                return Self::Files(files);
            }
        }
        Self::Text(render_output(value))
    }

    /// Validate a path→content map: non-empty, string-to-string, relative
    /// paths only, bounded entry sizes.
    pub fn files_from(value: &Value) -> Option<BTreeMap<String, String>> {
        let map = value.as_object()?;
        if map.is_empty() {
            return None;
        }
        let mut files = BTreeMap::new();
        for (path, content) in map {
            let content = content.as_str()?;
            if path.len() > MAX_FILE_PATH_LEN || content.len() > MAX_FILE_CONTENT_LEN {
                return None;
            }
            if path.starts_with('/') || path.split('/').any(|part| part == "..") {
                return None;
            }
            files.insert(path.clone(), content.to_string());
        }
        Some(files)
    }

    /// String form of the output, used for expectation evaluation.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Files(files) => {
                serde_json::to_string_pretty(files).unwrap_or_else(|_| String::new())
            }
        }
    }

    /// Convert back into structured data (for plugin-to-plugin calls).
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Files(files) => serde_json::to_value(files).unwrap_or(Value::Null),
        }
    }
}

fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
