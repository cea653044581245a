//! Route metadata supplied by the catalogue, and the field values the user
//! enters for a test request.
//!
//! # Design
//! `RouteMeta` deserializes straight from the catalogue JSON served by the
//! service under test. `FieldType` keeps unknown type names as `Other` so a
//! newer catalogue never fails to load; unknown types pass through as
//! strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConsoleError;
use crate::http::{FilePart, HttpMethod};

/// Declared type of a route argument or of a user-added field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    File,
    Other(String),
}

impl FieldType {
    /// Field types offered for variable arguments of a route.
    pub fn choices_for(method: HttpMethod) -> Vec<FieldType> {
        if !method.accepts_form() {
            return vec![FieldType::Str];
        }
        vec![
            FieldType::Str,
            FieldType::Int,
            FieldType::Float,
            FieldType::Bool,
            FieldType::List,
            FieldType::File,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Str => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::List => "list",
            FieldType::Dict => "dict",
            FieldType::File => "HttpFile",
            FieldType::Other(name) => name,
        }
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        match name {
            "str" | "string" => FieldType::Str,
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "bool" => FieldType::Bool,
            "list" | "tuple" => FieldType::List,
            "dict" => FieldType::Dict,
            "HttpFile" | "file" => FieldType::File,
            other => FieldType::Other(other.to_string()),
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        FieldType::from(name.as_str())
    }
}

impl From<FieldType> for String {
    fn from(kind: FieldType) -> Self {
        kind.as_str().to_string()
    }
}

/// One declared argument of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(default)]
    pub alias: Vec<String>,
    #[serde(rename = "type", default = "default_field_type")]
    pub kind: FieldType,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub is_variable: bool,
    #[serde(default)]
    pub is_file: bool,
}

fn default_field_type() -> FieldType {
    FieldType::Str
}

impl ArgumentSpec {
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias.iter().any(|alias| alias == name)
    }

    /// Effective type, with `is_file` taking precedence over the annotation.
    pub fn field_type(&self) -> FieldType {
        if self.is_file {
            FieldType::File
        } else {
            self.kind.clone()
        }
    }
}

/// A route as described by the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMeta {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    /// Headers the catalogue asks to send with every test of this route.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl RouteMeta {
    pub fn has_variable_arguments(&self) -> bool {
        self.arguments.iter().any(|arg| arg.is_variable)
    }

    /// Initial content for the JSON argument editor: every fixed argument
    /// mapped to its default, or `null` when it has none.
    pub fn default_json_args(&self) -> String {
        let object: serde_json::Map<String, Value> = self
            .arguments
            .iter()
            .filter(|arg| !arg.is_variable)
            .map(|arg| (arg.name.clone(), arg.default.clone()))
            .collect();
        serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_else(|_| "{}".to_string())
    }
}

/// What the user put into a field editor.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    Text(String),
    File(FilePart),
    /// A file editor with nothing selected.
    Empty,
}

/// A user-entered value with the type of the editor it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: FieldInput,
    pub kind: Option<FieldType>,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: FieldInput::Text(value.into()),
            kind: None,
        }
    }

    pub fn typed(value: impl Into<String>, kind: FieldType) -> Self {
        Self {
            value: FieldInput::Text(value.into()),
            kind: Some(kind),
        }
    }

    pub fn file(part: FilePart) -> Self {
        Self {
            value: FieldInput::File(part),
            kind: Some(FieldType::File),
        }
    }
}

/// Field values in editor order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an earlier value of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read arguments from the JSON editor.
    ///
    /// The text must hold a JSON object. Nested arrays and objects are sent
    /// as their JSON text; scalars as their plain string form.
    pub fn from_json_args(text: &str) -> Result<Self, ConsoleError> {
        if text.trim().is_empty() {
            return Err(ConsoleError::InvalidJsonArgs("no arguments given".to_string()));
        }
        let value: Value =
            serde_json::from_str(text).map_err(|e| ConsoleError::InvalidJsonArgs(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(ConsoleError::InvalidJsonArgs(
                "arguments must be a JSON object".to_string(),
            ));
        };

        let mut fields = FieldMap::new();
        for (name, value) in object {
            let text = match value {
                Value::String(s) => s,
                Value::Array(_) | Value::Object(_) => value.to_string(),
                other => other.to_string(),
            };
            fields.insert(name, FieldValue::text(text));
        }
        Ok(fields)
    }
}

impl<N: Into<String>> FromIterator<(N, FieldValue)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (N, FieldValue)>>(iter: I) -> Self {
        let mut fields = FieldMap::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue_route() -> RouteMeta {
        serde_json::from_str(
            r#"{
                "module": "users",
                "name": "create",
                "method": "post",
                "path": "/users",
                "arguments": [
                    {"name": "name", "type": "str", "has_default": false, "default": null},
                    {"name": "age", "alias": ["years"], "type": "int", "has_default": true, "default": 18},
                    {"name": "avatar", "type": "HttpFile", "is_file": true},
                    {"name": "extra", "type": "dict", "is_variable": true}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn route_deserializes_from_catalogue_json() {
        let route = catalogue_route();
        assert_eq!(route.method, HttpMethod::Post);
        assert_eq!(route.arguments.len(), 4);
        assert_eq!(route.arguments[1].kind, FieldType::Int);
        assert!(route.arguments[1].answers_to("years"));
        assert_eq!(route.arguments[2].field_type(), FieldType::File);
        assert!(route.has_variable_arguments());
        assert!(route.headers.is_empty());
    }

    #[test]
    fn unknown_field_type_is_kept_by_name() {
        let kind = FieldType::from("Decimal");
        assert_eq!(kind, FieldType::Other("Decimal".to_string()));
        assert_eq!(String::from(kind), "Decimal");
    }

    #[test]
    fn default_json_args_skip_variable_arguments() {
        let json: Value = serde_json::from_str(&catalogue_route().default_json_args()).unwrap();
        assert_eq!(json["name"], Value::Null);
        assert_eq!(json["age"], 18);
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn choices_depend_on_method() {
        assert_eq!(FieldType::choices_for(HttpMethod::Get), vec![FieldType::Str]);
        assert_eq!(FieldType::choices_for(HttpMethod::Delete), vec![FieldType::Str]);
        assert_eq!(FieldType::choices_for(HttpMethod::Patch), vec![FieldType::Str]);
        let post = FieldType::choices_for(HttpMethod::Post);
        assert!(post.contains(&FieldType::File));
        assert_eq!(post.len(), 6);
    }

    #[test]
    fn field_map_insert_replaces_in_place() {
        let fields = FieldMap::new()
            .with("a", FieldValue::text("1"))
            .with("b", FieldValue::text("2"))
            .with("a", FieldValue::text("3"));
        let names: Vec<&str> = fields.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(fields.get("a"), Some(&FieldValue::text("3")));
    }

    #[test]
    fn json_args_stringify_nested_values() {
        let fields = FieldMap::from_json_args(r#"{"ids": [1, 2], "q": "x", "n": 3, "on": true, "meta": {"k": 1}}"#)
            .unwrap();
        assert_eq!(fields.get("ids"), Some(&FieldValue::text("[1,2]")));
        assert_eq!(fields.get("q"), Some(&FieldValue::text("x")));
        assert_eq!(fields.get("n"), Some(&FieldValue::text("3")));
        assert_eq!(fields.get("on"), Some(&FieldValue::text("true")));
        assert_eq!(fields.get("meta"), Some(&FieldValue::text(r#"{"k":1}"#)));
    }

    #[test]
    fn json_args_reject_arrays_and_garbage() {
        assert!(matches!(
            FieldMap::from_json_args("[1, 2]"),
            Err(ConsoleError::InvalidJsonArgs(_))
        ));
        assert!(matches!(
            FieldMap::from_json_args("{oops"),
            Err(ConsoleError::InvalidJsonArgs(_))
        ));
        assert!(matches!(
            FieldMap::from_json_args("   "),
            Err(ConsoleError::InvalidJsonArgs(_))
        ));
    }
}
