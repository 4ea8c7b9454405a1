//! Tool descriptors, tool requests and the classified model response.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ProtoError, ToolError};

/// Declared JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Whole number (a float with zero fraction is accepted).
    Integer,
    /// Any JSON number.
    Number,
    /// `true` / `false`.
    Boolean,
}

impl ParamType {
    /// Returns the JSON-schema type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Returns `true` when `value` conforms to this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.is_finite() && n.fract() == 0.0)
            }
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParamType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            other => Err(ProtoError::InvalidParamType(other.to_string())),
        }
    }
}

/// Schema entry for a single parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
}

/// Name, description and parameter schema of a tool as exposed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description for tool selection.
    pub description: String,
    /// Parameters in presentation order.
    pub parameters: IndexMap<String, ParamSpec>,
    /// Names of required parameters.
    pub required: Vec<String>,
}

impl ToolDescriptor {
    /// Creates a descriptor without parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: IndexMap::new(),
            required: Vec::new(),
        }
    }

    /// Adds a required parameter.
    pub fn required(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.push_param(name, kind, description);
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    /// Adds an optional parameter.
    pub fn optional(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.push_param(name, kind, description);
        self
    }

    fn push_param(&mut self, name: &str, kind: ParamType, description: &str) {
        self.parameters.insert(
            name.to_string(),
            ParamSpec {
                kind,
                description: description.to_string(),
            },
        );
    }

    /// JSON schema of the `parameters` object.
    pub fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.parameters,
            "required": self.required,
        })
    }

    /// Full tool contract: `{name, description, parameters}`.
    pub fn to_schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }

    /// Checks that every required parameter is present and every supplied
    /// declared parameter has its declared type. Undeclared keys are ignored.
    pub fn validate(&self, args: &ToolArguments) -> Result<(), ToolError> {
        let mut issues = Vec::new();

        for name in &self.required {
            match args.get(name) {
                None | Some(Value::Null) => {
                    issues.push(format!("missing required parameter '{name}'"));
                }
                Some(_) => {}
            }
        }

        for (name, spec) in &self.parameters {
            if let Some(value) = args.get(name)
                && !value.is_null()
                && !spec.kind.accepts(value)
            {
                issues.push(format!(
                    "parameter '{name}' must be {}, got {}",
                    spec.kind,
                    json_type_name(value)
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments {
                tool: self.name.clone(),
                issues,
            })
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Requested tool name (matched exactly).
    pub name: String,
    /// Arguments exactly as the model produced them.
    pub raw_arguments: String,
    /// Links the request to its tool result message.
    pub correlation_id: String,
}

impl ToolRequest {
    /// Creates a tool request.
    pub fn new(
        name: impl Into<String>,
        raw_arguments: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            raw_arguments: raw_arguments.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Structured tool arguments parsed from a [`ToolRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Parses raw argument text. Only JSON objects are accepted; an empty or
    /// whitespace-only payload is treated as `{}`.
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(ToolError::MalformedArguments(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
            Err(e) => Err(ToolError::MalformedArguments(e.to_string())),
        }
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a trimmed, non-empty string value.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns a numeric value. Strings are not coerced.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Model output, classified once by the provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResponse {
    /// The model answered; the turn is complete.
    FinalAnswer { text: String },
    /// The model wants a tool to run before answering.
    ToolCallRequested { text: String, request: ToolRequest },
}
