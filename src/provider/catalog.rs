//! Tool catalog - the typed contract each provider declares at connect time

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type of a tool input/output field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    List,
    Record,
    Any,
}

impl FieldType {
    /// Check a value against this type; `Any` matches everything
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::Text => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Record => value.is_object(),
            FieldType::Any => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::List => "list",
            FieldType::Record => "record",
            FieldType::Any => "any",
        }
    }
}

/// A named, typed field in a tool's input or output schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type", default = "default_field_type")]
    pub ty: FieldType,

    /// Whether the field must be present; defaults to true
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_field_type() -> FieldType {
    FieldType::Any
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// One tool's declared contract: name plus input/output field schemas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub input: Vec<FieldSpec>,

    #[serde(default)]
    pub output: Vec<FieldSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: FieldSpec) -> Self {
        self.input.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldSpec) -> Self {
        self.output.push(field);
        self
    }

    pub fn input_field(&self, name: &str) -> Option<&FieldSpec> {
        self.input.iter().find(|f| f.name == name)
    }

    pub fn output_field(&self, name: &str) -> Option<&FieldSpec> {
        self.output.iter().find(|f| f.name == name)
    }

    /// Check an assembled argument record against the declared input schema.
    ///
    /// Returns field-level violations; an empty list means the arguments
    /// conform. Checked before any remote call is made.
    pub fn check_args(&self, args: &Map<String, Value>) -> Vec<String> {
        let mut violations = Vec::new();

        for field in &self.input {
            match args.get(&field.name) {
                Some(value) => {
                    if !field.ty.matches(value) {
                        violations.push(format!(
                            "input '{}' expects {}, got {}",
                            field.name,
                            field.ty.name(),
                            json_type_name(value)
                        ));
                    }
                }
                None => {
                    if field.required {
                        violations.push(format!("required input '{}' is missing", field.name));
                    }
                }
            }
        }

        for name in args.keys() {
            if self.input_field(name).is_none() {
                violations.push(format!(
                    "input '{}' is not declared by tool '{}'",
                    name, self.name
                ));
            }
        }

        violations
    }
}

/// The set of tools a provider exposed during the connect handshake
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}
