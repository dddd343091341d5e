//! Validated extraction schema and typed extraction records.
//!
//! The extraction service proposes field definitions at runtime. They are
//! validated into an [`ExtractionSchema`], which renders the JSON schema sent
//! with each extraction request and type-checks the records that come back.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ExtractionError, SchemaError};

/// Field holding the search result title; a schema without it is rejected.
pub(super) const TITLE_FIELD: &str = "title";

/// Declared type of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    List,
}

impl FieldType {
    /// Every variant, in the order offered to the schema generator.
    pub const ALL: [Self; 5] = [Self::Str, Self::Int, Self::Float, Self::Bool, Self::List];

    /// Label used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
        }
    }

    /// Nullable JSON schema fragment for one field of this type.
    fn json_schema(self) -> Value {
        match self {
            Self::Str => json!({ "type": ["string", "null"] }),
            Self::Int => json!({ "type": ["integer", "null"] }),
            Self::Float => json!({ "type": ["number", "null"] }),
            Self::Bool => json!({ "type": ["boolean", "null"] }),
            Self::List => json!({ "type": ["array", "null"], "items": { "type": "string" } }),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (name, type) pair proposed by the schema generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A typed value of one extracted field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    Null,
}

impl FieldValue {
    /// Renders the value as stored text.
    ///
    /// Lists are joined with `", "`, numbers are formatted, and blank strings,
    /// empty lists and nulls become `None`.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let rendered = match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::List(items) => items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Null => String::new(),
        };
        (!rendered.is_empty()).then_some(rendered)
    }
}

/// One record returned by the extraction service, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    values: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    /// Builds a record from already typed values.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = (String, FieldValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Returns a field's value; absent fields read as `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Returns a field rendered as text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(FieldValue::render)
    }

    /// Iterates over field names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// A validated set of field definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSchema {
    fields: Vec<FieldDefinition>,
}

impl ExtractionSchema {
    /// Validates generated field definitions.
    ///
    /// Names are trimmed and inner spaces replaced by underscores. The result
    /// must be an ASCII identifier, unique within the schema. One of the
    /// normalized names must be `title`, since records are stored by title.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for an empty list, a blank or invalid name, a
    /// duplicate, or a missing `title` field.
    pub fn new(definitions: Vec<FieldDefinition>) -> Result<Self, SchemaError> {
        if definitions.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::with_capacity(definitions.len());
        let mut fields = Vec::with_capacity(definitions.len());

        for (index, definition) in definitions.into_iter().enumerate() {
            let name = normalize_field_name(&definition.name);
            if name.is_empty() {
                return Err(SchemaError::EmptyName { index });
            }
            if !is_identifier(&name) {
                return Err(SchemaError::InvalidName { name });
            }
            if !seen.insert(name.clone()) {
                return Err(SchemaError::Duplicate { name });
            }
            fields.push(FieldDefinition::new(name, definition.field_type));
        }

        if !seen.contains(TITLE_FIELD) {
            return Err(SchemaError::MissingField { name: TITLE_FIELD });
        }

        Ok(Self { fields })
    }

    /// The validated fields, in generation order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// JSON schema of the extraction answer: an object holding an `items`
    /// array of records, every field required and nullable.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.field_type.json_schema()))
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|field| field.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                        "additionalProperties": false
                    }
                }
            },
            "required": ["items"],
            "additionalProperties": false
        })
    }

    /// Type-checks an extraction answer into records.
    ///
    /// Accepts the `{"items": [...]}` envelope or a bare array. Missing fields
    /// read as null; unknown fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::InvalidOutput`] when the answer is not a
    /// list of objects or a value does not match its declared type.
    pub fn parse_records(&self, answer: &Value) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let items = match answer {
            Value::Object(object) => object
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| ExtractionError::invalid_output("answer has no `items` array"))?,
            Value::Array(items) => items,
            _ => return Err(ExtractionError::invalid_output("answer is not an object")),
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.parse_record(index, item))
            .collect()
    }

    fn parse_record(&self, index: usize, item: &Value) -> Result<ExtractedRecord, ExtractionError> {
        let object = item.as_object().ok_or_else(|| {
            ExtractionError::invalid_output(format!("item #{index} is not an object"))
        })?;

        let mut values = BTreeMap::new();
        for field in &self.fields {
            let raw = object.get(&field.name).unwrap_or(&Value::Null);
            let value = coerce(field.field_type, raw).ok_or_else(|| {
                ExtractionError::invalid_output(format!(
                    "item #{index} field '{}' is not a {}",
                    field.name, field.field_type
                ))
            })?;
            values.insert(field.name.clone(), value);
        }

        Ok(ExtractedRecord { values })
    }
}

/// Trims a generated name and replaces spaces with underscores.
fn normalize_field_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[allow(clippy::cast_possible_truncation)]
fn coerce(field_type: FieldType, raw: &Value) -> Option<FieldValue> {
    if raw.is_null() {
        return Some(FieldValue::Null);
    }
    match field_type {
        FieldType::Str => raw.as_str().map(|text| FieldValue::Text(text.to_string())),
        FieldType::Int => raw.as_i64().map(FieldValue::Integer).or_else(|| {
            raw.as_f64()
                .filter(|value| value.fract() == 0.0 && value.is_finite())
                .map(|value| FieldValue::Integer(value as i64))
        }),
        FieldType::Float => raw.as_f64().map(FieldValue::Float),
        FieldType::Bool => raw.as_bool().map(FieldValue::Bool),
        FieldType::List => match raw {
            Value::String(single) => Some(FieldValue::List(vec![single.clone()])),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::List),
            _ => None,
        },
    }
}
