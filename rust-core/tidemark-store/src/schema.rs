// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Declarative schemas and the recursive validator.
//!
//! A [`Schema`] node names a type and optional constraints; objects and
//! arrays nest child schemas. [`validate`] walks a JSON value against the
//! schema, coercing scalars where it can, and returns every error it finds
//! together with the coerced ("sanitized") value. Validation never stops at
//! the first error.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The type tag of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Date,
}

/// A string-pattern constraint, compiled once when the schema is built or
/// deserialized.
///
/// An invalid expression is kept and reported as a validation error on
/// every value checked against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, regex::Error>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source);
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One node of a declarative schema tree.
///
/// Schemas deserialize from the same JSON shape they serialize to:
///
/// ```rust
/// use tidemark_store::schema::{Schema, SchemaType};
///
/// let schema: Schema = serde_json::from_str(r#"{
///     "type": "object",
///     "properties": {
///         "id":   { "type": "number", "required": true },
///         "name": { "type": "string", "min": 1, "max": 40 }
///     }
/// }"#).unwrap();
/// assert_eq!(schema.schema_type, SchemaType::Object);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Lower bound: numeric value for numbers, character count for strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound: numeric value for numbers, character count for strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular expression the (coerced) string must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Declared properties of an object schema.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    /// Element schema of an array schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

impl Schema {
    /// A bare node of the given type with no constraints.
    pub fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            required: false,
            nullable: false,
            min: None,
            max: None,
            pattern: None,
            properties: BTreeMap::new(),
            items: None,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(SchemaType::Date)
    }

    pub fn object() -> Self {
        Self::new(SchemaType::Object)
    }

    /// An array schema whose elements follow `items`.
    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(Pattern::new(pattern));
        self
    }

    /// Declare an object property.
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Validate `value` against this schema. See [`validate`].
    pub fn validate(&self, value: &Value) -> ValidationResult {
        validate(value, self)
    }
}

/// Outcome of validating one value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Every message, namespaced by path (`user.name`, `tags[2]`).
    pub errors: Vec<String>,
    /// The coerced value. Meaningful only when `is_valid`.
    pub sanitized_value: Value,
}

/// Validate `value` against `schema`.
pub fn validate(value: &Value, schema: &Schema) -> ValidationResult {
    let mut errors = Vec::new();
    let sanitized = walk(Some(value), schema, "value", &mut errors).unwrap_or(Value::Null);
    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        sanitized_value: sanitized,
    }
}

/// Returns the sanitized value, or `None` when the input was absent and
/// should stay absent.
fn walk(value: Option<&Value>, schema: &Schema, path: &str, errors: &mut Vec<String>) -> Option<Value> {
    let present = match value {
        None => {
            if schema.required {
                errors.push(format!("{path} is required"));
            }
            return None;
        }
        Some(Value::Null) => {
            if schema.required && !schema.nullable {
                errors.push(format!("{path} is required"));
            }
            return Some(Value::Null);
        }
        Some(v) => v,
    };

    let sanitized = match schema.schema_type {
        SchemaType::String => check_string(present, schema, path, errors),
        SchemaType::Number => check_number(present, schema, path, errors),
        SchemaType::Boolean => Value::Bool(truthy(present)),
        SchemaType::Date => check_date(present, path, errors),
        SchemaType::Object => check_object(present, schema, path, errors),
        SchemaType::Array => check_array(present, schema, path, errors),
    };
    Some(sanitized)
}

fn check_string(value: &Value, schema: &Schema, path: &str, errors: &mut Vec<String>) -> Value {
    let coerced = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };

    let length = coerced.chars().count() as f64;
    if let Some(min) = schema.min {
        if length < min {
            errors.push(format!("{path} must be at least {min} characters"));
        }
    }
    if let Some(max) = schema.max {
        if length > max {
            errors.push(format!("{path} must be at most {max} characters"));
        }
    }
    if let Some(pattern) = &schema.pattern {
        match &pattern.compiled {
            Ok(re) if re.is_match(&coerced) => {}
            Ok(_) => errors.push(format!("{path} does not match pattern {pattern}")),
            Err(e) => errors.push(format!("{path} has an invalid pattern {pattern}: {e}")),
        }
    }

    Value::String(coerced)
}

fn check_number(value: &Value, schema: &Schema, path: &str, errors: &mut Vec<String>) -> Value {
    let Some(number) = to_number(value) else {
        errors.push(format!("{path} must be a number"));
        return value.clone();
    };

    if let Some(min) = schema.min {
        if number < min {
            errors.push(format!("{path} must be >= {min}"));
        }
    }
    if let Some(max) = schema.max {
        if number > max {
            errors.push(format!("{path} must be <= {max}"));
        }
    }

    number_value(number)
}

/// Numeric conversion; `None` stands for not-a-number.
fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().ok()?
            }
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Integral values become JSON integers so `"123"` round-trips as `123`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn check_date(value: &Value, path: &str, errors: &mut Vec<String>) -> Value {
    let parsed = match value {
        Value::String(s) => parse_date(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    };

    // Outside four-digit years the rendered text would not parse back.
    match parsed.filter(|date| (0..=9999).contains(&date.year())) {
        Some(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => {
            errors.push(format!("{path} must be a valid date"));
            value.clone()
        }
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn check_object(value: &Value, schema: &Schema, path: &str, errors: &mut Vec<String>) -> Value {
    let Value::Object(input) = value else {
        errors.push(format!("{path} must be an object"));
        return value.clone();
    };

    let mut sanitized = Map::new();
    for (name, child) in &schema.properties {
        let child_path = if path == "value" {
            name.clone()
        } else {
            format!("{path}.{name}")
        };
        if let Some(v) = walk(input.get(name), child, &child_path, errors) {
            sanitized.insert(name.clone(), v);
        }
    }
    Value::Object(sanitized)
}

fn check_array(value: &Value, schema: &Schema, path: &str, errors: &mut Vec<String>) -> Value {
    let Value::Array(input) = value else {
        errors.push(format!("{path} must be an array"));
        return value.clone();
    };

    let Some(items) = &schema.items else {
        return value.clone();
    };

    let sanitized = input
        .iter()
        .enumerate()
        .map(|(i, element)| {
            walk(Some(element), items, &format!("{path}[{i}]"), errors).unwrap_or(Value::Null)
        })
        .collect();
    Value::Array(sanitized)
}
