//! Record validation.
//!
//! A [`Schema`] is a list of [`FieldSchema`]s checked against the JSON form of
//! a record. The [`SchemaRegistry`] maps an entity-type tag (`"pet"`, `"task"`,
//! ...) to its schema; entity types without a registered schema are not
//! checked at all.
//!
//! Validation never has side effects. Failures come back as
//! [`ValidationErrors`] and the caller decides how to present them.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A single failed check: the dotted path of the field and what is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All failures found while validating one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// True if some failure concerns the field at `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path == path)
    }

    /// Prefix every path, e.g. with the index of a record inside a batch.
    pub fn prefixed(self, prefix: &str) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|e| {
                    let path = if e.path.is_empty() {
                        prefix.to_string()
                    } else {
                        format!("{}.{}", prefix, e.path)
                    };
                    FieldError::new(path, e.message)
                })
                .collect(),
        )
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_errors(&self.0))
    }
}

/// Join field-path and message pairs into one display string.
pub fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The JSON type a field must have.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    /// An object, optionally checked against a nested schema.
    Object(Option<Schema>),
    Any,
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object(_) => "object",
            FieldKind::Any => "value",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object(_) => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

/// Additional constraints on a field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    OneOf(Vec<String>),
    NotBlank,
    Uuid,
    /// Calendar date, `YYYY-MM-DD` only.
    Date,
    DateTime,
    Email,
    MinItems(usize),
}

impl Rule {
    fn check(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (Rule::MinLength(n), Value::String(s)) if s.chars().count() < *n => {
                Some(format!("must be at least {} characters", n))
            }
            (Rule::MaxLength(n), Value::String(s)) if s.chars().count() > *n => {
                Some(format!("must be at most {} characters", n))
            }
            (Rule::NotBlank, Value::String(s)) if s.trim().is_empty() => {
                Some("must not be blank".to_string())
            }
            (Rule::OneOf(allowed), Value::String(s)) if !allowed.iter().any(|a| a == s) => {
                Some(format!("must be one of: {}", allowed.join(", ")))
            }
            (Rule::Uuid, Value::String(s)) if uuid::Uuid::parse_str(s).is_err() => {
                Some("must be a valid UUID".to_string())
            }
            (Rule::Date, Value::String(s)) if !is_date(s) => {
                Some("must be a valid date (YYYY-MM-DD)".to_string())
            }
            (Rule::DateTime, Value::String(s)) if DateTime::parse_from_rfc3339(s).is_err() => {
                Some("must be a valid RFC 3339 timestamp".to_string())
            }
            (Rule::Email, Value::String(s)) if !is_email(s) => {
                Some("must be a valid email address".to_string())
            }
            (Rule::Min(min), Value::Number(n)) if n.as_f64().is_some_and(|v| v < *min) => {
                Some(format!("must be at least {}", min))
            }
            (Rule::Max(max), Value::Number(n)) if n.as_f64().is_some_and(|v| v > *max) => {
                Some(format!("must be at most {}", max))
            }
            (Rule::MinItems(n), Value::Array(items)) if items.len() < *n => {
                Some(format!("must contain at least {} items", n))
            }
            _ => None,
        }
    }
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Validation rules for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    name: String,
    kind: FieldKind,
    required: bool,
    rules: Vec<Rule>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            rules: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn object(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldKind::Object(Some(schema)))
    }

    /// Absent and `null` values fail instead of being skipped.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn min_length(self, n: usize) -> Self {
        self.rule(Rule::MinLength(n))
    }

    pub fn max_length(self, n: usize) -> Self {
        self.rule(Rule::MaxLength(n))
    }

    pub fn min(self, v: f64) -> Self {
        self.rule(Rule::Min(v))
    }

    pub fn max(self, v: f64) -> Self {
        self.rule(Rule::Max(v))
    }

    pub fn one_of(self, allowed: &[&str]) -> Self {
        self.rule(Rule::OneOf(allowed.iter().map(|s| s.to_string()).collect()))
    }

    pub fn not_blank(self) -> Self {
        self.rule(Rule::NotBlank)
    }

    pub fn uuid(self) -> Self {
        self.rule(Rule::Uuid)
    }

    pub fn date(self) -> Self {
        self.rule(Rule::Date)
    }

    pub fn date_time(self) -> Self {
        self.rule(Rule::DateTime)
    }

    pub fn email(self) -> Self {
        self.rule(Rule::Email)
    }

    pub fn min_items(self, n: usize) -> Self {
        self.rule(Rule::MinItems(n))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Validation rules for one record shape.
///
/// Fields not listed in the schema are allowed and not checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

/// Validate `data` against `schema`, collecting every failure.
pub fn validate(data: &Value, schema: &Schema) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    match data.as_object() {
        Some(map) => validate_object(map, schema, "", &mut errors),
        None => errors.push(FieldError::new("", "record must be a JSON object")),
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_object(
    map: &Map<String, Value>,
    schema: &Schema,
    prefix: &str,
    errors: &mut ValidationErrors,
) {
    for field in &schema.fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        let value = match map.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(FieldError::new(path, "is required"));
                }
                continue;
            }
            Some(value) => value,
        };

        if !field.kind.accepts(value) {
            errors.push(FieldError::new(
                path,
                format!("must be a {}", field.kind.name()),
            ));
            continue;
        }

        for rule in &field.rules {
            if let Some(message) = rule.check(value) {
                errors.push(FieldError::new(path.clone(), message));
            }
        }

        if let (FieldKind::Object(Some(nested)), Value::Object(inner)) = (&field.kind, value) {
            validate_object(inner, nested, &path, errors);
        }
    }
}

/// Maps entity-type tags to their schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    /// An empty registry: nothing is validated.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the schema of every built-in entity type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (entity_type, schema) in crate::entities::default_schemas() {
            registry.register(entity_type, schema);
        }
        registry
    }

    /// Register (or replace) the schema for an entity type.
    pub fn register(&mut self, entity_type: impl Into<String>, schema: Schema) -> &mut Self {
        self.schemas.insert(entity_type.into(), schema);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&Schema> {
        self.schemas.get(entity_type)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas.contains_key(entity_type)
    }

    /// Validate a record of the given type. Passes if no schema is registered.
    pub fn validate(&self, entity_type: &str, data: &Value) -> Result<(), ValidationErrors> {
        match self.get(entity_type) {
            Some(schema) => validate(data, schema),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pet_like() -> Schema {
        Schema::new()
            .field(FieldSchema::string("id").required().uuid())
            .field(FieldSchema::string("name").required().not_blank().max_length(10))
            .field(FieldSchema::string("species").one_of(&["dog", "cat"]))
            .field(FieldSchema::number("weight").min(0.0).max(200.0))
            .field(FieldSchema::string("birthDate").date())
            .field(FieldSchema::object(
                "dosage",
                Schema::new().field(FieldSchema::number("amount").required().min(0.0)),
            ))
    }

    #[test]
    fn test_valid_record() {
        let data = json!({
            "id": "0b5f5c4e-2f63-4a53-9a51-6f0c2a3b7d11",
            "name": "Rex",
            "species": "dog",
            "weight": 12.5,
            "birthDate": "2020-04-01",
            "dosage": {"amount": 5}
        });
        assert!(validate(&data, &pet_like()).is_ok());
    }

    #[test]
    fn test_missing_required_and_null() {
        let data = json!({"id": null});
        let errors = validate(&data, &pet_like()).unwrap_err();
        assert!(errors.has_path("id"));
        assert!(errors.has_path("name"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let data = json!({"id": "0b5f5c4e-2f63-4a53-9a51-6f0c2a3b7d11", "name": "Rex"});
        assert!(validate(&data, &pet_like()).is_ok());
    }

    #[test]
    fn test_type_mismatch_skips_rules() {
        let data = json!({
            "id": "0b5f5c4e-2f63-4a53-9a51-6f0c2a3b7d11",
            "name": 42
        });
        let errors = validate(&data, &pet_like()).unwrap_err();
        let all: Vec<_> = errors.iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "must be a string");
    }

    #[test]
    fn test_rule_failures() {
        let data = json!({
            "id": "not-a-uuid",
            "name": "   ",
            "species": "lizard",
            "weight": -1,
            "birthDate": "01/04/2020"
        });
        let errors = validate(&data, &pet_like()).unwrap_err();
        assert!(errors.has_path("id"));
        assert!(errors.has_path("name"));
        assert!(errors.has_path("species"));
        assert!(errors.has_path("weight"));
        assert!(errors.has_path("birthDate"));
    }

    #[test]
    fn test_date_rejects_timestamp() {
        let data = json!({
            "id": "0b5f5c4e-2f63-4a53-9a51-6f0c2a3b7d11",
            "name": "Rex",
            "birthDate": "2020-04-01T10:00:00Z"
        });
        let errors = validate(&data, &pet_like()).unwrap_err();
        assert!(errors.has_path("birthDate"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_nested_object_paths() {
        let data = json!({
            "id": "0b5f5c4e-2f63-4a53-9a51-6f0c2a3b7d11",
            "name": "Rex",
            "dosage": {"amount": -3}
        });
        let errors = validate(&data, &pet_like()).unwrap_err();
        assert!(errors.has_path("dosage.amount"));
    }

    #[test]
    fn test_non_object_record() {
        let errors = validate(&json!([1, 2]), &pet_like()).unwrap_err();
        assert_eq!(errors.to_string(), "record must be a JSON object");
    }

    #[test]
    fn test_format_errors() {
        let text = format_errors(&[
            FieldError::new("name", "is required"),
            FieldError::new("", "record must be a JSON object"),
        ]);
        assert_eq!(text, "name: is required; record must be a JSON object");
    }

    #[test]
    fn test_prefixed() {
        let errors = ValidationErrors::from(vec![FieldError::new("name", "is required")]);
        let prefixed = errors.prefixed("[1]");
        assert!(prefixed.has_path("[1].name"));
    }

    #[test]
    fn test_email_rule() {
        let schema = Schema::new().field(FieldSchema::string("email").email());
        assert!(validate(&json!({"email": "sam@example.com"}), &schema).is_ok());
        assert!(validate(&json!({"email": "sam@"}), &schema).is_err());
        assert!(validate(&json!({"email": "example.com"}), &schema).is_err());
    }

    #[test]
    fn test_registry_skips_unregistered_types() {
        let mut registry = SchemaRegistry::new();
        registry.register("pet", pet_like());

        assert!(registry.contains("pet"));
        assert!(registry.validate("note", &json!({"anything": true})).is_ok());
        assert!(registry.validate("pet", &json!({})).is_err());
    }

    #[test]
    fn test_default_registry_covers_entities() {
        let registry = SchemaRegistry::with_defaults();
        for tag in ["pet", "task", "health_record", "medication", "user", "meal", "food_item"] {
            assert!(registry.contains(tag), "missing schema for {}", tag);
        }
    }
}
