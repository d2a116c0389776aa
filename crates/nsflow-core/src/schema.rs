//! JSON Schema validation with a shared compiled-validator cache.
//!
//! Validators are keyed by the canonical serialization of the schema, so two
//! structurally equal schemas share one compiled validator no matter which
//! `Value` instance the caller passes. The cache lives behind an `Rc` and is
//! shared by every clone of a `SchemaValidator`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{JSONSchema, ValidationError};
use serde::Serialize;
use serde_json::{Map, Value};

use nsflow_types::{ClientError, Result};

/// Category of a single schema violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Required,
    Type,
    Minimum,
    Maximum,
    ExclusiveMinimum,
    ExclusiveMaximum,
    MinLength,
    MaxLength,
    Pattern,
    Enum,
    Format,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Field the violation is about (`value` for the root)
    pub field: String,
    /// JSON pointer into the validated instance
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

/// Outcome of a validation call. Never an error: failures to compile the
/// schema are reported through `error_message` as well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Violation>,
    pub error_message: Option<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            error_message: None,
        }
    }

    fn from_violations(errors: Vec<Violation>) -> Self {
        if errors.is_empty() {
            return Self::ok();
        }
        let message = errors
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            valid: false,
            errors,
            error_message: Some(message),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            valid: false,
            errors: Vec::new(),
            error_message: Some(message),
        }
    }
}

#[derive(Default)]
struct ValidatorCache {
    compiled: HashMap<String, Rc<JSONSchema>>,
    compilations: usize,
}

/// Clone-cheap validator handle over a shared cache
#[derive(Clone, Default)]
pub struct SchemaValidator {
    cache: Rc<RefCell<ValidatorCache>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `data` against `schema`.
    pub fn validate(&self, schema: &Value, data: &Value) -> ValidationReport {
        self.validate_as(schema, data, ROOT_FIELD)
    }

    /// Validate a single form field.
    ///
    /// Fields the schema does not declare are accepted. A required field that
    /// is absent, null or an empty string fails without running the schema.
    pub fn validate_field(&self, schema: &Value, field: &str, value: Option<&Value>) -> ValidationReport {
        let Some(sub_schema) = schema.get("properties").and_then(|p| p.get(field)) else {
            return ValidationReport::ok();
        };

        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().any(|n| n.as_str() == Some(field)))
            .unwrap_or(false);

        let blank = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };

        if blank && required {
            return ValidationReport::from_violations(vec![Violation {
                field: field.to_string(),
                path: format!("/{}", field),
                kind: ViolationKind::Required,
                message: format!("{} is required", field),
            }]);
        }

        match value {
            Some(v) => self.validate_as(sub_schema, v, field),
            None => ValidationReport::ok(),
        }
    }

    /// Compile (or fetch from cache) and report whether the schema is usable.
    pub fn check_schema(&self, schema: &Value) -> Result<()> {
        self.compile(schema).map(|_| ()).map_err(ClientError::Schema)
    }

    /// Empty the compiled-validator cache.
    pub fn clear_validator_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.compiled.clear();
        log::debug!("Validator cache cleared");
    }

    /// Number of validators currently cached
    pub fn cached_count(&self) -> usize {
        self.cache.borrow().compiled.len()
    }

    /// Number of schema compilations performed since construction
    pub fn compiled_count(&self) -> usize {
        self.cache.borrow().compilations
    }

    fn compile(&self, schema: &Value) -> std::result::Result<Rc<JSONSchema>, String> {
        let key = canonical_key(schema);
        if let Some(compiled) = self.cache.borrow().compiled.get(&key) {
            return Ok(compiled.clone());
        }

        let compiled = Rc::new(JSONSchema::compile(schema).map_err(|e| e.to_string())?);
        let mut cache = self.cache.borrow_mut();
        cache.compilations += 1;
        cache.compiled.insert(key, compiled.clone());
        Ok(compiled)
    }

    fn validate_as(&self, schema: &Value, data: &Value, root_label: &str) -> ValidationReport {
        let compiled = match self.compile(schema) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Schema compilation failed: {}", e);
                return ValidationReport::failure(format!("Schema compilation failed: {}", e));
            }
        };

        let violations = match compiled.validate(data) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| describe(&e, root_label)).collect(),
        };
        ValidationReport::from_violations(violations)
    }
}

/// Default values for every declared property of an object schema.
///
/// Explicit `default`s win; otherwise an empty value of the declared type.
/// Properties without a recognized `type` produce no entry.
pub fn get_default_values(schema: &Value) -> Map<String, Value> {
    let mut defaults = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return defaults;
    };

    for (name, prop) in properties {
        if let Some(explicit) = prop.get("default") {
            defaults.insert(name.clone(), explicit.clone());
            continue;
        }
        let empty = match prop.get("type").and_then(Value::as_str) {
            Some("string") => Value::String(String::new()),
            Some("number") | Some("integer") => Value::from(0),
            Some("boolean") => Value::Bool(false),
            Some("array") => Value::Array(Vec::new()),
            Some("object") => Value::Object(Map::new()),
            _ => continue,
        };
        defaults.insert(name.clone(), empty);
    }
    defaults
}

const ROOT_FIELD: &str = "value";

fn describe(error: &ValidationError<'_>, root_label: &str) -> Violation {
    let path = error.instance_path.to_string();
    let field = path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(root_label)
        .to_string();

    let (kind, message) = match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            return Violation {
                message: format!("{} is required", name),
                field: name,
                path,
                kind: ViolationKind::Required,
            };
        }
        ValidationErrorKind::Type { kind } => (
            ViolationKind::Type,
            format!("{} must be of type {}", field, type_names(kind)),
        ),
        ValidationErrorKind::Minimum { limit } => {
            (ViolationKind::Minimum, format!("{} must be >= {}", field, limit))
        }
        ValidationErrorKind::Maximum { limit } => {
            (ViolationKind::Maximum, format!("{} must be <= {}", field, limit))
        }
        ValidationErrorKind::ExclusiveMinimum { limit } => {
            (ViolationKind::ExclusiveMinimum, format!("{} must be > {}", field, limit))
        }
        ValidationErrorKind::ExclusiveMaximum { limit } => {
            (ViolationKind::ExclusiveMaximum, format!("{} must be < {}", field, limit))
        }
        ValidationErrorKind::MinLength { limit } => (
            ViolationKind::MinLength,
            format!("{} must be at least {} characters", field, limit),
        ),
        ValidationErrorKind::MaxLength { limit } => (
            ViolationKind::MaxLength,
            format!("{} must be at most {} characters", field, limit),
        ),
        ValidationErrorKind::Pattern { pattern } => (
            ViolationKind::Pattern,
            format!("{} does not match pattern {}", field, pattern),
        ),
        ValidationErrorKind::Enum { options } => (
            ViolationKind::Enum,
            format!("{} must be one of {}", field, options),
        ),
        ValidationErrorKind::Format { format } => (
            ViolationKind::Format,
            format!("{} must be a valid {}", field, format),
        ),
        _ => (ViolationKind::Other, error.to_string()),
    };

    Violation {
        field,
        path,
        kind,
        message,
    }
}

fn type_names(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(t) => t.to_string(),
        TypeKind::Multiple(types) => (*types)
            .into_iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

/// Serialization with object keys sorted at every level.
fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
