//! # Parameter Coercion
//!
//! Turns the untyped key/value bag a caller hands to a plugin into a
//! [`ParameterValues`] set that the plugin can read without further checks.
//!
//! Rules:
//! * Numeric kinds accept JSON numbers and numeric strings. Integer-valued
//!   parameters (integral `step`) are truncated after the bounds check.
//! * Booleans accept JSON `true`/`false` only.
//! * Select values must match one of the declared options; the option's own
//!   value is what gets stored.
//! * Missing optional parameters take their declared default. A missing
//!   required parameter is an error even if a default is declared.
//! * `null` and blank strings count as missing.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ValidationError, ValidationReason};
use crate::schema::{ParameterKind, ParameterSpec, PluginDescriptor};

/// Untyped parameter input as received from a caller.
pub type RawParams = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl ParameterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Integer(int) => Some(*int as f64),
            ParameterValue::Number(num) => Some(*num),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(int) => Some(*int),
            ParameterValue::Number(num) => Some(num.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

/// Validated parameters of one invocation, keyed by parameter id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterValues {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, value: ParameterValue) -> Self {
        self.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, value: ParameterValue) {
        self.values.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&ParameterValue> {
        self.values.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(ParameterValue::as_str)
    }

    pub fn number(&self, id: &str) -> Option<f64> {
        self.get(id).and_then(ParameterValue::as_f64)
    }

    pub fn integer(&self, id: &str) -> Option<i64> {
        self.get(id).and_then(ParameterValue::as_i64)
    }

    pub fn flag(&self, id: &str) -> Option<bool> {
        self.get(id).and_then(ParameterValue::as_bool)
    }

    /// Non-empty text or a [`ValidationReason::Missing`] error.
    pub fn require_text(&self, id: &str) -> Result<&str, ValidationError> {
        self.text(id)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ValidationError::missing(id))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.values.iter()
    }
}

/// Coerces `raw` against every parameter declared by `descriptor`.
///
/// Keys the descriptor does not declare are ignored.
pub fn coerce(
    descriptor: &PluginDescriptor,
    raw: &RawParams,
) -> Result<ParameterValues, ValidationError> {
    let mut values = ParameterValues::new();

    for spec in &descriptor.parameters {
        let supplied = raw.get(&spec.id).filter(|value| !is_blank(value));

        let value = match supplied {
            Some(raw_value) => coerce_value(spec, raw_value)?,
            None if spec.required => return Err(ValidationError::missing(&spec.id)),
            None => match &spec.default {
                Some(default) => coerce_value(spec, default)?,
                None => continue,
            },
        };

        values.insert(spec.id.clone(), value);
    }

    for key in raw.keys() {
        if descriptor.parameter(key).is_none() {
            debug!(plugin = %descriptor.id, param = %key, "ignoring undeclared parameter");
        }
    }

    Ok(values)
}

/// Coerces a single raw value against its spec.
pub fn coerce_value(spec: &ParameterSpec, raw: &Value) -> Result<ParameterValue, ValidationError> {
    match spec.kind {
        ParameterKind::String => match raw {
            Value::String(text) => Ok(ParameterValue::Text(text.trim().to_string())),
            other => Err(mismatch(spec, "string", other)),
        },
        ParameterKind::Boolean => match raw {
            Value::Bool(flag) => Ok(ParameterValue::Bool(*flag)),
            other => Err(mismatch(spec, "boolean", other)),
        },
        ParameterKind::Number | ParameterKind::Range => {
            let number: f64 = to_real(raw).ok_or_else(|| mismatch(spec, "number", raw))?;
            check_bounds(spec, number)?;

            if spec.is_integer() {
                Ok(ParameterValue::Integer(number.trunc() as i64))
            } else {
                Ok(ParameterValue::Number(number))
            }
        }
        ParameterKind::Select => {
            let wanted: String = choice_text(raw);
            spec.options
                .iter()
                .find(|option| choice_text(&option.value) == wanted)
                .map(|option| from_option(&option.value))
                .ok_or_else(|| {
                    ValidationError::new(
                        &spec.id,
                        ValidationReason::NotAnOption {
                            value: wanted,
                            allowed: spec.options.iter().map(|o| choice_text(&o.value)).collect(),
                        },
                    )
                })
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn to_real(raw: &Value) -> Option<f64> {
    let number = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn check_bounds(spec: &ParameterSpec, number: f64) -> Result<(), ValidationError> {
    let min: f64 = spec.min.unwrap_or(f64::NEG_INFINITY);
    let max: f64 = spec.max.unwrap_or(f64::INFINITY);

    if number < min || number > max {
        return Err(ValidationError::new(
            &spec.id,
            ValidationReason::OutOfRange { value: number, min, max },
        ));
    }
    Ok(())
}

/// Canonical text used to compare select choices (`4`, `4.0` and `"4"` match).
fn choice_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => match number.as_f64() {
            Some(float) => format!("{float}"),
            None => number.to_string(),
        },
        other => other.to_string(),
    }
}

fn from_option(value: &Value) -> ParameterValue {
    match value {
        Value::String(text) => ParameterValue::Text(text.clone()),
        Value::Bool(flag) => ParameterValue::Bool(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) => ParameterValue::Integer(int),
            None => ParameterValue::Number(number.as_f64().unwrap_or_default()),
        },
        other => ParameterValue::Text(other.to_string()),
    }
}

fn mismatch(spec: &ParameterSpec, expected: &'static str, found: &Value) -> ValidationError {
    let found: String = match found {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string \"{s}\""),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    };
    ValidationError::new(&spec.id, ValidationReason::TypeMismatch { expected, found })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ping_descriptor() -> PluginDescriptor {
        serde_json::from_value(json!({
            "id": "ping",
            "name": "Ping",
            "parameters": [
                { "id": "host", "name": "Host", "type": "string", "required": true, "default": "8.8.8.8" },
                { "id": "count", "name": "Count", "type": "number", "default": 4,
                  "min": 1, "max": 100, "step": 1 },
                { "id": "timeout", "name": "Timeout", "type": "number", "default": 1,
                  "min": 0.1, "max": 10, "step": 0.1 },
                { "id": "verbose", "name": "Verbose", "type": "boolean", "default": false },
                { "id": "family", "name": "Family", "type": "select", "default": "any",
                  "options": [
                      { "value": "any", "label": "Any" },
                      { "value": "v4", "label": "IPv4" },
                      { "value": 6, "label": "IPv6" }
                  ] },
                { "id": "note", "name": "Note", "type": "string" }
            ]
        }))
        .unwrap()
    }

    fn raw(value: Value) -> RawParams {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_defaults_for_missing_optionals() {
        let values = coerce(&ping_descriptor(), &raw(json!({ "host": "1.1.1.1" }))).unwrap();

        assert_eq!(values.text("host"), Some("1.1.1.1"));
        assert_eq!(values.get("count"), Some(&ParameterValue::Integer(4)));
        assert_eq!(values.number("timeout"), Some(1.0));
        assert_eq!(values.flag("verbose"), Some(false));
        assert_eq!(values.text("family"), Some("any"));
        assert!(values.get("note").is_none());
    }

    #[test]
    fn required_parameter_must_be_supplied() {
        let err = coerce(&ping_descriptor(), &raw(json!({ "count": 2 }))).unwrap_err();
        assert_eq!(err.param, "host");
        assert_eq!(err.reason, ValidationReason::Missing);

        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "   " }))).unwrap_err();
        assert_eq!(err.reason, ValidationReason::Missing);
    }

    #[test]
    fn numeric_strings_are_coerced_and_truncated() {
        let values = coerce(
            &ping_descriptor(),
            &raw(json!({ "host": "a", "count": "7.9", "timeout": "2.5" })),
        )
        .unwrap();

        assert_eq!(values.get("count"), Some(&ParameterValue::Integer(7)));
        assert_eq!(values.get("timeout"), Some(&ParameterValue::Number(2.5)));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "count": 101 }))).unwrap_err();
        assert_eq!(err.param, "count");
        assert!(matches!(err.reason, ValidationReason::OutOfRange { .. }));

        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "timeout": 0.01 }))).unwrap_err();
        assert_eq!(err.param, "timeout");
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let err = coerce(&ping_descriptor(), &raw(json!({ "host": 5 }))).unwrap_err();
        assert!(matches!(err.reason, ValidationReason::TypeMismatch { expected: "string", .. }));

        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "count": "lots" }))).unwrap_err();
        assert!(matches!(err.reason, ValidationReason::TypeMismatch { expected: "number", .. }));

        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "verbose": "true" }))).unwrap_err();
        assert!(matches!(err.reason, ValidationReason::TypeMismatch { expected: "boolean", .. }));
    }

    #[test]
    fn select_must_match_an_option() {
        let values = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "family": "6" }))).unwrap();
        assert_eq!(values.get("family"), Some(&ParameterValue::Integer(6)));

        let err = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "family": "v5" }))).unwrap_err();
        match err.reason {
            ValidationReason::NotAnOption { value, allowed } => {
                assert_eq!(value, "v5");
                assert_eq!(allowed.len(), 3);
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn coercion_is_deterministic() {
        let input = raw(json!({ "host": "example.com", "count": 3, "verbose": true }));
        let first = coerce(&ping_descriptor(), &input);
        let second = coerce(&ping_descriptor(), &input);
        assert_eq!(first, second);

        let bad = raw(json!({ "count": 3 }));
        assert_eq!(coerce(&ping_descriptor(), &bad), coerce(&ping_descriptor(), &bad));
    }

    #[test]
    fn null_counts_as_missing() {
        let values = coerce(&ping_descriptor(), &raw(json!({ "host": "a", "count": null }))).unwrap();
        assert_eq!(values.integer("count"), Some(4));
    }
}
