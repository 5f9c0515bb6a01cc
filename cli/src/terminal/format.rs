use colored::*;
use netprobe_common::{ParameterKind, ParameterSpec, Payload};
use serde_json::Value;

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

pub fn kind(spec: &ParameterSpec) -> String {
    let name: &str = match spec.kind {
        ParameterKind::String => "string",
        ParameterKind::Number if spec.is_integer() => "integer",
        ParameterKind::Number => "number",
        ParameterKind::Boolean => "boolean",
        ParameterKind::Select => "select",
        ParameterKind::Range => "range",
    };
    name.to_string()
}

pub fn bounds(spec: &ParameterSpec) -> Option<String> {
    let text = match (spec.min, spec.max) {
        (Some(min), Some(max)) => format!("{min} to {max}"),
        (Some(min), None) => format!(">= {min}"),
        (None, Some(max)) => format!("<= {max}"),
        (None, None) => return None,
    };
    Some(match spec.step {
        Some(step) => format!("{text}, step {step}"),
        None => text,
    })
}

/// A value as text, without the quotes JSON puts around strings.
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn scalar(value: &Value) -> ColoredString {
    match value {
        Value::Number(_) => plain(value).color(colors::NUMBER),
        Value::Bool(_) => plain(value).color(colors::BOOLEAN),
        Value::Null => "none".dimmed(),
        _ => plain(value).color(colors::TEXT_DEFAULT),
    }
}

/// Splits a result into one-line fields and the arrays/objects shown below them.
pub fn split_payload(payload: &Payload) -> (Vec<Detail>, Vec<(String, &Value)>) {
    let mut scalars: Vec<Detail> = Vec::new();
    let mut nested: Vec<(String, &Value)> = Vec::new();

    for (key, value) in payload {
        match value {
            Value::Array(items) if items.is_empty() => scalars.push((key.clone(), "none".dimmed())),
            Value::Array(_) | Value::Object(_) => nested.push((key.clone(), value)),
            _ => scalars.push((key.clone(), scalar(value))),
        }
    }
    (scalars, nested)
}

fn inline(value: &Value) -> String {
    match value {
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", inline(value)))
            .collect::<Vec<String>>()
            .join(", "),
        Value::Array(items) => items.iter().map(inline).collect::<Vec<String>>().join(", "),
        other => plain(other),
    }
}

/// Tree lines for an array or object, one entry per line.
pub fn nested_lines(value: &Value) -> Vec<String> {
    let entries: Vec<String> = match value {
        Value::Array(items) => items.iter().map(inline).collect(),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| format!("{}: {}", key.color(colors::PRIMARY), inline(value)))
            .collect(),
        other => vec![plain(other)],
    };

    let count: usize = entries.len();
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let branch: ColoredString = if i + 1 == count { "└─".bright_black() } else { "├─".bright_black() };
            format!(" {branch} {entry}")
        })
        .collect()
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

    #[test]
    fn payload_is_split_by_shape() {
        colored::control::set_override(false);
        let payload = match json!({
            "host": "example.com",
            "hops": [{ "hop": 1, "host": "10.0.0.1" }],
            "warnings": [],
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let (scalars, nested) = split_payload(&payload);
        let keys: Vec<&str> = scalars.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["host", "warnings"]);
        assert_eq!(nested[0].0, "hops");
        assert_eq!(nested_lines(nested[0].1), vec![" └─ hop: 1, host: 10.0.0.1"]);
    }

    #[test]
    fn bounds_include_step() {
        let spec: ParameterSpec = serde_json::from_value(json!({
            "id": "count", "name": "Count", "type": "number", "min": 1, "max": 100, "step": 1
        }))
        .unwrap();
        assert_eq!(kind(&spec), "integer");
        assert_eq!(bounds(&spec).as_deref(), Some("1 to 100, step 1"));
    }
}
