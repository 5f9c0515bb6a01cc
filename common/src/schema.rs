//! # Plugin Schema
//!
//! Declarative description of a plugin and the parameters it accepts.
//!
//! Descriptors are deserialized from metadata records (one JSON object per
//! plugin) and are never mutated after loading. The field names match the
//! metadata format exactly: `id`, `name`, `description`, `icon` and
//! `parameters[]`, where each parameter carries `type`, `required`,
//! `default`, `min`/`max`/`step` or `options[]`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DescriptorError;
use crate::value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Select,
    Range,
}

impl ParameterKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ParameterKind::Number | ParameterKind::Range)
    }
}

/// One allowed choice of a `select` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl ParameterSpec {
    /// Numeric parameters with an integral `step` hold integers.
    pub fn is_integer(&self) -> bool {
        self.kind.is_numeric() && self.step.is_some_and(|step| step.fract() == 0.0)
    }

    fn check_definition(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("parameter with an empty id".to_string());
        }

        match self.kind {
            ParameterKind::Select if self.options.is_empty() => {
                return Err(format!("select parameter '{}' has no options", self.id));
            }
            ParameterKind::Range if self.min.is_none() || self.max.is_none() => {
                return Err(format!("range parameter '{}' needs min and max", self.id));
            }
            _ => {}
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!("parameter '{}' has min {min} above max {max}", self.id));
            }
        }

        if let Some(step) = self.step {
            if step <= 0.0 || !step.is_finite() {
                return Err(format!("parameter '{}' has a non-positive step", self.id));
            }
        }

        if let Some(default) = &self.default {
            value::coerce_value(self, default)
                .map_err(|e| format!("default does not satisfy its own constraints: {e}"))?;
        }

        Ok(())
    }
}

/// Static description of a plugin. One instance per plugin, loaded at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl PluginDescriptor {
    pub fn parameter(&self, id: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.id == id)
    }

    /// Checks that ids are unique and that every parameter is self-consistent.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.id.trim().is_empty() {
            return Err(DescriptorError::new(&self.id, "empty plugin id"));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for spec in &self.parameters {
            if !seen.insert(spec.id.as_str()) {
                return Err(DescriptorError::new(
                    &self.id,
                    format!("duplicate parameter id '{}'", spec.id),
                ));
            }
            spec.check_definition()
                .map_err(|reason| DescriptorError::new(&self.id, reason))?;
        }

        Ok(())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
