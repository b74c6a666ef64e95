//! Minimal CloudFormation template model.
//!
//! Templates are assembled section by section and serialized with serde. Keys
//! are kept in `BTreeMap`s so rendered templates are stable between runs.

pub mod defaults;
pub mod functions;
pub mod outputs;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::OutputFormat;

static NONALPHANUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\W_]+").unwrap());

const FORMAT_VERSION: &str = "2010-09-09";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("{section} {title} is already defined in the template")]
    Duplicate { section: &'static str, title: String },

    #[error("Parameter {0} is already defined with a different definition")]
    Conflicting(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// CloudFormation resource logical IDs only allow alphanumeric characters.
pub fn logical_name(name: &str) -> String {
    return NONALPHANUM.replace_all(name, "").to_string();
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(skip)]
    pub title: String,

    #[serde(rename = "Type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(title: &str, kind: &str) -> Self {
        Self {
            title: title.to_string(),
            kind: kind.to_string(),
            default: None,
            allowed_values: Vec::new(),
            description: None,
        }
    }

    pub fn string(title: &str) -> Self {
        Self::new(title, "String")
    }

    pub fn number(title: &str, default: i64) -> Self {
        Self::new(title, "Number").with_default(Value::from(default))
    }

    /// `"True"`/`"False"` toggle, the form conditions compare against.
    pub fn boolean(title: &str, default: bool) -> Self {
        let default = if default { "True" } else { "False" };
        Self::string(title)
            .with_default(Value::from(default))
            .with_allowed_values(&["True", "False"])
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|value| value.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(skip)]
    pub title: String,

    #[serde(rename = "Type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

impl Resource {
    pub fn new(title: &str, kind: &str, properties: Value) -> Self {
        Self {
            title: title.to_string(),
            kind: kind.to_string(),
            condition: None,
            properties,
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip)]
    pub title: String,

    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Value>,
}

impl Output {
    pub fn new(title: &str, value: Value) -> Self {
        Self {
            title: title.to_string(),
            value,
            description: None,
            condition: None,
            export: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    mappings: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    conditions: BTreeMap<String, Value>,

    resources: BTreeMap<String, Resource>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: Some(description.to_string()),
            metadata: BTreeMap::new(),
            parameters: BTreeMap::new(),
            mappings: BTreeMap::new(),
            conditions: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), TemplateError> {
        if self.parameters.contains_key(&parameter.title) {
            return Err(TemplateError::Duplicate {
                section: "Parameter",
                title: parameter.title,
            });
        }
        self.parameters.insert(parameter.title.clone(), parameter);
        return Ok(());
    }

    /// Adds the parameter unless an identical one is already declared.
    pub fn ensure_parameter(&mut self, parameter: Parameter) -> Result<(), TemplateError> {
        match self.parameters.get(&parameter.title) {
            Some(existing) if existing == &parameter => Ok(()),
            Some(_) => Err(TemplateError::Conflicting(parameter.title)),
            None => self.add_parameter(parameter),
        }
    }

    pub fn add_condition(&mut self, title: &str, condition: Value) -> Result<(), TemplateError> {
        if self.conditions.contains_key(title) {
            return Err(TemplateError::Duplicate {
                section: "Condition",
                title: title.to_string(),
            });
        }
        self.conditions.insert(title.to_string(), condition);
        return Ok(());
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), TemplateError> {
        if self.resources.contains_key(&resource.title) {
            return Err(TemplateError::Duplicate {
                section: "Resource",
                title: resource.title,
            });
        }
        self.resources.insert(resource.title.clone(), resource);
        return Ok(());
    }

    pub fn add_output(&mut self, output: Output) -> Result<(), TemplateError> {
        if self.outputs.contains_key(&output.title) {
            return Err(TemplateError::Duplicate {
                section: "Output",
                title: output.title,
            });
        }
        self.outputs.insert(output.title.clone(), output);
        return Ok(());
    }

    pub fn add_mapping(&mut self, title: &str, mapping: Value) -> Result<(), TemplateError> {
        if self.mappings.contains_key(title) {
            return Err(TemplateError::Duplicate {
                section: "Mapping",
                title: title.to_string(),
            });
        }
        self.mappings.insert(title.to_string(), mapping);
        return Ok(());
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub fn parameter(&self, title: &str) -> Option<&Parameter> {
        self.parameters.get(title)
    }

    pub fn condition(&self, title: &str) -> Option<&Value> {
        self.conditions.get(title)
    }

    pub fn resource(&self, title: &str) -> Option<&Resource> {
        self.resources.get(title)
    }

    pub fn output(&self, title: &str) -> Option<&Output> {
        self.outputs.get(title)
    }

    pub fn mapping(&self, title: &str) -> Option<&Value> {
        self.mappings.get(title)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, TemplateError> {
        let rendered = match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|error| TemplateError::SerializationError(error.to_string())),
            OutputFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|error| TemplateError::SerializationError(error.to_string())),
        }?;

        return Ok(rendered);
    }
}
