//! `x-*` resource declarations: parsing, classification and resolved mappings.
//!
//! Each declared resource is exactly one of:
//!
//! - *new*: created by the generated templates (`Properties`, or nothing at all),
//! - *use*: an existing resource referenced by ARN (`Use`),
//! - *lookup*: an existing resource discovered through the AWS API (`Lookup`).
//!
//! Use and lookup resources end up in [`Mappings`], which the root template
//! carries as its `Mappings` section.

pub mod lookup;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use serde_yaml::Mapping;

use crate::cfn::logical_name;
use crate::compose::ComposeDocument;
use crate::stacks::cluster::CLUSTER_NAME_OUTPUT;
use lookup::DescribeError;

const PROPERTIES_KEY: &str = "Properties";
const LOOKUP_KEY: &str = "Lookup";
const USE_KEY: &str = "Use";
const KNOWN_KEYS: [&str; 5] = [PROPERTIES_KEY, LOOKUP_KEY, USE_KEY, "Settings", "Services"];
const SSM_EXPORT_SUFFIX: &str = "SsmExport";

/// Root outputs that are not derived from `x-*` resources.
const RESERVED_TITLES: [&str; 1] = [CLUSTER_NAME_OUTPUT];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ResourceError {
    #[error("{0} must be a mapping of resource names to definitions")]
    InvalidSection(String),

    #[error("{name} - invalid definition: {message}")]
    InvalidDefinition { name: String, message: String },

    #[error("{name} - `Lookup`, `Use` and `Properties` are mutually exclusive")]
    ConflictingModes { name: String },

    #[error("{name} - logical name {logical_name} is empty or already used")]
    InvalidLogicalName { name: String, logical_name: String },

    #[error("{name} - generated title {title} clashes with another resource or a root output")]
    TitleCollision { name: String, title: String },

    #[error("{name} - {arn} does not match {pattern}")]
    InvalidArn {
        name: String,
        arn: String,
        pattern: String,
    },

    #[error("{name} - attribute {path} missing from the API response")]
    MissingAttribute { name: String, path: String },

    #[error("{name} - lookup failed: {source}")]
    Describe { name: String, source: DescribeError },
}

/// Where a flattened attribute is read from in a describe response, e.g.
/// `StreamDescription::StreamARN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeMapping {
    pub name: &'static str,
    pub path: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputSource {
    Ref,
    GetAtt(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSpec {
    pub attribute: &'static str,
    pub suffix: &'static str,
    pub source: OutputSource,
}

impl OutputSpec {
    pub fn title(&self, logical_name: &str) -> String {
        format!("{}{}", logical_name, self.suffix)
    }
}

/// Static description of one kind of `x-*` resource.
pub struct ResourceKind {
    pub res_key: &'static str,
    pub mappings_key: &'static str,
    pub cfn_type: &'static str,
    pub arn_pattern: &'static Lazy<Regex>,
    pub arn_attribute: &'static str,
    pub id_attribute: &'static str,
    pub lookup_attributes: &'static [AttributeMapping],
    pub outputs: &'static [OutputSpec],
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupTarget {
    Arn(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceMode {
    New { properties: Mapping },
    Use(String),
    Lookup(LookupTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XResource {
    pub name: String,
    pub logical_name: String,
    pub mode: ResourceMode,
}

impl XResource {
    pub fn new(name: &str, definition: Option<&Mapping>) -> Result<Self, ResourceError> {
        let empty = Mapping::new();
        let definition = definition.unwrap_or(&empty);

        for key in definition.keys() {
            match key.as_str() {
                Some(key) if KNOWN_KEYS.contains(&key) => (),
                _ => tracing::warn!(resource = name, key = ?key, "ignoring unknown key"),
            }
        }

        let properties = definition.get(PROPERTIES_KEY);
        let lookup = definition.get(LOOKUP_KEY);
        let use_value = definition.get(USE_KEY);

        let mode = match (properties, lookup, use_value) {
            (None, Some(lookup), None) => ResourceMode::Lookup(lookup_target(name, lookup)?),
            (None, None, Some(use_value)) => match use_value.as_str() {
                Some(arn) => ResourceMode::Use(arn.to_string()),
                None => {
                    return Err(ResourceError::InvalidDefinition {
                        name: name.to_string(),
                        message: String::from("`Use` must be an ARN"),
                    })
                }
            },
            (properties, None, None) => ResourceMode::New {
                properties: match properties {
                    None | Some(serde_yaml::Value::Null) => Mapping::new(),
                    Some(serde_yaml::Value::Mapping(properties)) => properties.clone(),
                    Some(_) => {
                        return Err(ResourceError::InvalidDefinition {
                            name: name.to_string(),
                            message: String::from("`Properties` must be a mapping"),
                        })
                    }
                },
            },
            _ => {
                return Err(ResourceError::ConflictingModes {
                    name: name.to_string(),
                })
            }
        };

        return Ok(Self {
            name: name.to_string(),
            logical_name: logical_name(name),
            mode,
        });
    }

    pub fn is_new(&self) -> bool {
        matches!(self.mode, ResourceMode::New { .. })
    }

    pub fn is_use(&self) -> bool {
        matches!(self.mode, ResourceMode::Use(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self.mode, ResourceMode::Lookup(_))
    }
}

fn lookup_target(name: &str, lookup: &serde_yaml::Value) -> Result<LookupTarget, ResourceError> {
    let invalid = |message: &str| ResourceError::InvalidDefinition {
        name: name.to_string(),
        message: message.to_string(),
    };

    match lookup {
        serde_yaml::Value::String(value) if value.starts_with("arn:") => {
            Ok(LookupTarget::Arn(value.clone()))
        }
        serde_yaml::Value::String(value) => Ok(LookupTarget::Name(value.clone())),
        serde_yaml::Value::Mapping(lookup) => {
            if lookup.contains_key("Tags") {
                return Err(invalid("tag based lookups are not supported, use `Arn` or `Name`"));
            }
            if let Some(arn) = lookup.get("Arn").and_then(serde_yaml::Value::as_str) {
                return Ok(LookupTarget::Arn(arn.to_string()));
            }
            if let Some(resource_name) = lookup.get("Name").and_then(serde_yaml::Value::as_str) {
                return Ok(LookupTarget::Name(resource_name.to_string()));
            }
            Err(invalid("`Lookup` requires `Arn` or `Name`"))
        }
        _ => Err(invalid("`Lookup` must be a name, an ARN or a mapping")),
    }
}

/// Logical ids the resource generates in templates: its own, its outputs and
/// the SSM parameters exporting them.
fn generated_titles(kind: &ResourceKind, resource: &XResource) -> Vec<String> {
    let mut titles = vec![resource.logical_name.clone()];
    for spec in kind.outputs {
        let title = spec.title(&resource.logical_name);
        titles.push(format!("{}{}", title, SSM_EXPORT_SUFFIX));
        titles.push(title);
    }
    titles.sort();
    titles.dedup();
    titles
}

/// Reads every resource declared in the kind's section.
pub fn set_resources(
    document: &ComposeDocument,
    kind: &ResourceKind,
) -> Result<Vec<XResource>, ResourceError> {
    let section = match document.section(kind.res_key) {
        None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
        Some(serde_yaml::Value::Mapping(section)) => section,
        Some(_) => return Err(ResourceError::InvalidSection(kind.res_key.to_string())),
    };

    let mut resources: Vec<XResource> = Vec::new();
    let mut titles: Vec<String> = Vec::new();
    for (name, definition) in section {
        let name = match name.as_str() {
            Some(name) => name,
            None => return Err(ResourceError::InvalidSection(kind.res_key.to_string())),
        };
        let definition = match definition {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Mapping(definition) => Some(definition),
            _ => {
                return Err(ResourceError::InvalidDefinition {
                    name: name.to_string(),
                    message: String::from("definition must be a mapping"),
                })
            }
        };

        let resource = XResource::new(name, definition)?;
        if resource.logical_name.is_empty()
            || resources
                .iter()
                .any(|other| other.logical_name == resource.logical_name)
        {
            return Err(ResourceError::InvalidLogicalName {
                name: resource.name,
                logical_name: resource.logical_name,
            });
        }

        let generated = generated_titles(kind, &resource);
        let clash = generated.iter().find(|title| {
            titles.contains(title) || RESERVED_TITLES.contains(&title.as_str())
        });
        if let Some(title) = clash {
            return Err(ResourceError::TitleCollision {
                name: resource.name,
                title: title.clone(),
            });
        }
        titles.extend(generated);
        resources.push(resource);
    }

    return Ok(resources);
}

pub fn new_resources(resources: &[XResource]) -> Vec<&XResource> {
    resources.iter().filter(|resource| resource.is_new()).collect()
}

pub fn use_resources(resources: &[XResource]) -> Vec<&XResource> {
    resources.iter().filter(|resource| resource.is_use()).collect()
}

pub fn lookup_resources(resources: &[XResource]) -> Vec<&XResource> {
    resources.iter().filter(|resource| resource.is_lookup()).collect()
}

/// Resolved attributes of existing resources, by kind then logical name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Mappings {
    entries: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

impl Mappings {
    pub fn insert(&mut self, kind: &str, logical_name: &str, attributes: BTreeMap<String, String>) {
        self.entries
            .entry(kind.to_string())
            .or_default()
            .insert(logical_name.to_string(), attributes);
    }

    pub fn get(&self, kind: &str, logical_name: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(kind)?.get(logical_name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Non-empty kinds, rendered as CloudFormation mappings.
    pub fn to_cfn(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .filter(|(_, resources)| !resources.is_empty())
            .map(|(kind, resources)| {
                let value = serde_json::to_value(resources).unwrap_or(Value::Null);
                (kind.clone(), value)
            })
            .collect()
    }
}
