//! Compose file loading and service/volume binding.

pub mod services;
pub mod volumes;

use std::collections::BTreeMap;
use std::{fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::cfn::logical_name;
use services::ComposeService;
use volumes::{map_volumes, ComposeVolume, VolumeError};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error(transparent)]
    VolumeError(#[from] VolumeError),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmpfsOptions {
    pub size: Option<u64>,
}

/// Long form of a service volume entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub source: Option<String>,

    pub target: Option<String>,

    #[serde(default)]
    pub read_only: bool,

    pub tmpfs: Option<TmpfsOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceVolume {
    Short(String),
    Long(VolumeMount),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub image: Option<String>,

    #[serde(default)]
    pub volumes: Vec<ServiceVolume>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    pub driver: Option<String>,

    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,

    #[serde(default)]
    pub external: bool,

    pub name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct ComposeDocument {
    #[serde(default)]
    #[validate(custom = "validate_service_names")]
    pub services: BTreeMap<String, ServiceDefinition>,

    /// `cache:` and `cache: {}` both declare a volume with no options.
    #[serde(default)]
    #[validate(custom = "validate_volume_names")]
    pub volumes: BTreeMap<String, Option<VolumeDefinition>>,

    #[serde(default)]
    pub configs: serde_yaml::Mapping,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_yaml::Value>,
}

impl ComposeDocument {
    pub fn section(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.extensions.get(key)
    }

    pub fn config(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.configs.get(&serde_yaml::Value::from(key))
    }
}

/// Services and volumes once volume references have been resolved.
#[derive(Debug, Default)]
pub struct ComposeProject {
    pub services: Vec<ComposeService>,
    pub volumes: Vec<ComposeVolume>,
}

impl ComposeProject {
    pub fn from_document(document: &ComposeDocument) -> Result<Self, VolumeError> {
        let mut volumes: Vec<ComposeVolume> = document
            .volumes
            .iter()
            .map(|(name, definition)| {
                ComposeVolume::new(name, definition.clone().unwrap_or_default())
            })
            .collect();

        let mut services = Vec::new();
        for (name, definition) in &document.services {
            let mut service = ComposeService::new(name, definition.clone());
            map_volumes(&mut service, &mut volumes)?;
            services.push(service);
        }

        return Ok(Self { services, volumes });
    }

    pub fn service(&self, name: &str) -> Option<&ComposeService> {
        self.services.iter().find(|service| service.name == name)
    }

    pub fn volume(&self, name: &str) -> Option<&ComposeVolume> {
        self.volumes.iter().find(|volume| volume.name == name)
    }
}

pub fn parse(path: &PathBuf) -> Result<ComposeDocument, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    return parse_str(&contents);
}

pub fn parse_str(contents: &str) -> Result<ComposeDocument, Error> {
    let document: ComposeDocument = match serde_yaml::from_str(contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    match document.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    return Ok(document);
}

/// Names end up as CloudFormation logical ids, so they must stay distinct
/// once stripped.
fn unique_logical_names<'a>(
    names: impl Iterator<Item = &'a String>,
    empty: &'static str,
    collision: &'static str,
) -> Result<(), ValidationError> {
    let mut seen = Vec::new();
    for name in names {
        let logical = logical_name(name);
        if logical.is_empty() {
            return Err(ValidationError::new(empty));
        }
        if seen.contains(&logical) {
            return Err(ValidationError::new(collision));
        }
        seen.push(logical);
    }

    return Ok(());
}

fn validate_service_names(
    services: &BTreeMap<String, ServiceDefinition>,
) -> Result<(), ValidationError> {
    unique_logical_names(
        services.keys(),
        "Service names must contain alphanumerical characters",
        "Service names must stay unique once non alphanumerical characters are removed",
    )
}

fn validate_volume_names(
    volumes: &BTreeMap<String, Option<VolumeDefinition>>,
) -> Result<(), ValidationError> {
    unique_logical_names(
        volumes.keys(),
        "Volume names must contain alphanumerical characters",
        "Volume names must stay unique once non alphanumerical characters are removed",
    )
}
