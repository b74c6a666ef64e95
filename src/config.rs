use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").unwrap());
static AVAILABILITY_ZONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(?:-gov)?-[a-z]+-\d[a-z]$").unwrap());

pub const DEFAULT_AZ_COUNT: usize = 2;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Validation errors: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

/// Run settings, collected from the command line.
#[derive(Debug, Clone, Validate)]
pub struct Settings {
    #[validate(custom = "validate_compose_file")]
    pub compose_file: PathBuf,

    #[validate(custom = "validate_output_dir")]
    pub output_dir: PathBuf,

    pub format: OutputFormat,

    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[validate(custom = "validate_bucket_name")]
    pub bucket_name: Option<String>,

    pub region: Option<String>,

    #[validate(custom = "validate_azs")]
    pub azs: Vec<String>,

    pub validate_templates: bool,
}

impl Settings {
    pub fn validated(self) -> Result<Self, Error> {
        match self.validate() {
            Ok(_) => Ok(self),
            Err(error) => Err(Error::ValidationError(error.to_string())),
        }
    }

    /// Availability zones to spread hosts over, one per subnet index. Zones
    /// are left to the subnets when none were given.
    pub fn availability_zones(&self) -> Vec<Option<&str>> {
        if self.azs.is_empty() {
            return vec![None; DEFAULT_AZ_COUNT];
        }
        return self.azs.iter().map(|az| Some(az.as_str())).collect();
    }

    pub fn template_file_name(&self, stack: &str) -> String {
        format!("{}.{}", stack, self.format.extension())
    }
}

fn validate_compose_file(compose_file: &PathBuf) -> Result<(), ValidationError> {
    let file_extension = match compose_file.extension() {
        Some(extension) => extension,
        None => {
            return Err(ValidationError::new(
                "Unable to parse the extension of the compose file location",
            ))
        }
    };
    if file_extension != "yml" && file_extension != "yaml" {
        return Err(ValidationError::new(
            "The compose file location has to end with `.yml` or `.yaml`",
        ));
    }

    return Ok(());
}

fn validate_output_dir(output_dir: &PathBuf) -> Result<(), ValidationError> {
    if output_dir.is_file() {
        return Err(ValidationError::new(
            "The output directory location points to an existing file",
        ));
    }

    return Ok(());
}

fn validate_bucket_name(bucket_name: &str) -> Result<(), ValidationError> {
    if !BUCKET_NAME.is_match(bucket_name) || bucket_name.contains("..") {
        return Err(ValidationError::new("The S3 bucket name is invalid"));
    }

    return Ok(());
}

fn validate_azs(azs: &[String]) -> Result<(), ValidationError> {
    for az in azs {
        if !AVAILABILITY_ZONE.is_match(az) {
            return Err(ValidationError::new(
                "Availability zones must look like `eu-west-1a`",
            ));
        }
    }

    return Ok(());
}
