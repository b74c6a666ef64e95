//! The `generate` command: compose file in, CloudFormation templates out.

use std::path::PathBuf;

use anyhow::Context;

use crate::aws::load_sdk_config;
use crate::compose::{self, ComposeProject};
use crate::config::Settings;
use crate::kinesis::{self, describe::KinesisDescriber, STREAM};
use crate::resources::lookup::{resolve_lookup, resolve_use};
use crate::resources::{lookup_resources, use_resources, Mappings};
use crate::stacks::generate_root_template;
use crate::store::{LocalStore, S3Store, TemplateStore};
use crate::validate::TemplateValidator;
use crate::writer;

/// Generates every template and returns the path of the root template.
pub async fn execute(settings: &Settings) -> anyhow::Result<PathBuf> {
    tracing::info!(path = %settings.compose_file.display(), "loading compose file");
    let document = compose::parse(&settings.compose_file)?;
    let project = ComposeProject::from_document(&document)?;
    tracing::info!(
        services = project.services.len(),
        volumes = project.volumes.len(),
        "services and volumes mapped"
    );

    let streams = kinesis::set_streams(&document)?;
    let lookups = lookup_resources(&streams);

    let needs_aws =
        !lookups.is_empty() || settings.bucket_name.is_some() || settings.validate_templates;
    let sdk_config = if needs_aws {
        Some(load_sdk_config(settings.region.as_deref()).await?)
    } else {
        None
    };

    let mut mappings = Mappings::default();
    resolve_use(&use_resources(&streams), &STREAM, &mut mappings)?;
    if let Some(sdk_config) = &sdk_config {
        if !lookups.is_empty() {
            let describe = KinesisDescriber::new(sdk_config);
            resolve_lookup(&lookups, &STREAM, &describe, &mut mappings).await?;
        }
    }

    let store: Box<dyn TemplateStore> = match (&settings.bucket_name, &sdk_config) {
        (Some(bucket), Some(sdk_config)) => Box::new(S3Store::new(
            sdk_config,
            bucket,
            settings.output_dir.clone(),
        )),
        _ => Box::new(LocalStore::new(settings.output_dir.clone())),
    };

    let root = generate_root_template(
        &document,
        &project,
        &streams,
        &mappings,
        store.as_ref(),
        settings,
    )
    .await?;
    let body = root.render(settings.format)?;
    let path = writer::write(
        &settings.output_dir,
        &settings.template_file_name(&settings.name),
        &body,
    )?;

    if let (true, Some(sdk_config)) = (settings.validate_templates, &sdk_config) {
        let parameters = TemplateValidator::new(sdk_config)
            .validate(&body)
            .await
            .context("root template failed validation")?;
        tracing::info!(parameters, "root template validated");
    }

    return Ok(path);
}
