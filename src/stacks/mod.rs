//! Nested stack composition.
//!
//! The root template declares the shared parameters and the resolved
//! `Mappings`, then adds one `AWS::CloudFormation::Stack` per child template
//! that could be uploaded. Child parameters are declared on the root and
//! passed down by `Ref`, except the root stack name which is resolved with
//! [`root_stack_name`].

pub mod cluster;
pub mod services;
pub mod spot_fleet;

use serde_json::{Map, Value};

use crate::cfn::defaults::{build_template, is_default_parameter, root_stack_name, ROOT_STACK_NAME};
use crate::cfn::functions::{find_in_map, get_att, reference};
use crate::cfn::{Output, Resource, Template, TemplateError};
use crate::compose::{ComposeDocument, ComposeProject};
use crate::config::{OutputFormat, Settings};
use crate::kinesis::{template::create_streams_template, STREAM};
use crate::resources::{new_resources, Mappings, ResourceKind, XResource};
use crate::store::TemplateStore;

pub const CLUSTER_STACK: &str = "Cluster";
pub const SERVICES_STACK: &str = "Services";
pub const KINESIS_STACK: &str = "Kinesis";

const NESTED_STACK_TYPE: &str = "AWS::CloudFormation::Stack";

#[derive(thiserror::Error, Debug)]
pub enum StackError {
    #[error(transparent)]
    TemplateError(#[from] TemplateError),

    #[error("{kind}.{name} - no resolved value for {attribute}")]
    UnresolvedResource {
        kind: String,
        name: String,
        attribute: String,
    },

    #[error("Invalid spot_config: {0}")]
    InvalidSpotConfig(String),
}

pub struct ChildStack {
    pub title: String,
    pub template: Template,
}

/// Renders and uploads a template. Upload failures are not fatal: they are
/// logged and `None` is returned so the caller can leave the stack out.
pub async fn upload_template(
    store: &dyn TemplateStore,
    file_name: &str,
    template: &Template,
    format: OutputFormat,
) -> Result<Option<String>, StackError> {
    let body = template.render(format)?;
    match store.upload(file_name, &body).await {
        Ok(url) => {
            tracing::info!(file_name, url = %url, "template uploaded");
            Ok(Some(url))
        }
        Err(error) => {
            tracing::warn!(file_name, %error, "template upload failed");
            Ok(None)
        }
    }
}

pub fn nested_stack(title: &str, template_url: &str, parameters: Map<String, Value>) -> Resource {
    Resource::new(
        title,
        NESTED_STACK_TYPE,
        serde_json::json!({
            "TemplateURL": template_url,
            "Parameters": Value::Object(parameters),
        }),
    )
}

/// Declares the child's parameters on `parent` and returns the nested stack
/// parameter values forwarding them.
pub fn forward_parameters(
    parent: &mut Template,
    child: &Template,
) -> Result<Map<String, Value>, TemplateError> {
    let mut parameters = Map::new();
    for parameter in child.parameters() {
        if parameter.title == ROOT_STACK_NAME {
            parameters.insert(parameter.title.clone(), root_stack_name());
            continue;
        }
        if !is_default_parameter(&parameter.title) {
            parent.ensure_parameter(parameter.clone())?;
        }
        parameters.insert(parameter.title.clone(), reference(&parameter.title));
    }

    return Ok(parameters);
}

/// Root outputs for every declared resource of `kind`: nested stack outputs
/// for new resources, mappings for the others.
fn resource_outputs(
    root: &mut Template,
    kind: &ResourceKind,
    resources: &[XResource],
    stack_title: Option<&str>,
    mappings: &Mappings,
) -> Result<(), StackError> {
    for resource in resources {
        for spec in kind.outputs {
            let title = spec.title(&resource.logical_name);
            let unresolved = || StackError::UnresolvedResource {
                kind: kind.res_key.to_string(),
                name: resource.name.clone(),
                attribute: spec.attribute.to_string(),
            };

            let value = if resource.is_new() {
                match stack_title {
                    Some(stack_title) => get_att(stack_title, &format!("Outputs.{}", title)),
                    None => return Err(unresolved()),
                }
            } else {
                match mappings.get(kind.mappings_key, &resource.logical_name) {
                    Some(attributes) if attributes.contains_key(spec.attribute) => find_in_map(
                        kind.mappings_key,
                        &resource.logical_name,
                        spec.attribute,
                    ),
                    _ => return Err(unresolved()),
                }
            };
            root.add_output(Output::new(&title, value))?;
        }
    }

    return Ok(());
}

/// Name of an existing cluster declared with `x-cluster: { Use: name }`.
pub fn existing_cluster(document: &ComposeDocument) -> Option<String> {
    document
        .section(cluster::RES_KEY)?
        .get("Use")?
        .as_str()
        .map(String::from)
}

pub async fn generate_root_template(
    document: &ComposeDocument,
    project: &ComposeProject,
    streams: &[XResource],
    mappings: &Mappings,
    store: &dyn TemplateStore,
    settings: &Settings,
) -> Result<Template, StackError> {
    let mut children = Vec::new();

    let cluster_name = existing_cluster(document);
    if cluster_name.is_none() {
        children.push(ChildStack {
            title: String::from(CLUSTER_STACK),
            template: cluster::generate_cluster_template(document, store, settings).await?,
        });
    }
    if !project.services.is_empty() {
        children.push(ChildStack {
            title: String::from(SERVICES_STACK),
            template: services::create_services_template(project)?,
        });
    }
    let new_streams = new_resources(streams);
    if !new_streams.is_empty() {
        children.push(ChildStack {
            title: String::from(KINESIS_STACK),
            template: create_streams_template(&new_streams)?,
        });
    }

    let mut root = build_template(Some("Root stack generated by compose-cfn"), Vec::new())?;
    if mappings.is_empty() {
        tracing::debug!("no existing resources resolved, root has no mappings");
    }
    for (title, mapping) in mappings.to_cfn() {
        root.add_mapping(&title, mapping)?;
    }

    let mut added = Vec::new();
    for child in &children {
        let file_name = settings.template_file_name(&child.title.to_lowercase());
        let url = match upload_template(store, &file_name, &child.template, settings.format).await? {
            Some(url) => url,
            None => {
                tracing::warn!(stack = %child.title, "template not available, skipping nested stack");
                continue;
            }
        };
        let parameters = forward_parameters(&mut root, &child.template)?;
        root.add_resource(nested_stack(&child.title, &url, parameters))?;
        added.push(child.title.as_str());
    }

    match cluster_name {
        Some(name) => root.add_output(Output::new(cluster::CLUSTER_NAME_OUTPUT, Value::from(name)))?,
        None if added.contains(&CLUSTER_STACK) => root.add_output(Output::new(
            cluster::CLUSTER_NAME_OUTPUT,
            get_att(
                CLUSTER_STACK,
                &format!("Outputs.{}", cluster::CLUSTER_NAME_OUTPUT),
            ),
        ))?,
        None => (),
    }

    let kinesis_stack = if added.contains(&KINESIS_STACK) {
        Some(KINESIS_STACK)
    } else {
        None
    };
    resource_outputs(&mut root, &STREAM, streams, kinesis_stack, mappings)?;

    return Ok(root);
}
