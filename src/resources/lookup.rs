use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    AttributeMapping, LookupTarget, Mappings, ResourceError, ResourceKind, ResourceMode, XResource,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DescribeError {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),
}

/// Describe API of one resource kind. `Ok(None)` means the resource does not exist.
///
/// `region` is set when the resource was declared by ARN; implementations
/// must query that region rather than the configured one.
#[async_trait]
pub trait Describe: Send + Sync {
    async fn describe(
        &self,
        resource_id: &str,
        region: Option<&str>,
    ) -> Result<Option<Value>, DescribeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArnParts {
    pub partition: String,
    pub region: String,
    pub account_id: String,
    pub resource_id: String,
}

pub fn parse_arn(kind: &ResourceKind, arn: &str) -> Option<ArnParts> {
    let captures = kind.arn_pattern.captures(arn)?;
    return Some(ArnParts {
        partition: captures.name("partition")?.as_str().to_string(),
        region: captures.name("region")?.as_str().to_string(),
        account_id: captures.name("account_id")?.as_str().to_string(),
        resource_id: captures.name("id")?.as_str().to_string(),
    });
}

fn arn_parts(
    resource: &XResource,
    kind: &ResourceKind,
    arn: &str,
) -> Result<ArnParts, ResourceError> {
    match parse_arn(kind, arn) {
        Some(parts) => Ok(parts),
        None => Err(ResourceError::InvalidArn {
            name: resource.name.clone(),
            arn: arn.to_string(),
            pattern: kind.arn_pattern.as_str().to_string(),
        }),
    }
}

fn path_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split("::")
        .try_fold(value, |current, segment| current.get(segment))
}

/// Flattens a describe response. Fails with the first required path that is
/// missing, so a mapping is either complete or not produced at all.
pub fn attributes_to_mapping(
    value: &Value,
    attributes: &[AttributeMapping],
) -> Result<BTreeMap<String, String>, String> {
    let mut mapping = BTreeMap::new();
    for attribute in attributes {
        let found = match path_value(value, attribute.path) {
            Some(Value::String(found)) => Some(found.clone()),
            Some(Value::Null) | None => None,
            Some(found) => Some(found.to_string()),
        };
        match found {
            Some(found) => {
                mapping.insert(attribute.name.to_string(), found);
            }
            None if attribute.required => return Err(attribute.path.to_string()),
            None => (),
        }
    }

    return Ok(mapping);
}

/// Looks up a single resource. `Ok(None)` when the API reports it missing,
/// or when a resource declared by ARN resolves to a different ARN.
pub async fn lookup_resource(
    resource: &XResource,
    kind: &ResourceKind,
    describe: &dyn Describe,
) -> Result<Option<BTreeMap<String, String>>, ResourceError> {
    let (resource_id, declared) = match &resource.mode {
        ResourceMode::Lookup(LookupTarget::Arn(arn)) => {
            let parts = arn_parts(resource, kind, arn)?;
            (parts.resource_id.clone(), Some((arn.as_str(), parts)))
        }
        ResourceMode::Lookup(LookupTarget::Name(name)) => (name.clone(), None),
        _ => {
            return Err(ResourceError::InvalidDefinition {
                name: resource.name.clone(),
                message: String::from("not a lookup resource"),
            })
        }
    };
    let region = declared.as_ref().map(|(_, parts)| parts.region.as_str());

    let description = match describe.describe(&resource_id, region).await {
        Ok(Some(description)) => description,
        Ok(None) => return Ok(None),
        Err(error) => {
            return Err(ResourceError::Describe {
                name: resource.name.clone(),
                source: error,
            })
        }
    };

    let mapping = match attributes_to_mapping(&description, kind.lookup_attributes) {
        Ok(mapping) => mapping,
        Err(path) => {
            return Err(ResourceError::MissingAttribute {
                name: resource.name.clone(),
                path,
            })
        }
    };

    if let Some((arn, parts)) = &declared {
        let found = mapping.get(kind.arn_attribute).map(String::as_str);
        if found != Some(*arn) {
            tracing::warn!(
                resource = %resource.name,
                declared = %arn,
                found = found.unwrap_or(""),
                account_id = %parts.account_id,
                "resource found under another ARN, ignoring it"
            );
            return Ok(None);
        }
    }

    return Ok(Some(mapping));
}

/// Resolves lookup resources into `mappings`. Missing resources and API
/// failures leave the resource unmapped; incomplete responses abort.
pub async fn resolve_lookup(
    resources: &[&XResource],
    kind: &ResourceKind,
    describe: &dyn Describe,
    mappings: &mut Mappings,
) -> Result<(), ResourceError> {
    for resource in resources {
        tracing::info!(
            kind = kind.res_key,
            resource = %resource.logical_name,
            "looking up AWS resource"
        );
        match lookup_resource(resource, kind, describe).await {
            Ok(Some(mapping)) => {
                tracing::info!(
                    kind = kind.res_key,
                    resource = %resource.name,
                    arn = mapping.get(kind.arn_attribute).map(String::as_str).unwrap_or(""),
                    "matched existing resource"
                );
                mappings.insert(kind.mappings_key, &resource.logical_name, mapping);
            }
            Ok(None) => {
                tracing::warn!(kind = kind.res_key, resource = %resource.name, "resource not found");
            }
            Err(error @ ResourceError::Describe { .. }) => {
                tracing::error!(kind = kind.res_key, resource = %resource.name, %error, "lookup abandoned");
            }
            Err(error) => return Err(error),
        }
    }

    return Ok(());
}

/// Maps use resources straight from their ARN.
pub fn resolve_use(
    resources: &[&XResource],
    kind: &ResourceKind,
    mappings: &mut Mappings,
) -> Result<(), ResourceError> {
    for resource in resources {
        let arn = match &resource.mode {
            ResourceMode::Use(arn) => arn,
            _ => continue,
        };
        let parts = arn_parts(resource, kind, arn)?;

        let mut mapping = BTreeMap::new();
        mapping.insert(kind.arn_attribute.to_string(), arn.clone());
        mapping.insert(kind.id_attribute.to_string(), parts.resource_id);
        tracing::info!(kind = kind.res_key, resource = %resource.name, arn = %arn, "using existing resource");
        mappings.insert(kind.mappings_key, &resource.logical_name, mapping);
    }

    return Ok(());
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::compose::parse_str;
    use crate::kinesis::STREAM;
    use crate::resources::{lookup_resources, set_resources, use_resources};

    /// Answers describe calls from a fixed table of resource ids and records
    /// every call.
    pub struct FakeDescribe {
        pub responses: BTreeMap<String, Result<Value, DescribeError>>,
        pub calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeDescribe {
        pub fn new() -> Self {
            Self {
                responses: BTreeMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn with(mut self, resource_id: &str, response: Result<Value, DescribeError>) -> Self {
            self.responses.insert(resource_id.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl Describe for FakeDescribe {
        async fn describe(
            &self,
            resource_id: &str,
            region: Option<&str>,
        ) -> Result<Option<Value>, DescribeError> {
            self.calls
                .lock()
                .unwrap()
                .push((resource_id.to_string(), region.map(String::from)));
            match self.responses.get(resource_id) {
                Some(Ok(value)) => Ok(Some(value.clone())),
                Some(Err(error)) => Err(error.clone()),
                None => Ok(None),
            }
        }
    }

    pub fn stream_description(name: &str) -> Value {
        json!({
            "StreamDescription": {
                "StreamARN": format!("arn:aws:kinesis:eu-west-1:123456789012:stream/{}", name),
                "StreamName": name,
                "StreamStatus": "ACTIVE",
            }
        })
    }

    fn resources(contents: &str) -> Vec<XResource> {
        set_resources(&parse_str(contents).unwrap(), &STREAM).unwrap()
    }

    #[test]
    fn flattens_attribute_paths() {
        let attributes = [
            AttributeMapping {
                name: "Arn",
                path: "StreamDescription::StreamARN",
                required: true,
            },
            AttributeMapping {
                name: "KmsKeyId",
                path: "StreamDescription::KeyId",
                required: false,
            },
        ];

        let mapping = attributes_to_mapping(&stream_description("events"), &attributes).unwrap();
        assert_eq!(1, mapping.len());
        assert_eq!(
            "arn:aws:kinesis:eu-west-1:123456789012:stream/events",
            mapping["Arn"]
        );

        let result = attributes_to_mapping(&json!({ "StreamDescription": {} }), &attributes);
        assert_eq!(Err(String::from("StreamDescription::StreamARN")), result);
    }

    #[test]
    fn parses_stream_arns() {
        let parts = parse_arn(
            &STREAM,
            "arn:aws-cn:kinesis:cn-north-1:123456789012:stream/my-stream",
        )
        .unwrap();
        assert_eq!("aws-cn", parts.partition);
        assert_eq!("cn-north-1", parts.region);
        assert_eq!("123456789012", parts.account_id);
        assert_eq!("my-stream", parts.resource_id);

        assert_eq!(
            None,
            parse_arn(&STREAM, "arn:aws:sqs:eu-west-1:123456789012:queue")
        );
    }

    #[tokio::test]
    async fn nonexistent_stream_has_no_mapping() {
        let resources = resources("x-kinesis:\n  missing:\n    Lookup:\n      Name: missing\n");
        let describe = FakeDescribe::new();

        let result = lookup_resource(&resources[0], &STREAM, &describe).await;
        assert_eq!(Ok(None), result);
    }

    #[tokio::test]
    async fn resolves_lookups_into_mappings() {
        let resources = resources(
            r#"
x-kinesis:
  events:
    Lookup:
      Arn: arn:aws:kinesis:eu-west-1:123456789012:stream/events
  missing:
    Lookup: missing
  broken:
    Lookup: broken
"#,
        );
        let describe = FakeDescribe::new()
            .with("events", Ok(stream_description("events")))
            .with(
                "broken",
                Err(DescribeError::ServiceError(String::from("AccessDenied"))),
            );
        let mut mappings = Mappings::default();

        resolve_lookup(
            &lookup_resources(&resources),
            &STREAM,
            &describe,
            &mut mappings,
        )
        .await
        .unwrap();

        let events = mappings.get("kinesis", "events").unwrap();
        assert_eq!("events", events["Name"]);
        assert_eq!(None, mappings.get("kinesis", "missing"));
        assert_eq!(None, mappings.get("kinesis", "broken"));
    }

    #[tokio::test]
    async fn incomplete_response_aborts() {
        let resources = resources("x-kinesis:\n  events:\n    Lookup: events\n");
        let describe = FakeDescribe::new().with(
            "events",
            Ok(json!({ "StreamDescription": { "StreamName": "events" } })),
        );
        let mut mappings = Mappings::default();

        let result = resolve_lookup(
            &lookup_resources(&resources),
            &STREAM,
            &describe,
            &mut mappings,
        )
        .await;

        match result.err().unwrap() {
            ResourceError::MissingAttribute { name, .. } => assert_eq!("events", name),
            _ => panic!("Expected `MissingAttribute` error"),
        }
        assert_eq!(true, mappings.is_empty());
    }

    #[tokio::test]
    async fn invalid_lookup_arn_aborts() {
        let resources = resources("x-kinesis:\n  events:\n    Lookup: arn:aws:sqs:eu-west-1:1:q\n");
        let mut mappings = Mappings::default();

        let result = resolve_lookup(
            &lookup_resources(&resources),
            &STREAM,
            &FakeDescribe::new(),
            &mut mappings,
        )
        .await;

        match result.err().unwrap() {
            ResourceError::InvalidArn { .. } => {}
            _ => panic!("Expected `InvalidArn` error"),
        }
    }

    #[test]
    fn maps_use_resources_from_arn() {
        let resources = resources(
            "x-kinesis:\n  shared:\n    Use: arn:aws:kinesis:eu-west-1:123456789012:stream/shared-events\n",
        );
        let mut mappings = Mappings::default();

        resolve_use(&use_resources(&resources), &STREAM, &mut mappings).unwrap();

        let shared = mappings.get("kinesis", "shared").unwrap();
        assert_eq!("shared-events", shared["Name"]);
        assert_eq!(
            "arn:aws:kinesis:eu-west-1:123456789012:stream/shared-events",
            shared["Arn"]
        );
    }

    #[tokio::test]
    async fn arn_lookups_query_the_declared_region_and_account() {
        let resources = resources(
            r#"
x-kinesis:
  events:
    Lookup: arn:aws:kinesis:eu-west-1:123456789012:stream/events
  foreign:
    Lookup: arn:aws:kinesis:us-east-1:111111111111:stream/events
  named:
    Lookup: events
"#,
        );
        let describe = FakeDescribe::new().with("events", Ok(stream_description("events")));
        let mut mappings = Mappings::default();

        resolve_lookup(
            &lookup_resources(&resources),
            &STREAM,
            &describe,
            &mut mappings,
        )
        .await
        .unwrap();

        assert_eq!(
            vec![
                (String::from("events"), Some(String::from("eu-west-1"))),
                (String::from("events"), Some(String::from("us-east-1"))),
                (String::from("events"), None),
            ],
            describe.calls()
        );
        assert_eq!(true, mappings.get("kinesis", "events").is_some());
        assert_eq!(None, mappings.get("kinesis", "foreign"));
        assert_eq!(true, mappings.get("kinesis", "named").is_some());
    }
}
