use async_trait::async_trait;
use aws_sdk_kinesis::types::SdkError;
use aws_types::region::Region;
use aws_types::SdkConfig;
use serde_json::{json, Map, Value};

use crate::resources::lookup::{Describe, DescribeError};

pub struct KinesisDescriber {
    sdk_config: SdkConfig,
    client: aws_sdk_kinesis::Client,
}

impl KinesisDescriber {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        let client = aws_sdk_kinesis::Client::new(sdk_config);
        return Self {
            sdk_config: sdk_config.clone(),
            client,
        };
    }

    /// The configured client, or one bound to `region` when it differs.
    fn client_for(&self, region: Option<&str>) -> aws_sdk_kinesis::Client {
        match region {
            Some(region) if self.sdk_config.region().map(Region::as_ref) != Some(region) => {
                let config = aws_sdk_kinesis::config::Builder::from(&self.sdk_config)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_kinesis::Client::from_conf(config)
            }
            _ => self.client.clone(),
        }
    }
}

#[async_trait]
impl Describe for KinesisDescriber {
    async fn describe(
        &self,
        resource_id: &str,
        region: Option<&str>,
    ) -> Result<Option<Value>, DescribeError> {
        let result = self
            .client_for(region)
            .describe_stream()
            .stream_name(resource_id)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                if err.is_resource_not_found_exception() {
                    return Ok(None);
                }
                return Err(DescribeError::ServiceError(err.to_string()));
            }
            Err(err) => return Err(DescribeError::UnknownError(err.to_string())),
        };

        let description = match result.stream_description() {
            Some(description) => description,
            None => return Ok(None),
        };

        let mut fields = Map::new();
        if let Some(arn) = description.stream_arn() {
            fields.insert(String::from("StreamARN"), Value::from(arn));
        }
        if let Some(name) = description.stream_name() {
            fields.insert(String::from("StreamName"), Value::from(name));
        }
        if let Some(key_id) = description.key_id() {
            fields.insert(String::from("KeyId"), Value::from(key_id));
        }
        if let Some(status) = description.stream_status() {
            fields.insert(String::from("StreamStatus"), Value::from(status.as_str()));
        }

        return Ok(Some(json!({ "StreamDescription": Value::Object(fields) })));
    }
}
