use aws_sdk_cloudformation::types::SdkError;
use aws_types::SdkConfig;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),
}

/// Checks rendered templates with the CloudFormation `ValidateTemplate` API.
pub struct TemplateValidator {
    client: aws_sdk_cloudformation::Client,
}

impl TemplateValidator {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        let client = aws_sdk_cloudformation::Client::new(sdk_config);
        return Self { client };
    }

    /// Returns the number of parameters CloudFormation found in the template.
    pub async fn validate(&self, template_body: &str) -> Result<usize, Error> {
        let result = self
            .client
            .validate_template()
            .template_body(template_body)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        let parameters = result.parameters().unwrap_or_else(|| &[]).len();

        return Ok(parameters);
    }
}
