use aws_config::meta::region::RegionProviderChain;
use aws_types::region::Region;
use aws_types::SdkConfig;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("No AWS region configured, use --region or AWS_REGION")]
    MissingRegion,
}

pub async fn load_sdk_config(region: Option<&str>) -> Result<SdkConfig, Error> {
    let region = match region {
        Some(provided_region) => Region::new(provided_region.to_string()),
        None => match RegionProviderChain::default_provider().region().await {
            Some(region) => region,
            None => return Err(Error::MissingRegion),
        },
    };

    tracing::debug!(region = %region, "loading AWS configuration");
    let sdk_config = aws_config::from_env().region(region).load().await;

    return Ok(sdk_config);
}
