use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::types::{ByteStream, SdkError};
use aws_types::SdkConfig;

use crate::writer;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error(transparent)]
    WriteError(#[from] writer::Error),
}

/// Destination of child templates. Returns the URL nested stacks reference.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn upload(&self, file_name: &str, body: &str) -> Result<String, Error>;
}

/// Keeps templates in the output directory. Nested stacks reference them by
/// relative path, ready for `aws cloudformation package`.
pub struct LocalStore {
    output_dir: PathBuf,
}

impl LocalStore {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl TemplateStore for LocalStore {
    async fn upload(&self, file_name: &str, body: &str) -> Result<String, Error> {
        writer::write(&self.output_dir, file_name, body)?;
        return Ok(format!("./{}", file_name));
    }
}

/// Uploads templates to S3 under a date prefix, keeping a local copy.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    region: Option<String>,
    local: LocalStore,
}

impl S3Store {
    pub fn new(sdk_config: &SdkConfig, bucket: &str, output_dir: PathBuf) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            bucket: bucket.to_string(),
            prefix: chrono::Utc::now().format("%Y/%m/%d/%H%M").to_string(),
            region: sdk_config.region().map(|region| region.to_string()),
            local: LocalStore::new(output_dir),
        }
    }

    fn object_url(&self, key: &str) -> String {
        match &self.region {
            Some(region) => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, region, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl TemplateStore for S3Store {
    async fn upload(&self, file_name: &str, body: &str) -> Result<String, Error> {
        self.local.upload(file_name, body).await?;

        let key = format!("{}/{}", self.prefix, file_name);
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await;

        match result {
            Ok(_) => (),
            Err(SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        }

        return Ok(self.object_url(&key));
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::LocalStore;
    use super::TemplateStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_store_writes_templates() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());

        let url = store.upload("kinesis.json", "{}").await.unwrap();

        assert_eq!("./kinesis.json", url);
        assert_eq!(
            "{}",
            fs::read_to_string(dir.path().join("kinesis.json")).unwrap()
        );
    }
}
