//! S3-compatible bucket client — same shape as the gateway's adapter of the
//! same name, grounded on `control_core::staging` and the pack's
//! `aws-sdk-s3` manifests.

use std::time::Duration;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use crate::ports::{ObjectStore, ObjectStoreError};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn connect(endpoint: &str, access_key: &str, secret_key: &str, secure: bool, bucket: impl Into<String>) -> Self {
        let _ = secure;
        let credentials = Credentials::new(access_key, secret_key, None, None, "control-plane");
        let config = aws_sdk_s3::config::Builder::new()
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        S3ObjectStore {
            client: Client::from_conf(config),
            bucket: bucket.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn stat(&self, key: &str) -> Result<Option<String>, ObjectStoreError> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|output| output.content_type().map(str::to_string))
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) {
                    ObjectStoreError::NotFound
                } else {
                    ObjectStoreError::Backend(e.to_string())
                }
            })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str, metadata: Vec<(&'static str, String)>) -> Result<(), ObjectStoreError> {
        let mut request = self.client.put_object().bucket(&self.bucket).key(key).content_type(content_type).body(bytes.into());
        for (name, value) in metadata {
            request = request.metadata(name, value);
        }
        request.send().await.map(|_| ()).map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn presign_get(&self, key: &str, ttl: Duration, content_type: &str, filename: &str) -> Result<String, ObjectStoreError> {
        let presigning_config = PresigningConfig::expires_in(ttl).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        let disposition = format!("attachment; filename=\"{filename}\"");
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_type(content_type)
            .response_content_disposition(disposition)
            .presigned(presigning_config)
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }
}
