//! services/api/src/adapters/storage.rs
//!
//! The `ObjectStore` port backed by an S3-compatible bucket (AWS or MinIO).

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{config::Credentials, primitives::ByteStream};
use bytes::Bytes;
use study_notes_core::ports::{ObjectStore, PortError, PortResult};
use tracing::info;

use crate::config::Config;

/// Constructs an S3 client configured for MinIO (custom endpoint) or AWS.
pub async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "study-notes-static",
    );

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials);
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    // MinIO serves buckets under the path, not as a subdomain.
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.s3_endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Joins the public base address of the bucket and an object name.
pub fn join_public_url(base: &str, object_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), object_name.trim_start_matches('/'))
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn store(&self, object_name: &str, bytes: Bytes, content_type: Option<&str>) -> PortResult<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_name)
            .body(ByteStream::from(bytes))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("S3 upload failed: {e}")))?;
        info!(size, "Stored s3://{}/{}", self.bucket, object_name);
        Ok(())
    }

    fn public_url(&self, object_name: &str) -> String {
        join_public_url(&self.public_base_url, object_name)
    }

    async fn remove(&self, object_name: &str) -> PortResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_name)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("S3 delete failed: {e}")))?;
        info!("Removed s3://{}/{}", self.bucket, object_name);
        Ok(())
    }
}
