use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::config::StorageConfig;

/// Where uploaded recipe images live. Keys are the paths derived in
/// `recipes::images`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Time-limited GET url for `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String>;
}

/// S3-compatible bucket (MinIO in development).
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
}

impl S3ImageStore {
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            cfg.access_key.as_str(),
            cfg.secret_key.as_str(),
            None,
            None,
            "recipebox-env",
        );
        let sdk = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(cfg.endpoint.as_str())
            .load()
            .await;

        // MinIO only serves path-style bucket urls
        let s3 = S3ConfigBuilder::from(&sdk)
            .endpoint_url(cfg.endpoint.as_str())
            .force_path_style(true)
            .build();

        debug!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "image store configured");
        Ok(Self {
            client: Client::from_conf(s3),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {} to bucket {}", key, self.bucket))?;
        debug!(%key, size, "image uploaded");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete {} from bucket {}", key, self.bucket))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(ttl).context("presign ttl")?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("presign {}", key))?;
        Ok(request.uri().to_string())
    }
}
