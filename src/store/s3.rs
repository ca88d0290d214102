use crate::config::S3Config;
use crate::error::{AppError, AppResult};
use crate::store::ColdStore;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;

/// Object-storage archive sink. Blobs are immutable once written; a
/// re-upload of the same key is an idempotent overwrite.
#[derive(Clone)]
pub struct S3ColdStore {
    client: Arc<Client>,
    bucket: String,
}

impl S3ColdStore {
    pub fn new(client: Arc<Client>, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ColdStore for S3ColdStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Store(format!("s3 put {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(AppError::Store(format!("s3 get {key}: {service_err}")));
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Store(format!("s3 read {key}: {e}")))?;
        Ok(Some(body.into_bytes().to_vec()))
    }
}
