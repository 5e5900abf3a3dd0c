// src/storage/gcs.rs
use anyhow::{bail, Context, Result};
use google_cloud_storage::{
    client::{Client, ClientConfig},
    http::objects::{
        delete::DeleteObjectRequest,
        download::Range,
        get::GetObjectRequest,
        list::ListObjectsRequest,
        upload::{Media, UploadObjectRequest, UploadType},
    },
};
use tracing::{debug, info, instrument};

/// Google Cloud Storage backend, authenticated with Application Default Credentials.
pub struct GcsStore {
    client: Client,
}

impl GcsStore {
    pub async fn connect() -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating to GCS")?;
        info!("GCS client ready");
        Ok(Self {
            client: Client::new(config),
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };
        let bytes = self
            .client
            .download_object(&request, &Range::default())
            .await
            .with_context(|| format!("downloading gs://{}/{}", bucket, key))?;
        debug!(bytes = bytes.len(), "downloaded object");
        Ok(bytes)
    }

    #[instrument(level = "debug", skip(self, data), fields(bytes = data.len()))]
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let mut media = Media::new(key.to_string());
        media.content_type = content_type.to_string().into();
        let upload_type = UploadType::Simple(media);
        let request = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        self.client
            .upload_object(&request, data, &upload_type)
            .await
            .with_context(|| format!("uploading gs://{}/{}", bucket, key))?;
        Ok(())
    }

    /// Delete the object named `key` and every object under `key/`.
    ///
    /// An empty key would mean the whole bucket and is refused.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_prefix(&self, bucket: &str, key: &str) -> Result<usize> {
        let key = key.trim_end_matches('/');
        if key.is_empty() {
            bail!("refusing to delete every object in gs://{}", bucket);
        }

        // one listing on the bare key covers both the exact object and `key/...`,
        // but also siblings such as `key-old`, which are filtered out below
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let request = ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: Some(key.to_string()),
                page_token: page_token.take(),
                ..Default::default()
            };
            let page = self
                .client
                .list_objects(&request)
                .await
                .with_context(|| format!("listing gs://{}/{}", bucket, key))?;
            names.extend(
                page.items
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| o.name)
                    .filter(|name| is_under(key, name)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        for name in &names {
            let request = DeleteObjectRequest {
                bucket: bucket.to_string(),
                object: name.clone(),
                ..Default::default()
            };
            self.client
                .delete_object(&request)
                .await
                .with_context(|| format!("deleting gs://{}/{}", bucket, name))?;
            debug!(object = %name, "deleted");
        }
        Ok(names.len())
    }
}

/// `name` is the object `key` itself or lives under `key/`.
fn is_under(key: &str, name: &str) -> bool {
    match name.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
