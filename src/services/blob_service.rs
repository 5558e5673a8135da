use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::BlobConfig;
use crate::error::{Error, Result};

/// Folder that answer images are uploaded into on the blob host.
pub const ANSWER_IMAGE_FOLDER: &str = "exam-answers";

/// Remote store of uploaded answer images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn destroy(&self, public_id: &str) -> Result<()>;
}

/// Signed destroy calls against a Cloudinary-style upload API.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    api_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpBlobStore {
    pub fn new(client: Client, api_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    /// Builds the store when the api url and both credentials are configured.
    pub fn from_config(client: Client, blob: &BlobConfig) -> Option<Self> {
        match (&blob.api_url, &blob.api_key, &blob.api_secret) {
            (Some(url), Some(key), Some(secret)) => {
                Some(Self::new(client, url.clone(), key.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

fn sign(public_id: &str, timestamp: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("public_id={}&timestamp={}{}", public_id, timestamp, secret));
    hex::encode(hasher.finalize())
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn destroy(&self, public_id: &str) -> Result<()> {
        let timestamp = Utc::now().timestamp();
        let signature = sign(public_id, timestamp, &self.api_secret);
        let timestamp = timestamp.to_string();

        let resp = self
            .client
            .post(format!("{}/image/destroy", self.api_url))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() || body["result"].as_str() != Some("ok") {
            return Err(Error::Internal(format!(
                "blob destroy of '{}' failed with {}: {}",
                public_id, status, body
            )));
        }
        tracing::debug!(public_id, "blob destroyed");
        Ok(())
    }
}

/// Used when blob credentials are absent.
#[derive(Clone, Copy, Default)]
pub struct NoopBlobStore;

#[async_trait]
impl BlobStore for NoopBlobStore {
    async fn destroy(&self, public_id: &str) -> Result<()> {
        tracing::debug!(public_id, "blob store not configured; skipping destroy");
        Ok(())
    }
}

/// Derives the host-side public id from a hosted image url.
///
/// `https://res.cloudinary.com/demo/image/upload/v1/exam-answers/ab12.png` yields
/// `exam-answers/ab12`. Urls on other hosts yield `None`.
pub fn public_id_from_url(image_url: &str, host: &str) -> Option<String> {
    let url = Url::parse(image_url).ok()?;
    let url_host = url.host_str()?;
    if !(url_host == host || url_host.ends_with(&format!(".{}", host))) {
        return None;
    }

    let path = url.path();
    let file = path.rsplit('/').next().filter(|f| !f.is_empty())?;
    let stem = match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    };

    let marker = format!("/{}/", ANSWER_IMAGE_FOLDER);
    match path.find(&marker) {
        Some(idx) => {
            let dir_end = path.rfind('/').unwrap_or(path.len());
            let folder = &path[idx + 1..dir_end];
            Some(format!("{}/{}", folder, stem))
        }
        None => Some(stem.to_string()),
    }
}
