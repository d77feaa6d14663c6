//! Client for the artifact fileserver (QCM JSON uploads).

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::core::errors::ApiError;
use crate::core::settings::FileserverSettings;

#[derive(Clone)]
pub struct FileserverClient {
    settings: FileserverSettings,
    client: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    download_url: String,
}

impl FileserverClient {
    pub fn new(settings: FileserverSettings) -> Self {
        Self {
            settings,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Upload a JSON artifact and return its public download URL. The file
    /// is addressed by a truncated content hash, so identical artifacts
    /// dedupe server-side.
    pub async fn upload_json(
        &self,
        payload: &serde_json::Value,
        name_hint: &str,
    ) -> Result<String, ApiError> {
        let body = serde_json::to_string_pretty(payload).map_err(ApiError::internal)?;
        let hash = format!("{:x}", Sha256::digest(body.as_bytes()));
        let content_hash = &hash[..16];

        let safe_hint: String = name_hint
            .chars()
            .take(20)
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();

        let form = Form::new()
            .part(
                "file",
                Part::bytes(body.into_bytes())
                    .file_name(format!("qcm_{safe_hint}.json"))
                    .mime_str("application/json")
                    .map_err(ApiError::internal)?,
            )
            .text("custom_hash", content_hash.to_string())
            .text("extension", "json");

        let url = format!("{}/upload", self.settings.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Fileserver upload failed ({status}): {text}"
            )));
        }

        let upload: UploadResponse = res.json().await.map_err(ApiError::internal)?;
        Ok(format!(
            "{}{}",
            self.settings.public_base_url().trim_end_matches('/'),
            upload.download_url
        ))
    }
}
