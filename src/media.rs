use std::path::{Path, PathBuf};

use axum_typed_multipart::FieldData;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::AppError;

/// Directory where uploads are staged before being pushed to the media host.
pub const TEMP_MEDIA_DIR: &str = "public/temp";

#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("Failed to read staged file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Media host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid asset identifier: {0}")]
    Url(#[from] url::ParseError),
    #[error("Media host rejected the request: {0}")]
    Rejected(reqwest::StatusCode),
}

/// A durable asset on the media host.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub url: String,
    pub public_id: String,
    pub duration: Option<f64>,
}

/// Client for the media-hosting API. Constructed once in `main` and handed
/// to handlers through the shared state.
#[derive(Clone, Debug)]
pub struct MediaClient {
    http_client: Client,
    upload_url: Url,
    asset_url: Url,
    api_key: Secret<String>,
}

impl MediaClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        let base = Url::parse(&base_url)?;
        Ok(Self {
            http_client: Client::new(),
            upload_url: base.join("upload")?,
            asset_url: base.join("assets/")?,
            api_key: Secret::new(api_key),
        })
    }

    #[tracing::instrument(name = "Upload media file", skip(self, file), fields(file_name = %file.file_name()))]
    pub async fn upload(&self, file: &TempMedia) -> Result<MediaAsset, MediaError> {
        let contents = tokio::fs::read(file.path()).await?;
        let part = Part::bytes(contents).file_name(file.file_name().to_owned());
        let form = Form::new()
            .part("file", part)
            .text("resource_type", "auto");

        let response = self
            .http_client
            .post(self.upload_url.clone())
            .header("api-key", self.api_key.expose_secret().to_owned())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::error!("Media host rejected upload with status {}", response.status());
            return Err(MediaError::Rejected(response.status()));
        }

        let asset = response.json::<MediaAsset>().await?;
        tracing::info!("Uploaded media asset {}", asset.public_id);
        Ok(asset)
    }

    #[tracing::instrument(name = "Delete media asset", skip(self))]
    pub async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let url = self.asset_url.join(public_id)?;
        let response = self
            .http_client
            .delete(url)
            .header("api-key", self.api_key.expose_secret().to_owned())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Rejected(response.status()));
        }
        Ok(())
    }
}

/// A file staged on local disk for upload. The file is removed when the
/// value drops, so release happens on the success and failure paths alike.
pub struct TempMedia {
    path: PathBuf,
    file_name: String,
}

impl TempMedia {
    pub async fn stage(file_name: Option<String>, contents: Bytes) -> Result<Self, AppError> {
        // Client-supplied names must not traverse out of the staging dir.
        let file_name = file_name
            .unwrap_or_else(|| "upload.bin".to_string())
            .replace(['/', '\\'], "_");

        tokio::fs::create_dir_all(TEMP_MEDIA_DIR).await.map_err(|e| {
            AppError::Unexpected(
                anyhow::Error::new(e).context("Failed to create temp media directory"),
            )
        })?;

        let path = Path::new(TEMP_MEDIA_DIR).join(format!("{}-{}", Uuid::new_v4(), file_name));
        tokio::fs::write(&path, &contents).await.map_err(|e| {
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to stage uploaded file"))
        })?;

        Ok(Self { path, file_name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for TempMedia {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "Failed to remove staged file {}: {:?}",
                self.path.display(),
                e
            );
        }
    }
}

/// Stages an uploaded form field and pushes it to the media host. Upload
/// failures surface as 400s; the staged file is unlinked either way.
pub async fn stage_and_upload(
    client: &MediaClient,
    upload: FieldData<Bytes>,
    label: &str,
) -> Result<MediaAsset, AppError> {
    let file = TempMedia::stage(upload.metadata.file_name, upload.contents).await?;
    client.upload(&file).await.map_err(|e| {
        tracing::error!("{} upload failed: {:?}", label, e);
        AppError::Validation(format!("{} upload failed", label))
    })
}
