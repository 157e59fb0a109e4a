//! Image generation and re-hosting.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::application::{
    document::is_http_url,
    generation::{Generator, GeneratorError},
};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Generation(#[from] GeneratorError),
    #[error("`{url}` is not an absolute http(s) URL")]
    InvalidUrl { url: String },
    #[error("failed to fetch `{url}`: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to upload image: {message}")]
    Upload { message: String },
}

/// Image bytes ready to be stored on a publish target.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Storage on a publish target that accepts image uploads.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Store the image and return its public URL.
    async fn upload_image(&self, upload: ImageUpload) -> Result<String, ImageError>;
}

#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Produce a hosted image URL from a text description.
    async fn generate(&self, alt_text: &str) -> Result<String, ImageError>;

    /// Copy `source_url` onto `host`. Failures are logged and yield `None`.
    async fn rehost(&self, source_url: &str, host: &dyn ImageHost) -> Option<String>;
}

pub struct HttpImageResolver {
    generator: Arc<dyn Generator>,
    http: reqwest::Client,
}

impl HttpImageResolver {
    pub fn new(generator: Arc<dyn Generator>, http: reqwest::Client) -> Self {
        Self { generator, http }
    }

    async fn download(&self, source_url: &str) -> Result<ImageUpload, ImageError> {
        let url = Url::parse(source_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ImageError::InvalidUrl {
                url: source_url.to_string(),
            })?;

        let fetch_error = |message: String| ImageError::Fetch {
            url: source_url.to_string(),
            message,
        };

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| fetch_error(err.to_string()))?;

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty() && value != "application/octet-stream");

        let bytes = response
            .bytes()
            .await
            .map_err(|err| fetch_error(err.to_string()))?;

        Ok(ImageUpload {
            file_name: file_name_for(&url),
            content_type: header_type.unwrap_or_else(|| content_type_for(&url)),
            bytes,
        })
    }
}

#[async_trait]
impl ImageResolver for HttpImageResolver {
    async fn generate(&self, alt_text: &str) -> Result<String, ImageError> {
        let url = self.generator.generate_image(alt_text).await?;
        if !is_http_url(&url) {
            return Err(ImageError::InvalidUrl { url });
        }
        Ok(url)
    }

    async fn rehost(&self, source_url: &str, host: &dyn ImageHost) -> Option<String> {
        let outcome = match self.download(source_url).await {
            Ok(upload) => host.upload_image(upload).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(hosted) => {
                debug!(
                    target = "application::images::rehost",
                    source_url,
                    hosted_url = hosted.as_str(),
                    "image rehosted"
                );
                Some(hosted)
            }
            Err(err) => {
                warn!(
                    target = "application::images::rehost",
                    source_url,
                    error = %err,
                    "image rehost failed; leaving source URL in place"
                );
                None
            }
        }
    }
}

fn file_name_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "image".to_string())
}

fn content_type_for(url: &Url) -> String {
    mime_guess::from_path(url.path())
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
