//! OpenAI-compatible text and image generation.

use async_trait::async_trait;
use reqwest::{Client, Response, Url, header::AUTHORIZATION};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::application::generation::{Generator, GeneratorError};

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_url: String,
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub image_size: String,
}

#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    base: Url,
    settings: OpenAiSettings,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImageGeneration {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(client: Client, settings: OpenAiSettings) -> Result<Self, GeneratorError> {
        let base = Url::parse(&format!("{}/", settings.api_url.trim_end_matches('/')))
            .map_err(|err| GeneratorError::Request {
                message: format!("invalid generator api_url: {err}"),
            })?;
        Ok(Self {
            client,
            base,
            settings,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GeneratorError> {
        let url = self.base.join(path).map_err(|err| GeneratorError::Request {
            message: err.to_string(),
        })?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| GeneratorError::Request {
                message: err.to_string(),
            })?;

        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, GeneratorError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| GeneratorError::Request {
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| GeneratorError::Request {
            message: format!("failed to parse generator response: {err}"),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String, GeneratorError> {
        let completion: ChatCompletion = self
            .post(
                "chat/completions",
                json!({
                    "model": self.settings.text_model,
                    "messages": [{ "role": "user", "content": prompt }],
                }),
            )
            .await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GeneratorError::EmptyResponse)
    }

    async fn generate_image(&self, description: &str) -> Result<String, GeneratorError> {
        let generation: ImageGeneration = self
            .post(
                "images/generations",
                json!({
                    "model": self.settings.image_model,
                    "prompt": description,
                    "n": 1,
                    "size": self.settings.image_size,
                }),
            )
            .await?;

        generation
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or(GeneratorError::EmptyResponse)
    }
}
