//! Ghost Admin API client.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{
    Client, RequestBuilder, Response, StatusCode, Url,
    header::AUTHORIZATION,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    application::{
        images::{ImageError, ImageHost, ImageUpload},
        publish::{CmsClient, CmsError, CmsPost, CmsPostReceipt},
    },
    domain::targets::CmsTarget,
};

/// Admin tokens are valid for five minutes.
const TOKEN_TTL_SECONDS: i64 = 5 * 60;
const TOKEN_AUDIENCE: &str = "/admin/";

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    iat: i64,
    exp: i64,
    aud: String,
}

#[derive(Deserialize)]
struct PostsEnvelope {
    posts: Vec<PostRecord>,
}

#[derive(Deserialize)]
struct PostRecord {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ImagesEnvelope {
    images: Vec<ImageRecord>,
}

#[derive(Deserialize)]
struct ImageRecord {
    url: String,
}

/// Session against one Ghost site, authenticated with an `id:secret` admin key.
pub struct GhostClient {
    client: Client,
    admin_base: Url,
    key_id: String,
    secret: Vec<u8>,
}

impl GhostClient {
    pub fn new(client: Client, target: &CmsTarget) -> Result<Self, CmsError> {
        let (key_id, secret_hex) =
            target
                .api_key
                .split_once(':')
                .ok_or_else(|| CmsError::Credentials {
                    message: "admin key must look like `<id>:<secret>`".to_string(),
                })?;
        let secret = hex::decode(secret_hex).map_err(|err| CmsError::Credentials {
            message: format!("admin key secret is not hex: {err}"),
        })?;

        let admin_base = Url::parse(&format!(
            "{}/ghost/api/admin/",
            target.api_url.trim_end_matches('/')
        ))
        .map_err(|err| CmsError::Credentials {
            message: format!("invalid cms api_url: {err}"),
        })?;

        Ok(Self {
            client,
            admin_base,
            key_id: key_id.to_string(),
            secret,
        })
    }

    fn token(&self) -> Result<String, CmsError> {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AdminClaims {
            iat,
            exp: iat + TOKEN_TTL_SECONDS,
            aud: TOKEN_AUDIENCE.to_string(),
        };
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &EncodingKey::from_secret(&self.secret)).map_err(|err| {
            CmsError::Credentials {
                message: format!("failed to sign admin token: {err}"),
            }
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CmsError> {
        self.admin_base
            .join(path)
            .map_err(|err| CmsError::Unreachable {
                message: err.to_string(),
            })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CmsError> {
        let response = request
            .header(AUTHORIZATION, format!("Ghost {}", self.token()?))
            .send()
            .await
            .map_err(|err| CmsError::Unreachable {
                message: err.to_string(),
            })?;
        handle(response).await
    }
}

async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, CmsError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| CmsError::Unreachable {
        message: err.to_string(),
    })?;
    let body = || String::from_utf8_lossy(&bytes).into_owned();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(CmsError::Unauthorized { message: body() })
        }
        status if !status.is_success() => Err(CmsError::Rejected {
            status: status.as_u16(),
            body: body(),
        }),
        _ => serde_json::from_slice(&bytes).map_err(|err| CmsError::Decode {
            message: err.to_string(),
        }),
    }
}

#[async_trait]
impl ImageHost for GhostClient {
    async fn upload_image(&self, upload: ImageUpload) -> Result<String, ImageError> {
        let upload_error = |err: CmsError| ImageError::Upload {
            message: err.to_string(),
        };

        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(|err| ImageError::Upload {
                message: err.to_string(),
            })?;
        let form = Form::new().part("file", part).text("purpose", "image");

        let url = self.endpoint("images/upload/").map_err(upload_error)?;
        let envelope: ImagesEnvelope = self
            .send(self.client.post(url).multipart(form))
            .await
            .map_err(upload_error)?;

        envelope
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or_else(|| ImageError::Upload {
                message: "cms returned no image".to_string(),
            })
    }
}

#[async_trait]
impl CmsClient for GhostClient {
    async fn create_post(&self, post: CmsPost) -> Result<CmsPostReceipt, CmsError> {
        let mut url = self.endpoint("posts/")?;
        url.query_pairs_mut().append_pair("source", "html");

        let body = json!({
            "posts": [{
                "title": post.title,
                "html": post.html,
                "feature_image": post.feature_image,
                "status": "published",
            }]
        });

        let envelope: PostsEnvelope = self.send(self.client.post(url).json(&body)).await?;
        envelope
            .posts
            .into_iter()
            .next()
            .map(|record| CmsPostReceipt {
                id: record.id,
                url: record.url,
            })
            .ok_or_else(|| CmsError::Decode {
                message: "cms returned no post".to_string(),
            })
    }

    fn as_image_host(&self) -> &dyn ImageHost {
        self
    }
}
