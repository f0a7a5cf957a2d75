use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::PipelineError;
use crate::gateway::{decode_base64url, MailboxGateway, MessagePage, ProviderMessage};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE_ENV: &str = "LUREBOX_GMAIL_API_BASE";
const TOKEN_URL_ENV: &str = "LUREBOX_GMAIL_TOKEN_URL";
const CLIENT_ID_ENV: &str = "LUREBOX_GMAIL_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "LUREBOX_GMAIL_CLIENT_SECRET";

/// Provider-chosen page size for messages.list.
const LIST_PAGE_SIZE: usize = 25;
const TOKEN_SKEW_SECONDS: i64 = 60;
const REDACTED_BODY_MAX_LEN: usize = 200;

/// No timeout is part of the provider contract, so the gateway imposes its
/// own: short for listings and metadata, longer for full bodies and blobs.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const CONTENT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let client_id = require_env(CLIENT_ID_ENV)?;
        let client_secret = require_env(CLIENT_SECRET_ENV)?;
        let token_url = optional_env(TOKEN_URL_ENV).unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string());
        Ok(Self {
            client_id,
            client_secret,
            token_url,
        })
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    optional_env(name).ok_or_else(|| anyhow::anyhow!("missing {name} in environment"))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges the user's decrypted refresh token for short-lived access
/// tokens, caching each one in memory until shortly before expiry. The
/// refresh token itself never leaves this struct and is never logged.
pub struct AccessTokenBroker {
    http: Client,
    config: OAuthConfig,
    refresh_token: String,
    cached: Mutex<Option<CachedAccessToken>>,
}

impl AccessTokenBroker {
    pub fn new(http: Client, config: OAuthConfig, refresh_token: String) -> Self {
        Self {
            http,
            config,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, PipelineError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedAccessToken, PipelineError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(METADATA_TIMEOUT)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("oauth token endpoint", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("oauth token response", e))?;

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            // Revoked or expired refresh token: the stored credential is dead.
            warn!(
                "token refresh rejected: status={} body={}",
                status,
                redact_response_body(&body)
            );
            return Err(PipelineError::CredentialInvalid);
        }
        if !status.is_success() {
            return Err(PipelineError::UpstreamUnavailable(format!(
                "token refresh failed: status={status}"
            )));
        }

        let payload: OAuthTokenResponse = serde_json::from_str(&body).map_err(|e| {
            PipelineError::UpstreamUnavailable(format!("decode token response: {e}"))
        })?;
        let expires_at = Utc::now()
            + ChronoDuration::seconds((payload.expires_in as i64).saturating_sub(TOKEN_SKEW_SECONDS));

        Ok(CachedAccessToken {
            access_token: payload.access_token,
            expires_at,
        })
    }
}

/// Gmail REST implementation of the gateway. One provider round trip per
/// method, no internal retries; auth policy lives in `AuthRetryGateway`.
pub struct GmailGateway {
    http: Client,
    base_url: String,
    broker: AccessTokenBroker,
}

impl GmailGateway {
    pub fn new(http: Client, broker: AccessTokenBroker) -> Self {
        let base_url = optional_env(API_BASE_ENV).unwrap_or_else(|| GMAIL_API_BASE.to_string());
        Self::with_base_url(http, broker, base_url)
    }

    pub fn with_base_url(http: Client, broker: AccessTokenBroker, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            broker,
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
        resource: &str,
    ) -> Result<String, PipelineError> {
        let token = self.broker.access_token().await?;
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header("accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(resource, e))?;

        read_provider_response(response, resource).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
        resource: &str,
    ) -> Result<T, PipelineError> {
        let body = self.get(url, query, timeout, resource).await?;
        serde_json::from_str(&body)
            .map_err(|e| PipelineError::MalformedPayload(format!("decode {resource}: {e}")))
    }
}

async fn read_provider_response(
    response: Response,
    resource: &str,
) -> Result<String, PipelineError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(resource, e))?;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PipelineError::Unauthorized),
        StatusCode::NOT_FOUND => Err(PipelineError::NotFound(resource.to_string())),
        status if status.is_success() => Ok(body),
        status => {
            warn!(
                "provider request failed: resource={} status={} body={}",
                resource,
                status,
                redact_response_body(&body)
            );
            Err(PipelineError::UpstreamUnavailable(format!(
                "{resource}: status={status}"
            )))
        }
    }
}

fn transport_error(resource: &str, error: reqwest::Error) -> PipelineError {
    if error.is_timeout() {
        PipelineError::UpstreamTimeout(resource.to_string())
    } else {
        PipelineError::UpstreamUnavailable(format!("{resource}: {error}"))
    }
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= REDACTED_BODY_MAX_LEN)
            .last()
            .unwrap_or(0);
        format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len())
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageStub>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: Option<String>,
}

#[async_trait]
impl MailboxGateway for GmailGateway {
    async fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage, PipelineError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let max_results = LIST_PAGE_SIZE.to_string();
        // reqwest percent-encodes the values; page tokens are opaque.
        let mut query: Vec<(&str, &str)> = vec![("maxResults", &max_results)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let list: MessageList = self
            .get_json(&url, &query, METADATA_TIMEOUT, "message list")
            .await?;
        Ok(MessagePage {
            ids: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|stub| stub.id)
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn fetch_full(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);
        self.get_json(&url, &[("format", "full")], CONTENT_TIMEOUT, id)
            .await
    }

    async fn fetch_metadata(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);
        self.get_json(&url, &[("format", "metadata")], METADATA_TIMEOUT, id)
            .await
    }

    async fn fetch_raw(&self, id: &str) -> Result<Vec<u8>, PipelineError> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);
        let message: RawMessage = self
            .get_json(&url, &[("format", "raw")], CONTENT_TIMEOUT, id)
            .await?;
        let raw = message
            .raw
            .ok_or_else(|| PipelineError::MalformedPayload(format!("{id}: raw body missing")))?;
        decode_base64url(&raw)
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let url = format!(
            "{}/users/me/messages/{message_id}/attachments/{attachment_id}",
            self.base_url
        );
        let body: AttachmentBody = self
            .get_json(&url, &[], CONTENT_TIMEOUT, attachment_id)
            .await?;
        let data = body.data.ok_or_else(|| {
            PipelineError::MalformedPayload(format!("{attachment_id}: attachment data missing"))
        })?;
        decode_base64url(&data)
    }

    async fn refresh_auth(&self) -> Result<(), PipelineError> {
        self.broker.invalidate().await;
        Ok(())
    }
}
