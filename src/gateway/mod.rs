use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub mod gmail;

pub use gmail::{AccessTokenBroker, GmailGateway, OAuthConfig};

/// One provider round trip worth of message IDs. An absent `next_page_token`
/// means the mailbox is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// The provider's raw message object. Read-only input to the reconstructor;
/// never mutated after deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub snippet: Option<String>,
    pub payload: Option<MessagePart>,
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
}

/// One node of the nested MIME part tree: a leaf carries body data (inline or
/// as an attachment reference), a multipart node carries `parts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Option<Vec<MessageHeader>>,
    pub body: Option<PartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    pub size: Option<u64>,
    pub data: Option<String>,
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,
}

/// Capability set the pipeline needs from the mail provider, scoped to the
/// current authenticated mailbox owner. Injected everywhere so tests can
/// substitute a scripted double.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    async fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage, PipelineError>;

    /// Full payload tree, for reconstruction.
    async fn fetch_full(&self, id: &str) -> Result<ProviderMessage, PipelineError>;

    /// Headers and snippet only, for listing summaries.
    async fn fetch_metadata(&self, id: &str) -> Result<ProviderMessage, PipelineError>;

    /// Decoded RFC 822 bytes of the same message, for the diagnostic raw view.
    async fn fetch_raw(&self, id: &str) -> Result<Vec<u8>, PipelineError>;

    /// Bytes of a part the provider elided from the main payload.
    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, PipelineError>;

    /// Drops any cached access token so the next call re-authenticates.
    /// Doubles and token-less gateways keep the default no-op.
    async fn refresh_auth(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Decorator applying the caller-side auth policy: a single
/// refresh-and-retry on `Unauthorized`, no retry on anything else.
pub struct AuthRetryGateway<G> {
    inner: G,
}

impl<G: MailboxGateway> AuthRetryGateway<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    async fn retried<T>(
        &self,
        first: Result<T, PipelineError>,
        retry: impl std::future::Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        match first {
            Err(PipelineError::Unauthorized) => {
                self.inner.refresh_auth().await?;
                retry.await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<G: MailboxGateway> MailboxGateway for AuthRetryGateway<G> {
    async fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage, PipelineError> {
        let first = self.inner.list_page(page_token).await;
        self.retried(first, self.inner.list_page(page_token)).await
    }

    async fn fetch_full(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        let first = self.inner.fetch_full(id).await;
        self.retried(first, self.inner.fetch_full(id)).await
    }

    async fn fetch_metadata(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        let first = self.inner.fetch_metadata(id).await;
        self.retried(first, self.inner.fetch_metadata(id)).await
    }

    async fn fetch_raw(&self, id: &str) -> Result<Vec<u8>, PipelineError> {
        let first = self.inner.fetch_raw(id).await;
        self.retried(first, self.inner.fetch_raw(id)).await
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let first = self.inner.fetch_attachment(message_id, attachment_id).await;
        self.retried(first, self.inner.fetch_attachment(message_id, attachment_id))
            .await
    }

    async fn refresh_auth(&self) -> Result<(), PipelineError> {
        self.inner.refresh_auth().await
    }
}

/// Provider body data is base64url; some responses pad, some don't.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>, PipelineError> {
    URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .map_err(|e| PipelineError::MalformedPayload(format!("base64url body data: {e}")))
}

pub fn header_value<'a>(headers: &'a [MessageHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}
