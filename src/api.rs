//! Operation layer tying the store, the gateway and the classifier together.
//! Each function is one user-facing operation with its response contract;
//! callers only choose how to render the result.

use serde::Serialize;
use tracing::warn;

use crate::classify::{classifier_input, ClassificationVerdict, ClassifierClient, Verdict};
use crate::crypto::CredentialCipher;
use crate::db::models::User;
use crate::db::Database;
use crate::error::PipelineError;
use crate::gateway::{MailboxGateway, MessageHeader};
use crate::hidden;
use crate::listing::{self, MessageSummary};
use crate::reconstruct::{self, NormalizedMessage};

#[derive(Debug, Serialize)]
pub struct EmailListResponse {
    pub emails: Vec<MessageSummary>,
}

/// Header fields plus the reconstructed body, without the raw MIME dump.
#[derive(Debug, Serialize)]
pub struct MessageBasic {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessageViewResponse {
    pub basic: MessageBasic,
    pub headers: Vec<MessageHeader>,
    #[serde(rename = "rawMimeBody")]
    pub raw_mime_body: Option<String>,
}

impl From<NormalizedMessage> for MessageViewResponse {
    fn from(message: NormalizedMessage) -> Self {
        Self {
            basic: MessageBasic {
                id: message.id,
                subject: message.subject,
                from: message.from,
                to: message.to,
                date: message.date,
                body: message.body,
            },
            headers: message.headers,
            raw_mime_body: message.raw_mime_body,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Loads and decrypts the user's stored refresh token. Absence and
/// undecryptability are distinct conditions; the caller's remedy differs
/// (connect a mailbox vs. re-connect it).
pub fn resolve_refresh_token(
    db: &Database,
    cipher: &CredentialCipher,
    user: &User,
) -> Result<String, PipelineError> {
    let stored = db
        .get_credential(user.id)?
        .ok_or(PipelineError::CredentialMissing)?;
    Ok(cipher.decrypt(&stored.refresh_token_enc)?)
}

/// Default inbox view: pages the mailbox until `count` unhidden messages are
/// found, then returns their display summaries.
pub async fn list_inbox(
    gateway: &dyn MailboxGateway,
    db: &Database,
    user: &User,
    count: usize,
) -> Result<EmailListResponse, PipelineError> {
    let hidden_ids = hidden::list_hidden(db, user)?;
    let emails = listing::list_visible(gateway, &hidden_ids, count).await?;
    Ok(EmailListResponse { emails })
}

/// Full reconstructed view of one message. The structured payload and the raw
/// RFC 822 bytes are independent provider calls, so they run concurrently; a
/// failed raw fetch degrades to an absent raw body rather than failing the
/// view. Hidden status is not consulted: a direct fetch by ID always works.
pub async fn view_message(
    gateway: &dyn MailboxGateway,
    id: &str,
) -> Result<MessageViewResponse, PipelineError> {
    let (full, raw) = tokio::join!(gateway.fetch_full(id), gateway.fetch_raw(id));
    let message = full?;

    let raw_mime_body = match raw {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) => {
            warn!("raw view unavailable for {}: {}", id, error);
            None
        }
    };

    let message = reconstruct::reconstruct(gateway, &message, raw_mime_body).await;
    Ok(message.into())
}

/// On-demand phishing scan: reconstruct the message the same way the view
/// does, collapse the body to plain text, and ask the external scorer.
pub async fn scan_message(
    gateway: &dyn MailboxGateway,
    classifier: &ClassifierClient,
    id: &str,
) -> Result<ScanResponse, PipelineError> {
    let full = gateway.fetch_full(id).await?;
    let message = reconstruct::reconstruct(gateway, &full, None).await;

    let text = scan_text(&message);
    let ClassificationVerdict {
        verdict,
        confidence,
        details,
    } = classifier.classify(&text).await?;

    Ok(ScanResponse {
        id: id.to_string(),
        verdict,
        confidence,
        details,
    })
}

/// Subject and sender are strong phishing signals, so they prefix the body.
fn scan_text(message: &NormalizedMessage) -> String {
    classifier_input(&format!(
        "Subject: {}\nFrom: {}\n\n{}",
        message.subject, message.from, message.body
    ))
}
