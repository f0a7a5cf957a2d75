//! Turns the provider's nested MIME part tree into one human-readable,
//! sanitized body plus display-safe header fields.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::gateway::{
    decode_base64url, header_value, MailboxGateway, MessageHeader, MessagePart, ProviderMessage,
};

pub const NO_READABLE_CONTENT: &str = "(no readable content)";
pub const NO_SUBJECT: &str = "(no subject)";
pub const UNKNOWN_SENDER: &str = "(unknown)";

/// URL schemes allowed to survive body sanitization. `data:` carries resolved
/// inline images; `cid:` keeps unresolved references visible as broken images
/// instead of silently vanishing.
const BODY_URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel", "data", "cid"];

/// Display-ready projection of one message. Created per request, never
/// persisted; recomputing it for the same payload yields identical output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NormalizedMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub body: String,
    pub headers: Vec<MessageHeader>,
    #[serde(rename = "rawMimeBody")]
    pub raw_mime_body: Option<String>,
}

#[derive(Debug, Default)]
struct TraversalState {
    html: Option<String>,
    text: Option<String>,
    images: Vec<InlineImage>,
}

#[derive(Debug)]
struct InlineImage {
    content_id: String,
    mime_type: String,
    source: ImageSource,
}

/// Where an inline image's bytes live: decoded in the main payload, or behind
/// a separate attachment fetch because the provider elided them.
#[derive(Debug)]
enum ImageSource {
    Inline(Vec<u8>),
    AttachmentRef(String),
}

/// Reconstructs a readable message from the provider payload. Best-effort by
/// design: malformed trees and failed image fetches degrade the body, they
/// never fail the whole view. Safe to call concurrently for different
/// messages; the only side effect is the attachment fetch for elided images.
pub async fn reconstruct(
    gateway: &dyn MailboxGateway,
    message: &ProviderMessage,
    raw_mime_body: Option<String>,
) -> NormalizedMessage {
    let headers = message
        .payload
        .as_ref()
        .and_then(|payload| payload.headers.clone())
        .unwrap_or_default();

    let body = match &message.payload {
        Some(payload) => resolve_body(gateway, &message.id, payload).await,
        None => NO_READABLE_CONTENT.to_string(),
    };

    NormalizedMessage {
        id: message.id.clone(),
        subject: sanitize_display(header_value(&headers, "Subject").unwrap_or(NO_SUBJECT)),
        from: sanitize_display(header_value(&headers, "From").unwrap_or(UNKNOWN_SENDER)),
        to: sanitize_display(header_value(&headers, "To").unwrap_or_default()),
        date: display_date(&headers, message.internal_date.as_deref()),
        body,
        headers,
        raw_mime_body,
    }
}

async fn resolve_body(
    gateway: &dyn MailboxGateway,
    message_id: &str,
    payload: &MessagePart,
) -> String {
    // Single-part messages carry body data at the top level; no traversal.
    if let Some(data) = payload.body.as_ref().and_then(|body| body.data.as_deref()) {
        if let Ok(bytes) = decode_base64url(data) {
            return sanitize_body(&String::from_utf8_lossy(&bytes));
        }
    }

    let mut state = TraversalState::default();
    if let Some(parts) = &payload.parts {
        for part in parts {
            collect_parts(part, &mut state);
        }
    }

    let Some(mut body) = state.html.or(state.text) else {
        return NO_READABLE_CONTENT.to_string();
    };

    // All outstanding fetches settle before any substitution runs.
    for (content_id, data_uri) in resolve_inline_images(gateway, message_id, state.images).await {
        body = body.replace(&format!("cid:{content_id}"), &data_uri);
    }

    sanitize_body(&body)
}

fn collect_parts(part: &MessagePart, state: &mut TraversalState) {
    let mime_type = part.mime_type.as_deref().unwrap_or("").to_ascii_lowercase();

    if mime_type.starts_with("image/") {
        if let Some(image) = inline_image_from(part, &mime_type) {
            state.images.push(image);
        }
    } else if let Some(data) = part.body.as_ref().and_then(|body| body.data.as_deref()) {
        if let Ok(bytes) = decode_base64url(data) {
            let decoded = String::from_utf8_lossy(&bytes).into_owned();
            if mime_type == "text/html" {
                // Providers may list several HTML parts; the last one wins.
                state.html = Some(decoded);
            } else if mime_type == "text/plain" && state.html.is_none() && state.text.is_none() {
                state.text = Some(decoded);
            }
        }
    }

    if let Some(children) = &part.parts {
        for child in children {
            collect_parts(child, state);
        }
    }
}

fn inline_image_from(part: &MessagePart, mime_type: &str) -> Option<InlineImage> {
    let headers = part.headers.as_deref().unwrap_or_default();
    let content_id = header_value(headers, "Content-ID")?
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string();
    if content_id.is_empty() {
        return None;
    }

    let body = part.body.as_ref()?;
    let source = if let Some(data) = body.data.as_deref() {
        ImageSource::Inline(decode_base64url(data).ok()?)
    } else if let Some(attachment_id) = &body.attachment_id {
        ImageSource::AttachmentRef(attachment_id.clone())
    } else {
        return None;
    };

    Some(InlineImage {
        content_id,
        mime_type: mime_type.to_string(),
        source,
    })
}

/// Resolves inline images to data URIs. Attachment-referenced siblings fan
/// out concurrently; a failed fetch drops that image only.
async fn resolve_inline_images(
    gateway: &dyn MailboxGateway,
    message_id: &str,
    images: Vec<InlineImage>,
) -> Vec<(String, String)> {
    let fetches = images.into_iter().map(|image| async move {
        let bytes = match image.source {
            ImageSource::Inline(bytes) => Some(bytes),
            ImageSource::AttachmentRef(attachment_id) => {
                match gateway.fetch_attachment(message_id, &attachment_id).await {
                    Ok(bytes) => Some(bytes),
                    Err(error) => {
                        warn!(
                            "inline image fetch failed for cid {} in message {}: {}",
                            image.content_id, message_id, error
                        );
                        None
                    }
                }
            }
        };

        bytes.map(|bytes| {
            let data_uri = format!(
                "data:{};base64,{}",
                image.mime_type,
                STANDARD.encode(&bytes)
            );
            (image.content_id, data_uri)
        })
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

/// Strips executable content (scripts, event handlers) while keeping safe
/// formatting tags and embedded images.
pub(crate) fn sanitize_body(html: &str) -> String {
    let schemes: HashSet<&str> = BODY_URL_SCHEMES.iter().copied().collect();
    ammonia::Builder::default()
        .url_schemes(schemes)
        .clean(html)
        .to_string()
}

/// Header values are displayed as text, never trusted as markup.
pub(crate) fn sanitize_display(raw: &str) -> String {
    ammonia::Builder::default()
        .tags(HashSet::new())
        .clean(raw)
        .to_string()
}

pub(crate) fn display_date(headers: &[MessageHeader], internal_date: Option<&str>) -> String {
    if let Some(date) = header_value(headers, "Date") {
        return date.to_string();
    }

    internal_date
        .and_then(|ms_str| ms_str.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc2822())
        .unwrap_or_default()
}

pub(crate) fn html_entity_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}
