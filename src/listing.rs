//! Pages through the mailbox until enough unhidden messages are found, then
//! builds lightweight display summaries for exactly that set.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::error::PipelineError;
use crate::gateway::{header_value, MailboxGateway, ProviderMessage};
use crate::reconstruct::{
    display_date, html_entity_decode, sanitize_display, NO_SUBJECT, UNKNOWN_SENDER,
};

/// How many visible messages a listing returns by default.
pub const DEFAULT_VISIBLE_COUNT: usize = 25;

/// Display-safe projection for listings. Derived per request, never cached.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
}

/// Returns at most `target` summaries, none of which are in `hidden` at call
/// time. Pages sequentially (each page token depends on the previous page)
/// and stops as soon as the quota is met, a page comes back empty, or the
/// mailbox is exhausted — so it terminates even when everything is hidden.
pub async fn list_visible(
    gateway: &dyn MailboxGateway,
    hidden: &HashSet<String>,
    target: usize,
) -> Result<Vec<MessageSummary>, PipelineError> {
    let mut survivors: Vec<String> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = gateway.list_page(page_token.as_deref()).await?;
        if page.ids.is_empty() {
            break;
        }

        survivors.extend(page.ids.into_iter().filter(|id| !hidden.contains(id)));

        // A filtered page may overshoot; trimmed below.
        if survivors.len() >= target {
            break;
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    survivors.truncate(target);
    build_summaries(gateway, survivors).await
}

/// Metadata fetches for the final visible set are independent, so they fan
/// out concurrently. A single bad message is skipped rather than failing the
/// listing; an auth failure aborts it.
async fn build_summaries(
    gateway: &dyn MailboxGateway,
    ids: Vec<String>,
) -> Result<Vec<MessageSummary>, PipelineError> {
    let fetches = ids.iter().map(|id| gateway.fetch_metadata(id));
    let results = join_all(fetches).await;

    let mut summaries = Vec::with_capacity(ids.len());
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(message) => summaries.push(summary_from(&message)),
            Err(PipelineError::Unauthorized) => return Err(PipelineError::Unauthorized),
            Err(error) => {
                warn!("skipping listed message {}: {}", id, error);
            }
        }
    }

    Ok(summaries)
}

fn summary_from(message: &ProviderMessage) -> MessageSummary {
    let headers = message
        .payload
        .as_ref()
        .and_then(|payload| payload.headers.as_deref())
        .unwrap_or_default();

    MessageSummary {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        subject: sanitize_display(header_value(headers, "Subject").unwrap_or(NO_SUBJECT)),
        from: sanitize_display(header_value(headers, "From").unwrap_or(UNKNOWN_SENDER)),
        date: display_date(headers, message.internal_date.as_deref()),
        snippet: html_entity_decode(&sanitize_display(
            message.snippet.as_deref().unwrap_or_default(),
        )),
    }
}
