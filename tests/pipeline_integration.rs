use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use lurebox::api;
use lurebox::classify::ClassifierClient;
use lurebox::db::Database;
use lurebox::error::PipelineError;
use lurebox::gateway::{MailboxGateway, MessagePage, ProviderMessage};
use lurebox::hidden;
use uuid::Uuid;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("lurebox-pipeline-it-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp test root");
    root
}

fn b64(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

/// Fixed five-message mailbox with full HTML bodies, served from memory.
struct ScriptedMailbox {
    messages: HashMap<String, serde_json::Value>,
    order: Vec<String>,
}

impl ScriptedMailbox {
    fn new() -> Self {
        let mut messages = HashMap::new();
        let mut order = Vec::new();
        for n in 1..=5 {
            let id = format!("m{n}");
            let body = b64(&format!(
                "<p>Message {n}: please <a href=\"https://example.com\">review</a></p>\
                 <script>alert('x')</script>"
            ));
            messages.insert(
                id.clone(),
                json!({
                    "id": id,
                    "threadId": format!("t-{id}"),
                    "snippet": format!("snippet {n}"),
                    "payload": {
                        "mimeType": "multipart/alternative",
                        "headers": [
                            {"name": "Subject", "value": format!("Invoice {n}")},
                            {"name": "From", "value": "billing@example.com"},
                            {"name": "To", "value": "owner@example.com"},
                            {"name": "Date", "value": "Mon, 2 Feb 2026 09:00:00 +0000"}
                        ],
                        "parts": [
                            {"mimeType": "text/html", "body": {"data": body}}
                        ]
                    }
                }),
            );
            order.push(id);
        }
        Self { messages, order }
    }
}

#[async_trait]
impl MailboxGateway for ScriptedMailbox {
    async fn list_page(&self, page_token: Option<&str>) -> Result<MessagePage, PipelineError> {
        assert!(page_token.is_none(), "single-page mailbox");
        Ok(MessagePage {
            ids: self.order.clone(),
            next_page_token: None,
        })
    }

    async fn fetch_full(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        let value = self
            .messages
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        Ok(serde_json::from_value(value.clone()).expect("fixture message"))
    }

    async fn fetch_metadata(&self, id: &str) -> Result<ProviderMessage, PipelineError> {
        self.fetch_full(id).await
    }

    async fn fetch_raw(&self, id: &str) -> Result<Vec<u8>, PipelineError> {
        self.messages
            .get(id)
            .map(|_| format!("From: billing@example.com\r\nSubject: raw {id}\r\n\r\nbody").into_bytes())
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    async fn fetch_attachment(&self, _: &str, id: &str) -> Result<Vec<u8>, PipelineError> {
        Err(PipelineError::NotFound(id.to_string()))
    }
}

#[tokio::test]
async fn listing_excludes_hidden_messages_and_hiding_is_reversible() {
    let root = temp_root();
    let db = Database::open(&root.join("lurebox.db")).expect("open db");
    let user = db
        .upsert_user("google-sub-1", "owner@example.com", None)
        .expect("register user");
    let mailbox = ScriptedMailbox::new();

    let listing = api::list_inbox(&mailbox, &db, &user, 25).await.expect("list");
    assert_eq!(listing.emails.len(), 5);

    hidden::hide(&db, &user, "m2").expect("hide m2");
    hidden::hide(&db, &user, "m4").expect("hide m4");

    let filtered = api::list_inbox(&mailbox, &db, &user, 25).await.expect("list");
    let ids: Vec<&str> = filtered.emails.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3", "m5"]);

    hidden::unhide(&db, &user, "m2").expect("unhide m2");
    let restored = api::list_inbox(&mailbox, &db, &user, 25).await.expect("list");
    assert_eq!(restored.emails.len(), 4);

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn hidden_messages_remain_directly_viewable() {
    let root = temp_root();
    let db = Database::open(&root.join("lurebox.db")).expect("open db");
    let user = db
        .upsert_user("google-sub-1", "owner@example.com", None)
        .expect("register user");
    let mailbox = ScriptedMailbox::new();

    hidden::hide(&db, &user, "m3").expect("hide m3");

    // Hiding only affects the listing; a direct fetch still works.
    let view = api::view_message(&mailbox, "m3").await.expect("view");
    assert_eq!(view.basic.subject, "Invoice 3");
    assert!(view.basic.body.contains("Message 3"));
    assert!(!view.basic.body.contains("<script"), "body is sanitized");
    assert!(view
        .raw_mime_body
        .as_deref()
        .expect("raw body present")
        .contains("raw m3"));

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn scan_failure_is_typed_and_does_not_affect_viewing() {
    let mailbox = ScriptedMailbox::new();

    // Nothing listens on this port, so classification fails while the same
    // message still renders.
    let classifier = ClassifierClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
    let scan = api::scan_message(&mailbox, &classifier, "m1").await;
    assert!(matches!(
        scan,
        Err(PipelineError::ScanFailed(_)) | Err(PipelineError::UpstreamTimeout(_))
    ));

    let view = api::view_message(&mailbox, "m1").await.expect("view");
    assert!(view.basic.body.contains("Message 1"));
}

#[tokio::test]
async fn unknown_message_id_is_not_found() {
    let mailbox = ScriptedMailbox::new();
    let result = api::view_message(&mailbox, "nope").await;
    assert!(matches!(result, Err(PipelineError::NotFound(id)) if id == "nope"));
}
