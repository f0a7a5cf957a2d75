use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

/// One authenticated mailbox owner: the provider's opaque subject ID plus our
/// internal numeric ID. Created on first sign-in, never deleted implicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub subject: String,
    pub email_address: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

/// Encrypted refresh token blob for a user. Only ciphertext ever touches disk;
/// the plaintext exists in memory for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub user_id: i64,
    pub refresh_token_enc: String,
    pub updated_at: Option<String>,
}

/// (user, message) pair; existence means the message is excluded from the
/// default listing view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HiddenEntry {
    pub user_id: i64,
    pub message_id: String,
    pub hidden_at: Option<String>,
}

impl User {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            subject: row.get("subject")?,
            email_address: row.get("email_address")?,
            display_name: row.get("display_name")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl StoredCredential {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            refresh_token_enc: row.get("refresh_token_enc")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl HiddenEntry {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            message_id: row.get("message_id")?,
            hidden_at: row.get("hidden_at")?,
        })
    }
}
