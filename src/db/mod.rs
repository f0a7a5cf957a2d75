use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use self::models::{StoredCredential, User};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_users: i64,
    pub users_with_credentials: i64,
    pub total_hidden_messages: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&mut self) -> Result<(), DbError> {
        migrations::migrate(&self.conn)
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))?;
        Ok(home.join(".lurebox").join("lurebox.db"))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Creates the user on first sign-in, refreshing profile fields on
    /// subsequent ones. Returns the stored row with its internal ID.
    pub fn upsert_user(
        &self,
        subject: &str,
        email_address: &str,
        display_name: Option<&str>,
    ) -> Result<User, DbError> {
        self.conn.execute(
            r#"
            INSERT INTO users (subject, email_address, display_name)
            VALUES (?, ?, ?)
            ON CONFLICT(subject) DO UPDATE SET
                email_address = excluded.email_address,
                display_name = excluded.display_name
            "#,
            params![subject, email_address, display_name],
        )?;

        self.get_user_by_subject(subject)?
            .ok_or_else(|| DbError::Config(format!("user vanished after upsert: {subject}")))
    }

    pub fn get_user_by_subject(&self, subject: &str) -> Result<Option<User>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject, email_address, display_name, created_at
            FROM users
            WHERE subject = ?
            LIMIT 1
            "#,
        )?;

        let mut rows = stmt.query([subject])?;
        if let Some(row) = rows.next()? {
            Ok(Some(User::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject, email_address, display_name, created_at
            FROM users
            ORDER BY email_address ASC
            "#,
        )?;

        let users = stmt
            .query_map([], User::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn remove_user(&self, subject: &str) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE subject = ?", [subject])?;
        Ok(deleted)
    }

    pub fn set_credential(&self, user_id: i64, refresh_token_enc: &str) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO credentials (user_id, refresh_token_enc, updated_at)
            VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            ON CONFLICT(user_id) DO UPDATE SET
                refresh_token_enc = excluded.refresh_token_enc,
                updated_at = excluded.updated_at
            "#,
            params![user_id, refresh_token_enc],
        )?;
        Ok(())
    }

    pub fn get_credential(&self, user_id: i64) -> Result<Option<StoredCredential>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, refresh_token_enc, updated_at
            FROM credentials
            WHERE user_id = ?
            LIMIT 1
            "#,
        )?;

        let mut rows = stmt.query([user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(StoredCredential::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn clear_credential(&self, user_id: i64) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM credentials WHERE user_id = ?", [user_id])?;
        Ok(deleted)
    }

    pub fn get_stats(&self) -> Result<DatabaseStats, DbError> {
        let total_users: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let users_with_credentials: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?;
        let total_hidden_messages: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM hidden_messages", [], |row| {
                    row.get(0)
                })?;

        Ok(DatabaseStats {
            total_users,
            users_with_credentials,
            total_hidden_messages,
        })
    }

    /// The only registered user, if exactly one exists. Lets single-user
    /// installs omit `--user`.
    pub fn single_user(&self) -> Result<Option<User>, DbError> {
        let mut users = self.list_users()?;
        match users.len() {
            1 => Ok(Some(users.remove(0))),
            _ => Ok(None),
        }
    }

}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::Database;

    fn temp_db_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lurebox-test-{}.db", Uuid::new_v4()));
        path
    }

    #[test]
    fn upsert_user_creates_then_updates_in_place() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");

        let created = db
            .upsert_user("sub-1", "owner@example.com", Some("Owner"))
            .expect("create user");
        let updated = db
            .upsert_user("sub-1", "renamed@example.com", None)
            .expect("update user");

        assert_eq!(created.id, updated.id, "subject keeps its internal id");
        assert_eq!(updated.email_address, "renamed@example.com");
        assert_eq!(db.list_users().expect("list users").len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn credential_store_and_clear_roundtrip() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user = db
            .upsert_user("sub-1", "owner@example.com", None)
            .expect("create user");

        assert!(db.get_credential(user.id).expect("get").is_none());

        db.set_credential(user.id, "aa:bb:cc").expect("set");
        let stored = db
            .get_credential(user.id)
            .expect("get")
            .expect("credential exists");
        assert_eq!(stored.refresh_token_enc, "aa:bb:cc");

        db.set_credential(user.id, "dd:ee:ff").expect("replace");
        let replaced = db
            .get_credential(user.id)
            .expect("get")
            .expect("credential exists");
        assert_eq!(replaced.refresh_token_enc, "dd:ee:ff");

        assert_eq!(db.clear_credential(user.id).expect("clear"), 1);
        assert!(db.get_credential(user.id).expect("get").is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stats_count_users_credentials_and_hidden() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user = db
            .upsert_user("sub-1", "owner@example.com", None)
            .expect("create user");
        db.set_credential(user.id, "aa:bb:cc").expect("set");
        db.conn()
            .execute(
                "INSERT INTO hidden_messages (user_id, message_id) VALUES (?, ?)",
                rusqlite::params![user.id, "msg-1"],
            )
            .expect("insert hidden");

        let stats = db.get_stats().expect("stats");
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.users_with_credentials, 1);
        assert_eq!(stats.total_hidden_messages, 1);
        let _ = std::fs::remove_file(path);
    }
}
