//! Schema versioning for the lurebox store. The current version lives in a
//! single-row `meta` table; `migrate` steps through every version newer than
//! the stored one and is safe to run on every open.

use rusqlite::{Connection, OptionalExtension};

use crate::db::DbError;

const LATEST_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            schema_version INTEGER NOT NULL
        );
        "#,
    )?;

    let mut version = stored_version(conn)?;
    if version > LATEST_VERSION {
        return Err(DbError::Config(format!(
            "store was written by a newer lurebox (schema version {version}, supported {LATEST_VERSION})"
        )));
    }

    while version < LATEST_VERSION {
        version += 1;
        apply(conn, version)?;
        record_version(conn, version)?;
    }

    Ok(())
}

fn stored_version(conn: &Connection) -> Result<i64, DbError> {
    let version = conn
        .query_row("SELECT schema_version FROM meta WHERE id = 0", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn record_version(conn: &Connection, version: i64) -> Result<(), DbError> {
    conn.execute(
        r#"
        INSERT INTO meta (id, schema_version)
        VALUES (0, ?1)
        ON CONFLICT(id) DO UPDATE SET schema_version = excluded.schema_version
        "#,
        [version],
    )?;
    Ok(())
}

fn apply(conn: &Connection, version: i64) -> Result<(), DbError> {
    match version {
        1 => initial_tables(conn),
        other => Err(DbError::Config(format!(
            "no migration step produces schema version {other}"
        ))),
    }
}

/// v1: users, their encrypted mailbox credential, and the hidden-message set.
fn initial_tables(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL UNIQUE,
            email_address TEXT NOT NULL,
            display_name TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS credentials (
            user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            refresh_token_enc TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS hidden_messages (
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message_id TEXT NOT NULL,
            hidden_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            PRIMARY KEY (user_id, message_id)
        );

        CREATE INDEX IF NOT EXISTS idx_hidden_messages_user_id ON hidden_messages(user_id);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rusqlite::Connection;
    use uuid::Uuid;

    use super::{migrate, stored_version};
    use crate::db::DbError;

    fn temp_db_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lurebox-migrations-{}.db", Uuid::new_v4()));
        path
    }

    #[test]
    fn fresh_store_migrates_to_latest_and_is_usable() {
        let path = temp_db_path();
        let conn = Connection::open(&path).expect("open");

        migrate(&conn).expect("migrate");
        assert_eq!(stored_version(&conn).expect("version"), 1);

        // The v1 tables exist and accept rows.
        conn.execute(
            "INSERT INTO users (subject, email_address) VALUES ('sub-1', 'owner@example.com')",
            [],
        )
        .expect("users table usable");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn migrate_is_idempotent() {
        let path = temp_db_path();
        let conn = Connection::open(&path).expect("open");

        migrate(&conn).expect("first run");
        migrate(&conn).expect("second run");
        assert_eq!(stored_version(&conn).expect("version"), 1);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stores_from_a_newer_version_are_refused() {
        let path = temp_db_path();
        let conn = Connection::open(&path).expect("open");
        migrate(&conn).expect("migrate");

        conn.execute("UPDATE meta SET schema_version = 99", [])
            .expect("fake future version");

        let result = migrate(&conn);
        assert!(matches!(result, Err(DbError::Config(_))), "{result:?}");

        let _ = std::fs::remove_file(path);
    }
}
