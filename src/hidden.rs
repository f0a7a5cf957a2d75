//! Per-user exclusion set: message IDs the user has chosen to keep out of the
//! default listing without deleting anything at the provider.

use std::collections::HashSet;

use rusqlite::params;

use crate::db::models::{HiddenEntry, User};
use crate::db::{Database, DbError};

pub fn list_hidden(db: &Database, user: &User) -> Result<HashSet<String>, DbError> {
    let mut stmt = db
        .conn()
        .prepare("SELECT message_id FROM hidden_messages WHERE user_id = ?")?;
    let ids = stmt
        .query_map([user.id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(ids)
}

pub fn list_entries(db: &Database, user: &User) -> Result<Vec<HiddenEntry>, DbError> {
    let mut stmt = db.conn().prepare(
        r#"
        SELECT user_id, message_id, hidden_at
        FROM hidden_messages
        WHERE user_id = ?
        ORDER BY hidden_at DESC, message_id ASC
        "#,
    )?;
    let entries = stmt
        .query_map([user.id], HiddenEntry::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Idempotent: hiding an already-hidden message is a no-op. Returns whether a
/// new entry was written.
pub fn hide(db: &Database, user: &User, message_id: &str) -> Result<bool, DbError> {
    let inserted = db.conn().execute(
        "INSERT OR IGNORE INTO hidden_messages (user_id, message_id) VALUES (?, ?)",
        params![user.id, message_id],
    )?;
    Ok(inserted > 0)
}

/// Idempotent: unhiding a never-hidden message is a no-op. Returns whether an
/// entry was removed.
pub fn unhide(db: &Database, user: &User, message_id: &str) -> Result<bool, DbError> {
    let deleted = db.conn().execute(
        "DELETE FROM hidden_messages WHERE user_id = ? AND message_id = ?",
        params![user.id, message_id],
    )?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{hide, list_entries, list_hidden, unhide};
    use crate::db::models::User;
    use crate::db::Database;

    fn temp_db_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lurebox-hidden-{}.db", Uuid::new_v4()));
        path
    }

    fn open_with_user() -> (Database, User, PathBuf) {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        let user = db
            .upsert_user("sub-1", "owner@example.com", None)
            .expect("create user");
        (db, user, path)
    }

    #[test]
    fn hide_is_idempotent() {
        let (db, user, path) = open_with_user();

        assert!(hide(&db, &user, "msg-1").expect("first hide"));
        assert!(!hide(&db, &user, "msg-1").expect("second hide is a no-op"));

        let hidden = list_hidden(&db, &user).expect("list hidden");
        assert_eq!(hidden.len(), 1);
        assert!(hidden.contains("msg-1"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unhide_of_never_hidden_id_succeeds() {
        let (db, user, path) = open_with_user();

        assert!(!unhide(&db, &user, "msg-unknown").expect("unhide is a no-op"));

        hide(&db, &user, "msg-1").expect("hide");
        assert!(unhide(&db, &user, "msg-1").expect("unhide"));
        assert!(list_hidden(&db, &user).expect("list").is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn hidden_sets_are_scoped_per_user() {
        let (db, first, path) = open_with_user();
        let second = db
            .upsert_user("sub-2", "other@example.com", None)
            .expect("create second user");

        hide(&db, &first, "msg-1").expect("hide for first");
        hide(&db, &second, "msg-2").expect("hide for second");

        let first_hidden = list_hidden(&db, &first).expect("list first");
        assert!(first_hidden.contains("msg-1"));
        assert!(!first_hidden.contains("msg-2"));

        let entries = list_entries(&db, &second).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message_id, "msg-2");
        let _ = std::fs::remove_file(path);
    }
}
