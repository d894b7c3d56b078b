use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

/// Initialize the SQLite database and run migrations.
pub fn init_db<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    // Withdraw and quit rely on cascading deletes of join rows.
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
  id TEXT PRIMARY KEY,
  kind TEXT NOT NULL CHECK (kind IN ('private','group')),
  title TEXT,
  owner_id TEXT,
  user_low TEXT,
  user_high TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE (user_low, user_high)
);

CREATE TABLE IF NOT EXISTS views (
  conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
  user_id TEXT NOT NULL,
  role TEXT CHECK (role IN ('member','admin','owner')),
  is_kicked INTEGER NOT NULL DEFAULT 0,
  unread_count INTEGER NOT NULL DEFAULT 0,
  alias TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  PRIMARY KEY (conversation_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
  sender_id TEXT NOT NULL,
  text TEXT NOT NULL,
  quote_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
  sent_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS view_messages (
  conversation_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
  PRIMARY KEY (conversation_id, user_id, message_id),
  FOREIGN KEY (conversation_id, user_id)
    REFERENCES views(conversation_id, user_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS message_reads (
  message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
  user_id TEXT NOT NULL,
  read_at INTEGER NOT NULL,
  PRIMARY KEY (message_id, user_id)
);

CREATE TABLE IF NOT EXISTS invitations (
  conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
  to_user TEXT NOT NULL,
  from_user TEXT NOT NULL,
  message TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','accepted','rejected')),
  created_at INTEGER NOT NULL,
  PRIMARY KEY (conversation_id, to_user)
);

CREATE TABLE IF NOT EXISTS announcements (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
  author_id TEXT NOT NULL,
  text TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_view_messages_message ON view_messages(message_id);
CREATE INDEX IF NOT EXISTS idx_announcements_conversation ON announcements(conversation_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chat.db");
        init_db(&path).unwrap();
        let conn = init_db(&path).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn foreign_keys_enforced() {
        let conn = init_db(":memory:").unwrap();
        let res = conn.execute(
            "INSERT INTO views (conversation_id, user_id, created_at, updated_at) VALUES ('missing', 'u', 0, 0)",
            [],
        );
        assert!(res.is_err());
    }
}
