use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::{Announcement, Role};
use crate::views;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Post a group announcement. Admins and the owner only; the record is
/// append-only.
pub fn post(
    conn: &Connection,
    env: &Env,
    group_id: &Uuid,
    author: &str,
    text: &str,
) -> Result<Announcement> {
    if text.trim().is_empty() {
        return Err(ChatError::InvalidState("empty announcement"));
    }
    conversations::require_group(conn, group_id)?;
    let view = views::require_live_view(conn, group_id, author)?;
    if views::role_of(&view)? < Role::Admin {
        return Err(ChatError::PermissionDenied);
    }
    let id = Uuid::new_v4();
    let now = env.clock.now();
    conn.execute(
        "INSERT INTO announcements (id, conversation_id, author_id, text, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), group_id.to_string(), author, text, now],
    )?;
    Ok(Announcement {
        id,
        conversation_id: *group_id,
        author_id: author.to_string(),
        text: text.to_string(),
        created_at: now,
    })
}

/// Announcements of a group, visible to live participants only.
pub fn list(
    conn: &Connection,
    group_id: &Uuid,
    user: &str,
    newest_first: bool,
) -> Result<Vec<Announcement>> {
    conversations::require_group(conn, group_id)?;
    views::require_live_view(conn, group_id, user)?;
    let sql = if newest_first {
        "SELECT id, conversation_id, author_id, text, created_at FROM announcements \
         WHERE conversation_id = ?1 ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT id, conversation_id, author_id, text, created_at FROM announcements \
         WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([group_id.to_string()], |row| {
        Ok(Announcement {
            id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
            conversation_id: Uuid::parse_str(row.get::<_, String>(1)?.as_str()).unwrap(),
            author_id: row.get(2)?,
            text: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
