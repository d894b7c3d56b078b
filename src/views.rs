use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::{Kind, Role, View};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

pub(crate) fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<View> {
    Ok(View {
        conversation_id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        user_id: row.get(1)?,
        role: row
            .get::<_, Option<String>>(2)?
            .and_then(|s| Role::parse(&s)),
        is_kicked: row.get::<_, i64>(3)? != 0,
        unread_count: row.get(4)?,
        alias: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn get_view(conn: &Connection, conversation_id: &Uuid, user_id: &str) -> Result<Option<View>> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, user_id, role, is_kicked, unread_count, alias, created_at, updated_at \
         FROM views WHERE conversation_id = ?1 AND user_id = ?2",
    )?;
    let view = stmt
        .query_row(params![conversation_id.to_string(), user_id], row_to_view)
        .optional()?;
    Ok(view)
}

/// A view that exists and is not kicked. Absent pair reports
/// `ConversationNotFound`; a kicked view reports `PermissionDenied`.
pub(crate) fn require_live_view(
    conn: &Connection,
    conversation_id: &Uuid,
    user_id: &str,
) -> Result<View> {
    match get_view(conn, conversation_id, user_id)? {
        None => Err(ChatError::ConversationNotFound),
        Some(view) if view.is_kicked => Err(ChatError::PermissionDenied),
        Some(view) => Ok(view),
    }
}

/// The group role of a view. Private views carry no role.
pub(crate) fn role_of(view: &View) -> Result<Role> {
    view.role.ok_or(ChatError::PermissionDenied)
}

/// Idempotently fetch or create the (user, conversation) view. Group views
/// are only ever created by membership transitions; a missing one is
/// `ConversationNotFound`. Private views require the pair's friendship to
/// still hold, binding the view to the relationship.
pub fn get_or_create_view(
    conn: &Connection,
    env: &Env,
    user_id: &str,
    conversation_id: &Uuid,
) -> Result<View> {
    if let Some(view) = get_view(conn, conversation_id, user_id)? {
        return Ok(view);
    }
    let conv = conversations::get_conversation(conn, conversation_id)?;
    if conv.kind == Kind::Group {
        return Err(ChatError::ConversationNotFound);
    }
    let (low, high) = conversations::private_pair(conn, conversation_id)?;
    let other = if user_id == low {
        high.as_str()
    } else if user_id == high {
        low.as_str()
    } else {
        return Err(ChatError::PermissionDenied);
    };
    if !env.friends.is_mutual_friend(user_id, other) {
        return Err(ChatError::FriendshipMissing);
    }
    let now = env.clock.now();
    conn.execute(
        "INSERT INTO views (conversation_id, user_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![conversation_id.to_string(), user_id, now],
    )?;
    debug!(conversation = %conversation_id, user = user_id, "created private view");
    Ok(View {
        conversation_id: *conversation_id,
        user_id: user_id.to_string(),
        role: None,
        is_kicked: false,
        unread_count: 0,
        alias: None,
        created_at: now,
        updated_at: now,
    })
}

/// Append a reference to a canonical message into the view's visible set.
/// Idempotent; canonical state is untouched.
pub fn deliver(
    conn: &Connection,
    user_id: &str,
    conversation_id: &Uuid,
    message_id: &Uuid,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO view_messages (conversation_id, user_id, message_id) VALUES (?1, ?2, ?3)",
        params![conversation_id.to_string(), user_id, message_id.to_string()],
    )?;
    Ok(())
}

/// Remove a message reference from this view only ("delete for me"). The
/// canonical message and every other view are untouched.
pub fn unlink_message(
    conn: &Connection,
    user_id: &str,
    conversation_id: &Uuid,
    message_id: &Uuid,
) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM view_messages WHERE conversation_id = ?1 AND user_id = ?2 AND message_id = ?3",
        params![conversation_id.to_string(), user_id, message_id.to_string()],
    )?;
    if changed == 0 {
        return Err(ChatError::MessageNotFound);
    }
    Ok(())
}

/// Bump the unread counter. The increment happens in SQL so concurrent
/// sends cannot lose updates.
pub fn increment_unread(conn: &Connection, user_id: &str, conversation_id: &Uuid) -> Result<()> {
    let changed = conn.execute(
        "UPDATE views SET unread_count = unread_count + 1 WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id.to_string(), user_id],
    )?;
    if changed == 0 {
        return Err(ChatError::ConversationNotFound);
    }
    Ok(())
}

pub(crate) fn touch(
    conn: &Connection,
    user_id: &str,
    conversation_id: &Uuid,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE views SET updated_at = ?3 WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id.to_string(), user_id, now],
    )?;
    Ok(())
}

/// Idempotently zero the unread counter. For groups the user is additionally
/// recorded in the read-by ledger for every visible message from another
/// sender; a kicked view only resets its counter and never touches the
/// ledger.
pub fn mark_read(conn: &Connection, env: &Env, user_id: &str, conversation_id: &Uuid) -> Result<()> {
    let view =
        get_view(conn, conversation_id, user_id)?.ok_or(ChatError::ConversationNotFound)?;
    let conv = conversations::get_conversation(conn, conversation_id)?;
    let tx = conn.unchecked_transaction()?;
    conn.execute(
        "UPDATE views SET unread_count = 0 WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id.to_string(), user_id],
    )?;
    if conv.kind == Kind::Group && !view.is_kicked {
        conn.execute(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) \
             SELECT vm.message_id, ?2, ?3 FROM view_messages vm \
             JOIN messages m ON m.id = vm.message_id \
             WHERE vm.conversation_id = ?1 AND vm.user_id = ?2 AND m.sender_id <> ?2",
            params![conversation_id.to_string(), user_id, env.clock.now()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Set or clear the per-view display alias.
pub fn set_alias(
    conn: &Connection,
    env: &Env,
    user_id: &str,
    conversation_id: &Uuid,
    alias: Option<&str>,
) -> Result<()> {
    require_live_view(conn, conversation_id, user_id)?;
    conn.execute(
        "UPDATE views SET alias = ?3, updated_at = ?4 WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id.to_string(), user_id, alias, env.clock.now()],
    )?;
    Ok(())
}

/// Users recorded in the read-by ledger for a message.
pub fn read_by(conn: &Connection, message_id: &Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at, user_id",
    )?;
    let rows = stmt.query_map([message_id.to_string()], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
