use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::fanout;
use crate::model::{Kind, Message};
use crate::views;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

/// Cursor for pagination.
#[derive(Clone, Copy)]
pub enum Cursor {
    Timestamp(i64),
    Id(Uuid),
}

pub(crate) fn row_to_msg(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        conversation_id: Uuid::parse_str(row.get::<_, String>(1)?.as_str()).unwrap(),
        sender_id: row.get(2)?,
        text: row.get(3)?,
        quote_id: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        sent_at: row.get(5)?,
    })
}

pub fn get_message(conn: &Connection, message_id: &Uuid) -> Result<Message> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, text, quote_id, sent_at FROM messages WHERE id = ?1",
    )?;
    stmt.query_row([message_id.to_string()], row_to_msg)
        .optional()?
        .ok_or(ChatError::MessageNotFound)
}

/// Append a canonical message and fan it out to every live participant, as
/// one atomic unit: either the message lands and delivery is attempted for
/// everyone, or nothing is written.
pub fn send_message(
    conn: &Connection,
    env: &Env,
    sender: &str,
    conversation_id: &Uuid,
    text: &str,
    quote_id: Option<&Uuid>,
) -> Result<Message> {
    if text.trim().is_empty() {
        return Err(ChatError::InvalidState("empty message"));
    }
    if !env.directory.is_active(sender) {
        return Err(ChatError::PermissionDenied);
    }
    let conv = conversations::get_conversation(conn, conversation_id)?;
    let tx = conn.unchecked_transaction()?;
    match conv.kind {
        Kind::Group => {
            views::require_live_view(conn, conversation_id, sender)?;
        }
        Kind::Private => {
            views::get_or_create_view(conn, env, sender, conversation_id)?;
        }
    }
    if let Some(quote) = quote_id {
        let quoted: Option<String> = conn
            .query_row(
                "SELECT conversation_id FROM messages WHERE id = ?1",
                [quote.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if quoted.as_deref() != Some(conversation_id.to_string().as_str()) {
            return Err(ChatError::MessageNotFound);
        }
    }
    let id = Uuid::new_v4();
    let now = env.clock.now();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, text, quote_id, sent_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            conversation_id.to_string(),
            sender,
            text,
            quote_id.map(|q| q.to_string()),
            now
        ],
    )?;
    fanout::fan_out(conn, env, &conv, &id, sender)?;
    conn.execute(
        "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
        params![conversation_id.to_string(), now],
    )?;
    tx.commit()?;
    debug!(conversation = %conversation_id, message = %id, sender, "message sent");
    Ok(Message {
        id,
        conversation_id: *conversation_id,
        sender_id: sender.to_string(),
        text: text.to_string(),
        quote_id: quote_id.copied(),
        sent_at: now,
    })
}

/// Sender-only global deletion of a canonical message. Every view's
/// reference disappears with it and quotes of it resolve to absent.
pub fn withdraw_message(
    conn: &Connection,
    sender: &str,
    conversation_id: &Uuid,
    message_id: &Uuid,
) -> Result<()> {
    conversations::get_conversation(conn, conversation_id)?;
    let message = get_message(conn, message_id)?;
    if message.conversation_id != *conversation_id {
        return Err(ChatError::MessageNotFound);
    }
    if message.sender_id != sender {
        return Err(ChatError::PermissionDenied);
    }
    conn.execute("DELETE FROM messages WHERE id = ?1", [message_id.to_string()])?;
    debug!(message = %message_id, sender, "message withdrawn");
    Ok(())
}

/// Remove a message from the caller's own view only.
pub fn delete_for_me(
    conn: &Connection,
    user_id: &str,
    conversation_id: &Uuid,
    message_id: &Uuid,
) -> Result<()> {
    views::unlink_message(conn, user_id, conversation_id, message_id)
}

/// List the caller's visible messages, newest first, with optional keyset
/// cursor. Kicked views keep read access to their history.
pub fn list_messages(
    conn: &Connection,
    user_id: &str,
    conversation_id: &Uuid,
    before: Option<Cursor>,
    limit: usize,
) -> Result<Vec<Message>> {
    if views::get_view(conn, conversation_id, user_id)?.is_none() {
        return Err(ChatError::ConversationNotFound);
    }
    let limit = limit.min(200);
    let (ts, id) = match before {
        Some(Cursor::Timestamp(ts)) => (ts, Uuid::nil()),
        Some(Cursor::Id(id)) => {
            let ts: Option<i64> = conn
                .query_row(
                    "SELECT sent_at FROM messages WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            (ts.unwrap_or(i64::MAX), id)
        }
        None => (i64::MAX, Uuid::nil()),
    };
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.sender_id, m.text, m.quote_id, m.sent_at \
         FROM view_messages vm JOIN messages m ON m.id = vm.message_id \
         WHERE vm.conversation_id = ?1 AND vm.user_id = ?2 \
           AND (m.sent_at < ?3 OR (m.sent_at = ?3 AND m.id < ?4)) \
         ORDER BY m.sent_at DESC, m.id DESC LIMIT ?5",
    )?;
    let rows = stmt.query_map(
        params![
            conversation_id.to_string(),
            user_id,
            ts,
            id.to_string(),
            limit as i64
        ],
        row_to_msg,
    )?;
    let mut msgs = Vec::new();
    for m in rows {
        msgs.push(m?);
    }
    Ok(msgs)
}
