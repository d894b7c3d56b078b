use crate::collab::Env;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, ConversationSummary, GroupInfo, Kind, Role};
use crate::views;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

/// Deterministic conversation id for an unordered user pair, so that both
/// orderings resolve to the same row.
pub fn private_conversation_id(a: &str, b: &str) -> Uuid {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let name = format!("private:{}:{}", low, high);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub(crate) fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        kind: Kind::parse(&row.get::<_, String>(1)?).unwrap(),
        title: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get_conversation(conn: &Connection, id: &Uuid) -> Result<Conversation> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, title, owner_id, created_at, updated_at FROM conversations WHERE id = ?1",
    )?;
    stmt.query_row([id.to_string()], row_to_conversation)
        .optional()?
        .ok_or(ChatError::ConversationNotFound)
}

pub(crate) fn require_group(conn: &Connection, id: &Uuid) -> Result<Conversation> {
    let conv = get_conversation(conn, id)?;
    if conv.kind != Kind::Group {
        return Err(ChatError::ConversationNotFound);
    }
    Ok(conv)
}

/// The normalized user pair of a private conversation.
pub(crate) fn private_pair(conn: &Connection, id: &Uuid) -> Result<(String, String)> {
    let pair: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT user_low, user_high FROM conversations WHERE id = ?1",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match pair {
        Some((Some(low), Some(high))) => Ok((low, high)),
        _ => Err(ChatError::ConversationNotFound),
    }
}

/// Resolve the private conversation for an unordered user pair, creating it
/// on first use. At most one conversation exists per pair.
pub fn resolve_or_create_private(
    conn: &Connection,
    env: &Env,
    a: &str,
    b: &str,
) -> Result<Conversation> {
    if a == b {
        return Err(ChatError::InvalidState("conversation with self"));
    }
    if !env.directory.exists(a) || !env.directory.exists(b) {
        return Err(ChatError::UserNotFound);
    }
    if !env.friends.is_mutual_friend(a, b) {
        return Err(ChatError::FriendshipMissing);
    }
    let id = private_conversation_id(a, b);
    match get_conversation(conn, &id) {
        Ok(existing) => return Ok(existing),
        Err(ChatError::ConversationNotFound) => {}
        Err(e) => return Err(e),
    }
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let now = env.clock.now();
    conn.execute(
        "INSERT INTO conversations (id, kind, user_low, user_high, created_at, updated_at) \
         VALUES (?1, 'private', ?2, ?3, ?4, ?4)",
        params![id.to_string(), low, high, now],
    )?;
    debug!(conversation = %id, "created private conversation");
    Ok(Conversation {
        id,
        kind: Kind::Private,
        title: None,
        owner_id: None,
        created_at: now,
        updated_at: now,
    })
}

/// Create a group owned by `owner`. Every initial member must hold a mutual
/// friendship with the owner. Views for the owner and all members are
/// created eagerly.
pub fn create_group(
    conn: &Connection,
    env: &Env,
    owner: &str,
    title: &str,
    initial_members: &[&str],
) -> Result<Conversation> {
    if !env.directory.exists(owner) {
        return Err(ChatError::UserNotFound);
    }
    for member in initial_members {
        if !env.directory.exists(member) {
            return Err(ChatError::UserNotFound);
        }
        if !env.friends.is_mutual_friend(owner, member) {
            return Err(ChatError::FriendshipMissing);
        }
    }
    let id = Uuid::new_v4();
    let now = env.clock.now();
    let tx = conn.unchecked_transaction()?;
    conn.execute(
        "INSERT INTO conversations (id, kind, title, owner_id, created_at, updated_at) \
         VALUES (?1, 'group', ?2, ?3, ?4, ?4)",
        params![id.to_string(), title, owner, now],
    )?;
    conn.execute(
        "INSERT INTO views (conversation_id, user_id, role, created_at, updated_at) \
         VALUES (?1, ?2, 'owner', ?3, ?3)",
        params![id.to_string(), owner, now],
    )?;
    for member in initial_members {
        if *member == owner {
            continue;
        }
        conn.execute(
            "INSERT OR IGNORE INTO views (conversation_id, user_id, role, created_at, updated_at) \
             VALUES (?1, ?2, 'member', ?3, ?3)",
            params![id.to_string(), member, now],
        )?;
    }
    tx.commit()?;
    debug!(conversation = %id, owner, "created group");
    Ok(Conversation {
        id,
        kind: Kind::Group,
        title: Some(title.to_string()),
        owner_id: Some(owner.to_string()),
        created_at: now,
        updated_at: now,
    })
}

/// Rename a group. Requires admin or owner.
pub fn set_group_title(
    conn: &Connection,
    env: &Env,
    actor: &str,
    group_id: &Uuid,
    title: &str,
) -> Result<()> {
    require_group(conn, group_id)?;
    let view = views::require_live_view(conn, group_id, actor)?;
    if views::role_of(&view)? < Role::Admin {
        return Err(ChatError::PermissionDenied);
    }
    conn.execute(
        "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
        params![group_id.to_string(), title, env.clock.now()],
    )?;
    Ok(())
}

/// Membership snapshot of a group, visible to live participants only.
pub fn group_info(conn: &Connection, user: &str, group_id: &Uuid) -> Result<GroupInfo> {
    let conv = require_group(conn, group_id)?;
    views::require_live_view(conn, group_id, user)?;
    let mut stmt = conn.prepare(
        "SELECT user_id, role FROM views \
         WHERE conversation_id = ?1 AND is_kicked = 0 ORDER BY user_id",
    )?;
    let rows = stmt.query_map([group_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut owner = None;
    let mut admins = Vec::new();
    let mut members = Vec::new();
    for row in rows {
        let (user_id, role) = row?;
        match Role::parse(&role) {
            Some(Role::Owner) => owner = Some(user_id),
            Some(Role::Admin) => admins.push(user_id),
            _ => members.push(user_id),
        }
    }
    Ok(GroupInfo {
        id: conv.id,
        title: conv.title,
        owner: owner.ok_or(ChatError::InvalidState("group without owner"))?,
        admins,
        members,
    })
}

/// Conversations in which `user` holds a live view, newest activity first.
pub fn list_conversations(conn: &Connection, user: &str) -> Result<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.kind, c.title, c.owner_id, c.created_at, c.updated_at, \
                v.role, v.alias, v.unread_count, \
                (SELECT m.text FROM view_messages vm JOIN messages m ON m.id = vm.message_id \
                 WHERE vm.conversation_id = c.id AND vm.user_id = v.user_id \
                 ORDER BY m.sent_at DESC, m.id DESC LIMIT 1) \
         FROM conversations c JOIN views v ON v.conversation_id = c.id \
         WHERE v.user_id = ?1 AND v.is_kicked = 0 \
         ORDER BY c.updated_at DESC, c.id",
    )?;
    let rows = stmt.query_map([user], |row| {
        Ok(ConversationSummary {
            conversation: row_to_conversation(row)?,
            role: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| Role::parse(&s)),
            alias: row.get(7)?,
            unread_count: row.get(8)?,
            last_message: row.get(9)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
