//! Invitation workflow feeding the membership transitions. One live request
//! exists per (group, invitee); a fresh invite overwrites the previous
//! request and resets it to pending instead of creating a duplicate row.

use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::membership;
use crate::model::{Invitation, InviteStatus, Role};
use crate::views;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) fn row_to_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invitation> {
    Ok(Invitation {
        conversation_id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        to_user: row.get(1)?,
        from_user: row.get(2)?,
        message: row.get(3)?,
        status: InviteStatus::parse(&row.get::<_, String>(4)?).unwrap(),
        created_at: row.get(5)?,
    })
}

pub fn get_invitation(
    conn: &Connection,
    group_id: &Uuid,
    invitee: &str,
) -> Result<Option<Invitation>> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, to_user, from_user, message, status, created_at \
         FROM invitations WHERE conversation_id = ?1 AND to_user = ?2",
    )?;
    let invitation = stmt
        .query_row(params![group_id.to_string(), invitee], row_to_invitation)
        .optional()?;
    Ok(invitation)
}

/// Members invite friends; admins and the owner add directly instead. An
/// existing request for the invitee is overwritten and reset to pending,
/// whatever its prior status.
pub fn invite(
    conn: &Connection,
    env: &Env,
    group_id: &Uuid,
    inviter: &str,
    invitee: &str,
    message: &str,
) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let inviter_view = views::require_live_view(conn, group_id, inviter)?;
    if views::role_of(&inviter_view)? != Role::Member {
        return Err(ChatError::PermissionDenied);
    }
    if !env.directory.exists(invitee) {
        return Err(ChatError::UserNotFound);
    }
    if !env.friends.is_mutual_friend(inviter, invitee) {
        return Err(ChatError::FriendshipMissing);
    }
    if let Some(view) = views::get_view(conn, group_id, invitee)? {
        if !view.is_kicked {
            return Err(ChatError::AlreadyExists);
        }
    }
    conn.execute(
        "INSERT INTO invitations (conversation_id, to_user, from_user, message, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5) \
         ON CONFLICT(conversation_id, to_user) DO UPDATE SET \
           from_user = excluded.from_user, message = excluded.message, \
           status = 'pending', created_at = excluded.created_at",
        params![
            group_id.to_string(),
            invitee,
            inviter,
            message,
            env.clock.now()
        ],
    )?;
    debug!(group = %group_id, inviter, invitee, "invitation recorded");
    Ok(())
}

/// Any live participant settles a pending request. The invitee becomes a
/// member with the full history backfilled; a stale kicked view is destroyed
/// first.
pub fn accept(
    conn: &Connection,
    env: &Env,
    group_id: &Uuid,
    actor: &str,
    invitee: &str,
) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    views::require_live_view(conn, group_id, actor)?;
    let invitation =
        get_invitation(conn, group_id, invitee)?.ok_or(ChatError::InvitationNotFound)?;
    if invitation.status != InviteStatus::Pending {
        return Err(ChatError::InvalidState("request already settled"));
    }
    if let Some(view) = views::get_view(conn, group_id, invitee)? {
        if !view.is_kicked {
            return Err(ChatError::AlreadyExists);
        }
    }
    let tx = conn.unchecked_transaction()?;
    conn.execute(
        "UPDATE invitations SET status = 'accepted' WHERE conversation_id = ?1 AND to_user = ?2",
        params![group_id.to_string(), invitee],
    )?;
    membership::join_group(conn, env, group_id, invitee)?;
    tx.commit()?;
    info!(group = %group_id, invitee, "invitation accepted");
    Ok(())
}

/// Any live participant rejects a pending request. A later invite may reopen
/// it.
pub fn reject(conn: &Connection, group_id: &Uuid, actor: &str, invitee: &str) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    views::require_live_view(conn, group_id, actor)?;
    let invitation =
        get_invitation(conn, group_id, invitee)?.ok_or(ChatError::InvitationNotFound)?;
    if invitation.status != InviteStatus::Pending {
        return Err(ChatError::InvalidState("request already settled"));
    }
    conn.execute(
        "UPDATE invitations SET status = 'rejected' WHERE conversation_id = ?1 AND to_user = ?2",
        params![group_id.to_string(), invitee],
    )?;
    info!(group = %group_id, invitee, "invitation rejected");
    Ok(())
}

/// Requests for a group, newest first, visible to live participants.
pub fn list_invitations(
    conn: &Connection,
    group_id: &Uuid,
    actor: &str,
) -> Result<Vec<Invitation>> {
    conversations::require_group(conn, group_id)?;
    views::require_live_view(conn, group_id, actor)?;
    let mut stmt = conn.prepare(
        "SELECT conversation_id, to_user, from_user, message, status, created_at \
         FROM invitations WHERE conversation_id = ?1 ORDER BY created_at DESC, to_user",
    )?;
    let rows = stmt.query_map([group_id.to_string()], row_to_invitation)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
