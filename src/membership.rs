//! Group role transitions. Roles form a strict order (`Member < Admin <
//! Owner`); every permission check is a comparison on it. Any illegal
//! transition reports `PermissionDenied`; an absent (group, user) pair
//! reports `ConversationNotFound`.

use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::Role;
use crate::views;
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

/// Owner moves a member into the admin set.
pub fn promote(conn: &Connection, actor: &str, group_id: &Uuid, target: &str) -> Result<()> {
    set_role(conn, actor, group_id, target, Role::Member, Role::Admin)
}

/// Owner moves an admin back into the member set.
pub fn demote(conn: &Connection, actor: &str, group_id: &Uuid, target: &str) -> Result<()> {
    set_role(conn, actor, group_id, target, Role::Admin, Role::Member)
}

fn set_role(
    conn: &Connection,
    actor: &str,
    group_id: &Uuid,
    target: &str,
    from: Role,
    to: Role,
) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let actor_view = views::require_live_view(conn, group_id, actor)?;
    let target_view = views::require_live_view(conn, group_id, target)?;
    if views::role_of(&actor_view)? != Role::Owner || views::role_of(&target_view)? != from {
        return Err(ChatError::PermissionDenied);
    }
    conn.execute(
        "UPDATE views SET role = ?3 WHERE conversation_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), target, to.as_str()],
    )?;
    info!(group = %group_id, user = target, role = to.as_str(), "role changed");
    Ok(())
}

/// Atomically hand the owner role to another live participant; the previous
/// owner becomes an admin. Exactly one owner exists before and after.
pub fn transfer_ownership(
    conn: &Connection,
    actor: &str,
    group_id: &Uuid,
    new_owner: &str,
) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let actor_view = views::require_live_view(conn, group_id, actor)?;
    let new_owner_view = views::require_live_view(conn, group_id, new_owner)?;
    if views::role_of(&actor_view)? != Role::Owner || actor == new_owner {
        return Err(ChatError::PermissionDenied);
    }
    views::role_of(&new_owner_view)?;
    let tx = conn.unchecked_transaction()?;
    conn.execute(
        "UPDATE views SET role = 'owner' WHERE conversation_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), new_owner],
    )?;
    conn.execute(
        "UPDATE views SET role = 'admin' WHERE conversation_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), actor],
    )?;
    conn.execute(
        "UPDATE conversations SET owner_id = ?2 WHERE id = ?1",
        params![group_id.to_string(), new_owner],
    )?;
    let owners: i64 = conn.query_row(
        "SELECT COUNT(*) FROM views WHERE conversation_id = ?1 AND role = 'owner' AND is_kicked = 0",
        [group_id.to_string()],
        |row| row.get(0),
    )?;
    if owners != 1 {
        return Err(ChatError::InvalidState("owner count drifted"));
    }
    tx.commit()?;
    info!(group = %group_id, new_owner, "ownership transferred");
    Ok(())
}

/// Role-gated removal: legal only when the actor strictly outranks the
/// target (peers cannot kick peers). The target's view is soft-disabled,
/// keeping its message history and unread state.
pub fn kick(conn: &Connection, actor: &str, group_id: &Uuid, target: &str) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let actor_view = views::require_live_view(conn, group_id, actor)?;
    let target_view = match views::get_view(conn, group_id, target)? {
        None => return Err(ChatError::ConversationNotFound),
        Some(view) if view.is_kicked => return Err(ChatError::ConversationNotFound),
        Some(view) => view,
    };
    if views::role_of(&actor_view)? <= views::role_of(&target_view)? {
        return Err(ChatError::PermissionDenied);
    }
    conn.execute(
        "UPDATE views SET is_kicked = 1 WHERE conversation_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), target],
    )?;
    info!(group = %group_id, user = target, "participant kicked");
    Ok(())
}

/// Direct-admin mirror of `kick`: identical role check, identical
/// soft-disable effect.
pub fn remove_member(conn: &Connection, actor: &str, group_id: &Uuid, target: &str) -> Result<()> {
    kick(conn, actor, group_id, target)
}

/// Self-initiated departure, members only: owners must transfer ownership
/// and admins must be demoted first. Unlike kick, the view is destroyed
/// outright along with its visible-message set.
pub fn quit(conn: &Connection, actor: &str, group_id: &Uuid) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let view = views::require_live_view(conn, group_id, actor)?;
    if views::role_of(&view)? != Role::Member {
        return Err(ChatError::PermissionDenied);
    }
    conn.execute(
        "DELETE FROM views WHERE conversation_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), actor],
    )?;
    info!(group = %group_id, actor, "participant quit");
    Ok(())
}

/// Admins and the owner add a user directly, bypassing the invitation
/// ledger. The target must exist and hold an active account. Same
/// view-creation, backfill and stale-view cleanup as an accepted
/// invitation.
pub fn add_member(
    conn: &Connection,
    env: &Env,
    actor: &str,
    group_id: &Uuid,
    user: &str,
) -> Result<()> {
    conversations::require_group(conn, group_id)?;
    let actor_view = views::require_live_view(conn, group_id, actor)?;
    if views::role_of(&actor_view)? < Role::Admin {
        return Err(ChatError::PermissionDenied);
    }
    if !env.directory.exists(user) {
        return Err(ChatError::UserNotFound);
    }
    // Closed accounts never receive fan-out; adding one would leave a
    // permanently silent member in the set.
    if !env.directory.is_active(user) {
        return Err(ChatError::PermissionDenied);
    }
    let tx = conn.unchecked_transaction()?;
    join_group(conn, env, group_id, user)?;
    tx.commit()?;
    Ok(())
}

/// Shared join path for `add_member` and invitation accept: destroy any
/// stale kicked view (rejoin never resurrects old state), create a fresh
/// member view and backfill it with the full canonical history. Caller owns
/// the transaction.
pub(crate) fn join_group(conn: &Connection, env: &Env, group_id: &Uuid, user: &str) -> Result<()> {
    match views::get_view(conn, group_id, user)? {
        Some(view) if !view.is_kicked => return Err(ChatError::AlreadyExists),
        Some(_) => {
            conn.execute(
                "DELETE FROM views WHERE conversation_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), user],
            )?;
        }
        None => {}
    }
    let now = env.clock.now();
    conn.execute(
        "INSERT INTO views (conversation_id, user_id, role, created_at, updated_at) \
         VALUES (?1, ?2, 'member', ?3, ?3)",
        params![group_id.to_string(), user, now],
    )?;
    conn.execute(
        "INSERT INTO view_messages (conversation_id, user_id, message_id) \
         SELECT ?1, ?2, id FROM messages WHERE conversation_id = ?1",
        params![group_id.to_string(), user],
    )?;
    info!(group = %group_id, user, "member joined");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::{create_group, group_info};
    use crate::messages::{list_messages, send_message};
    use crate::testutil::Fixture;

    #[test]
    fn promote_demote_are_owner_only() {
        let fx = Fixture::with_friends(&["owner", "m1", "m2"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1", "m2"]).unwrap();
        assert!(matches!(
            promote(&fx.conn, "m1", &group.id, "m2"),
            Err(ChatError::PermissionDenied)
        ));
        promote(&fx.conn, "owner", &group.id, "m1").unwrap();
        let info = group_info(&fx.conn, "owner", &group.id).unwrap();
        assert_eq!(info.admins, vec!["m1"]);
        // promoting an admin again is illegal
        assert!(matches!(
            promote(&fx.conn, "owner", &group.id, "m1"),
            Err(ChatError::PermissionDenied)
        ));
        demote(&fx.conn, "owner", &group.id, "m1").unwrap();
        let info = group_info(&fx.conn, "owner", &group.id).unwrap();
        assert!(info.admins.is_empty());
    }

    #[test]
    fn transfer_keeps_exactly_one_owner() {
        let fx = Fixture::with_friends(&["owner", "m1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1"]).unwrap();
        transfer_ownership(&fx.conn, "owner", &group.id, "m1").unwrap();
        let info = group_info(&fx.conn, "m1", &group.id).unwrap();
        assert_eq!(info.owner, "m1");
        assert_eq!(info.admins, vec!["owner"]);
        let owners: i64 = fx
            .conn
            .query_row(
                "SELECT COUNT(*) FROM views WHERE conversation_id = ?1 AND role = 'owner'",
                [group.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(owners, 1);
        let conv = crate::conversations::get_conversation(&fx.conn, &group.id).unwrap();
        assert_eq!(conv.owner_id.as_deref(), Some("m1"));
    }

    #[test]
    fn transfer_rejects_kicked_or_foreign_target() {
        let fx = Fixture::with_friends(&["owner", "m1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1"]).unwrap();
        kick(&fx.conn, "owner", &group.id, "m1").unwrap();
        assert!(matches!(
            transfer_ownership(&fx.conn, "owner", &group.id, "m1"),
            Err(ChatError::PermissionDenied)
        ));
        assert!(matches!(
            transfer_ownership(&fx.conn, "owner", &group.id, "nobody"),
            Err(ChatError::ConversationNotFound)
        ));
    }

    #[test]
    fn kick_requires_strictly_higher_role() {
        let fx = Fixture::with_friends(&["owner", "a1", "m1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["a1", "m1"]).unwrap();
        promote(&fx.conn, "owner", &group.id, "a1").unwrap();
        // member cannot kick member, admin cannot kick admin or owner
        assert!(matches!(
            kick(&fx.conn, "m1", &group.id, "a1"),
            Err(ChatError::PermissionDenied)
        ));
        assert!(matches!(
            kick(&fx.conn, "a1", &group.id, "owner"),
            Err(ChatError::PermissionDenied)
        ));
        kick(&fx.conn, "a1", &group.id, "m1").unwrap();
        let view = crate::views::get_view(&fx.conn, &group.id, "m1").unwrap().unwrap();
        assert!(view.is_kicked);
    }

    #[test]
    fn kick_preserves_history_quit_destroys_it() {
        let fx = Fixture::with_friends(&["owner", "m1", "m2"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1", "m2"]).unwrap();
        send_message(&fx.conn, &fx.env(), "owner", &group.id, "hello", None).unwrap();
        kick(&fx.conn, "owner", &group.id, "m1").unwrap();
        assert_eq!(list_messages(&fx.conn, "m1", &group.id, None, 10).unwrap().len(), 1);
        quit(&fx.conn, "m2", &group.id).unwrap();
        assert!(matches!(
            list_messages(&fx.conn, "m2", &group.id, None, 10),
            Err(ChatError::ConversationNotFound)
        ));
    }

    #[test]
    fn only_members_may_quit() {
        let fx = Fixture::with_friends(&["owner", "a1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["a1"]).unwrap();
        promote(&fx.conn, "owner", &group.id, "a1").unwrap();
        assert!(matches!(
            quit(&fx.conn, "owner", &group.id),
            Err(ChatError::PermissionDenied)
        ));
        assert!(matches!(
            quit(&fx.conn, "a1", &group.id),
            Err(ChatError::PermissionDenied)
        ));
    }

    #[test]
    fn add_member_backfills_and_rejects_duplicates() {
        let mut fx = Fixture::with_friends(&["owner", "m1"]);
        fx.directory.add("late");
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1"]).unwrap();
        send_message(&fx.conn, &fx.env(), "owner", &group.id, "before join", None).unwrap();
        assert!(matches!(
            add_member(&fx.conn, &fx.env(), "m1", &group.id, "late"),
            Err(ChatError::PermissionDenied)
        ));
        add_member(&fx.conn, &fx.env(), "owner", &group.id, "late").unwrap();
        let history = list_messages(&fx.conn, "late", &group.id, None, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(
            add_member(&fx.conn, &fx.env(), "owner", &group.id, "late"),
            Err(ChatError::AlreadyExists)
        ));
    }

    #[test]
    fn add_member_rejects_closed_accounts() {
        let mut fx = Fixture::with_friends(&["owner", "m1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1"]).unwrap();
        fx.directory.add("ghost");
        fx.directory.close("ghost");
        assert!(matches!(
            add_member(&fx.conn, &fx.env(), "owner", &group.id, "ghost"),
            Err(ChatError::PermissionDenied)
        ));
        assert!(crate::views::get_view(&fx.conn, &group.id, "ghost").unwrap().is_none());
        assert!(matches!(
            add_member(&fx.conn, &fx.env(), "owner", &group.id, "nobody"),
            Err(ChatError::UserNotFound)
        ));
    }

    #[test]
    fn rejoin_after_kick_starts_fresh() {
        let fx = Fixture::with_friends(&["owner", "m1"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1"]).unwrap();
        send_message(&fx.conn, &fx.env(), "owner", &group.id, "old", None).unwrap();
        kick(&fx.conn, "owner", &group.id, "m1").unwrap();
        add_member(&fx.conn, &fx.env(), "owner", &group.id, "m1").unwrap();
        let view = crate::views::get_view(&fx.conn, &group.id, "m1").unwrap().unwrap();
        assert!(!view.is_kicked);
        assert_eq!(view.unread_count, 0);
        assert_eq!(view.role, Some(Role::Member));
        // one live view per (group, user)
        let n: i64 = fx
            .conn
            .query_row(
                "SELECT COUNT(*) FROM views WHERE conversation_id = ?1 AND user_id = 'm1'",
                [group.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }
}
