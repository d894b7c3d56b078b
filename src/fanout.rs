//! Fan-out dispatcher: replicates one canonical message send into every live
//! participant's view. Runs inside the send transaction, so delivery is
//! all-or-nothing from the caller's perspective.

use crate::collab::Env;
use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, Kind};
use crate::views;
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

/// Current live participants of a conversation: the pair for private, every
/// non-kicked view holder for groups.
pub(crate) fn participants(conn: &Connection, conversation: &Conversation) -> Result<Vec<String>> {
    match conversation.kind {
        Kind::Private => {
            let (low, high) = conversations::private_pair(conn, &conversation.id)?;
            Ok(vec![low, high])
        }
        Kind::Group => {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM views WHERE conversation_id = ?1 AND is_kicked = 0 ORDER BY user_id",
            )?;
            let rows = stmt.query_map([conversation.id.to_string()], |row| row.get(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        }
    }
}

/// Deliver `message_id` into every relevant view. The sender only receives
/// the reference (no unread bump). Recipients with closed accounts or kicked
/// views are skipped; a private peer whose view cannot be created (the
/// friendship lapsed) is skipped rather than failing the send.
pub(crate) fn fan_out(
    conn: &Connection,
    env: &Env,
    conversation: &Conversation,
    message_id: &Uuid,
    sender: &str,
) -> Result<()> {
    views::deliver(conn, sender, &conversation.id, message_id)?;
    for recipient in participants(conn, conversation)? {
        if recipient == sender {
            continue;
        }
        if !env.directory.is_active(&recipient) {
            debug!(user = %recipient, "skipping closed account");
            continue;
        }
        match views::get_view(conn, &conversation.id, &recipient)? {
            Some(view) if view.is_kicked => continue,
            Some(_) => {}
            None => match views::get_or_create_view(conn, env, &recipient, &conversation.id) {
                Ok(_) => {}
                Err(ChatError::FriendshipMissing) => continue,
                Err(e) => return Err(e),
            },
        }
        views::deliver(conn, &recipient, &conversation.id, message_id)?;
        views::increment_unread(conn, &recipient, &conversation.id)?;
        views::touch(conn, &recipient, &conversation.id, env.clock.now())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::create_group;
    use crate::messages::send_message;
    use crate::testutil::Fixture;

    #[test]
    fn closed_accounts_are_skipped() {
        let mut fx = Fixture::with_friends(&["owner", "m1", "m2"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1", "m2"]).unwrap();
        fx.directory.close("m2");
        send_message(&fx.conn, &fx.env(), "owner", &group.id, "hello", None).unwrap();
        let m1 = views::get_view(&fx.conn, &group.id, "m1").unwrap().unwrap();
        let m2 = views::get_view(&fx.conn, &group.id, "m2").unwrap().unwrap();
        assert_eq!(m1.unread_count, 1);
        assert_eq!(m2.unread_count, 0);
    }

    #[test]
    fn kicked_views_receive_nothing() {
        let fx = Fixture::with_friends(&["owner", "m1", "m2"]);
        let group = create_group(&fx.conn, &fx.env(), "owner", "g", &["m1", "m2"]).unwrap();
        crate::membership::kick(&fx.conn, "owner", &group.id, "m2").unwrap();
        let msg = send_message(&fx.conn, &fx.env(), "owner", &group.id, "hello", None).unwrap();
        let visible: i64 = fx
            .conn
            .query_row(
                "SELECT COUNT(*) FROM view_messages WHERE message_id = ?1 AND user_id = 'm2'",
                [msg.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(visible, 0);
    }

    #[test]
    fn sender_gets_no_unread_bump() {
        let fx = Fixture::with_friends(&["alice", "bob"]);
        let conv =
            crate::conversations::resolve_or_create_private(&fx.conn, &fx.env(), "alice", "bob")
                .unwrap();
        send_message(&fx.conn, &fx.env(), "alice", &conv.id, "hi", None).unwrap();
        let alice = views::get_view(&fx.conn, &conv.id, "alice").unwrap().unwrap();
        assert_eq!(alice.unread_count, 0);
    }
}
