//! Conversation membership and message fan-out engine for an
//! instant-messaging backend.
//!
//! Every message is logically delivered into an independent per-user view of
//! its conversation, with its own unread counter, visible-message set and
//! read state, under an owner/admin/member role hierarchy and an invitation
//! workflow. The engine is consumed via operation calls over a
//! [`rusqlite::Connection`]; identity, friendships, transport and
//! notification delivery live behind the seams in [`collab`].

pub mod announcements;
pub mod collab;
pub mod conversations;
pub mod db;
pub mod error;
mod fanout;
pub mod invitations;
pub mod membership;
pub mod messages;
pub mod model;
pub mod views;

pub use error::{ChatError, Result};

#[cfg(test)]
pub(crate) mod testutil;
