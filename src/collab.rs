//! Seams to the collaborators the engine consumes but does not own: the user
//! directory, the friendship graph and the clock. The enclosing service
//! supplies real implementations; the in-memory ones here back tests and
//! small embeddings.

use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

/// Resolves user identifiers to existence and active/closed status.
pub trait Directory {
    fn exists(&self, user_id: &str) -> bool;
    fn is_active(&self, user_id: &str) -> bool;
}

/// Answers mutual-friendship queries gating private conversations and
/// group invitations.
pub trait FriendshipGraph {
    fn is_mutual_friend(&self, a: &str, b: &str) -> bool;
}

/// Source for all recorded timestamps (unix seconds).
pub trait Clock {
    fn now(&self) -> i64;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

/// Bundle of collaborator handles passed into operations that need them.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub directory: &'a dyn Directory,
    pub friends: &'a dyn FriendshipGraph,
    pub clock: &'a dyn Clock,
}

/// In-memory directory keyed by user id, tracking active/closed status.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: HashMap<String, bool>,
}

impl MemoryDirectory {
    pub fn add(&mut self, user_id: &str) {
        self.users.insert(user_id.to_string(), true);
    }

    /// Mark an account closed; it still exists but no longer receives fan-out.
    pub fn close(&mut self, user_id: &str) {
        self.users.insert(user_id.to_string(), false);
    }
}

impl Directory for MemoryDirectory {
    fn exists(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    fn is_active(&self, user_id: &str) -> bool {
        self.users.get(user_id).copied().unwrap_or(false)
    }
}

/// In-memory friendship graph storing unordered pairs.
#[derive(Debug, Default)]
pub struct MemoryFriends {
    pairs: HashSet<(String, String)>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl MemoryFriends {
    pub fn befriend(&mut self, a: &str, b: &str) {
        self.pairs.insert(pair_key(a, b));
    }

    pub fn unfriend(&mut self, a: &str, b: &str) {
        self.pairs.remove(&pair_key(a, b));
    }
}

impl FriendshipGraph for MemoryFriends {
    fn is_mutual_friend(&self, a: &str, b: &str) -> bool {
        a != b && self.pairs.contains(&pair_key(a, b))
    }
}
