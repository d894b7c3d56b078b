use crate::collab::{Env, MemoryDirectory, MemoryFriends, SystemClock};
use crate::db;
use rusqlite::Connection;

/// In-memory database plus collaborator stubs shared by the unit tests.
pub struct Fixture {
    pub conn: Connection,
    pub directory: MemoryDirectory,
    pub friends: MemoryFriends,
    clock: SystemClock,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            conn: db::init_db(":memory:").unwrap(),
            directory: MemoryDirectory::default(),
            friends: MemoryFriends::default(),
            clock: SystemClock,
        }
    }

    /// Fixture where every listed user exists, is active and is friends with
    /// every other listed user.
    pub fn with_friends(users: &[&str]) -> Self {
        let mut fx = Self::new();
        for user in users {
            fx.directory.add(user);
        }
        for (i, a) in users.iter().enumerate() {
            for b in &users[i + 1..] {
                fx.friends.befriend(a, b);
            }
        }
        fx
    }

    pub fn env(&self) -> Env<'_> {
        Env {
            directory: &self.directory,
            friends: &self.friends,
            clock: &self.clock,
        }
    }
}
