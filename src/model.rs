use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Private,
    Group,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Private => "private",
            Kind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Kind::Private),
            "group" => Some(Kind::Group),
            _ => None,
        }
    }
}

/// Group role hierarchy. The derived ordering (`Member < Admin < Owner`) is
/// the permission order; every hierarchy check is a comparison on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

/// Invitation request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "rejected" => Some(InviteStatus::Rejected),
            _ => None,
        }
    }
}

/// Canonical conversation record shared by all participants.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: Kind,
    pub title: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Canonical message, immutable once sent. `quote_id` is a weak reference:
/// withdrawing the quoted message resolves it to `None`, never a dangling id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: String,
    pub text: String,
    pub quote_id: Option<Uuid>,
    pub sent_at: i64,
}

/// Per-(user, conversation) projection: personal unread counter, visible
/// message set, group role, alias and kick flag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct View {
    pub conversation_id: Uuid,
    pub user_id: String,
    /// `None` for private conversations.
    pub role: Option<Role>,
    pub is_kicked: bool,
    pub unread_count: u32,
    pub alias: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Group invitation request. One live request per (group, invitee).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub conversation_id: Uuid,
    pub from_user: String,
    pub to_user: String,
    pub message: String,
    pub status: InviteStatus,
    pub created_at: i64,
}

/// Append-only group announcement.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author_id: String,
    pub text: String,
    pub created_at: i64,
}

/// Membership snapshot of a group, derived from its live views.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: Uuid,
    pub title: Option<String>,
    pub owner: String,
    pub admins: Vec<String>,
    pub members: Vec<String>,
}

/// One entry of a user's conversation list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub role: Option<Role>,
    pub alias: Option<String>,
    pub unread_count: u32,
    pub last_message: Option<String>,
}
