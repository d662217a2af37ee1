use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of the derived thread key. One thread exists per partition.
pub const THREAD_ID_PREFIX: &str = "thread_";

/// Derive the thread key for a partition.
pub fn thread_id_for(partition_id: &str) -> String {
    format!("{}{}", THREAD_ID_PREFIX, partition_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// A chat message in a partition.
///
/// Soft-deleted messages keep their row until compaction removes them;
/// they are hidden from ordinary reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(alias = "projectId")]
    pub partition_id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// A plain text message with a generated id. The sender id doubles as
    /// the display name until [`Message::with_sender_name`] sets one.
    pub fn text(
        partition_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let sender_id = sender_id.into();
        Self {
            id: crate::generate_id(),
            content: content.into(),
            sender_name: sender_id.clone(),
            sender_id,
            sender_avatar: None,
            partition_id: partition_id.into(),
            timestamp,
            kind: MessageKind::Text,
            mentions: Vec::new(),
            reply_to: None,
            edited: false,
            edited_at: None,
            deleted: false,
            deleted_at: None,
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reject messages that cannot be stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("message id is empty".into());
        }
        if self.partition_id.is_empty() {
            return Err(format!("message {} has no partition", self.id));
        }
        if self.edited {
            match self.edited_at {
                Some(at) if at >= self.timestamp => {}
                Some(at) => {
                    return Err(format!(
                        "message {} edited at {} before creation at {}",
                        self.id, at, self.timestamp
                    ));
                }
                None => return Err(format!("message {} is edited without editedAt", self.id)),
            }
        }
        if self.deleted && self.deleted_at.is_none() {
            return Err(format!("message {} is deleted without deletedAt", self.id));
        }
        Ok(())
    }

    /// Case-insensitive substring match over content and sender name.
    /// `needle` must already be lowercase.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self.sender_name.to_lowercase().contains(needle)
    }
}

/// An audit/activity entry. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    #[serde(alias = "userId")]
    pub actor_id: String,
    #[serde(alias = "userName")]
    pub actor_name: String,
    #[serde(default, alias = "userAvatar", skip_serializing_if = "Option::is_none")]
    pub actor_avatar: Option<String>,
    #[serde(alias = "projectId")]
    pub partition_id: String,
    pub action: String,
    #[serde(alias = "target")]
    pub target_kind: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ActivityRecord {
    pub fn new(
        partition_id: impl Into<String>,
        actor_id: impl Into<String>,
        action: impl Into<String>,
        target_kind: impl Into<String>,
        target_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let actor_id = actor_id.into();
        Self {
            id: crate::generate_id(),
            actor_name: actor_id.clone(),
            actor_id,
            actor_avatar: None,
            partition_id: partition_id.into(),
            action: action.into(),
            target_kind: target_kind.into(),
            target_id: target_id.into(),
            target_name: None,
            timestamp,
            description: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("activity id is empty".into());
        }
        if self.partition_id.is_empty() {
            return Err(format!("activity {} has no partition", self.id));
        }
        Ok(())
    }
}

/// Denormalized per-partition summary, maintained alongside message writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationThread {
    pub id: String,
    #[serde(alias = "projectId")]
    pub partition_id: String,
    /// Every sender ever observed, in first-seen order. Never shrinks.
    pub participants: Vec<String>,
    pub last_message_id: String,
    pub last_message_timestamp: i64,
    pub message_count: u64,
    #[serde(default)]
    pub unread_count: BTreeMap<String, u64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConversationThread {
    /// A thread seeded from the first message of its partition.
    pub fn started_by(message: &Message) -> Self {
        Self {
            id: thread_id_for(&message.partition_id),
            partition_id: message.partition_id.clone(),
            participants: vec![message.sender_id.clone()],
            last_message_id: message.id.clone(),
            last_message_timestamp: message.timestamp,
            message_count: 1,
            unread_count: BTreeMap::new(),
            created_at: message.timestamp,
            updated_at: message.timestamp,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Returns true if the participant was newly added.
    pub fn add_participant(&mut self, user_id: &str) -> bool {
        if self.has_participant(user_id) {
            return false;
        }
        self.participants.push(user_id.to_string());
        true
    }

    pub fn unread_for(&self, user_id: &str) -> u64 {
        self.unread_count.get(user_id).copied().unwrap_or(0)
    }
}
