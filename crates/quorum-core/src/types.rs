use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifies one conversation: a channel plus the thread (or root message)
/// inside it. Renders as `conv:<channel>:<root>` for storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId {
    pub channel_id: String,
    pub thread_root: String,
}

impl ConversationId {
    pub fn new(channel_id: impl Into<String>, thread_root: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_root: thread_root.into(),
        }
    }

    /// Canonical storage-key prefix for this conversation.
    pub fn key(&self) -> String {
        format!("conv:{}:{}", self.channel_id, self.thread_root)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.thread_root)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Transcript prefix ("User" / "Assistant").
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// Platform metadata about a turn's author, used by the token accountant to
/// decide the speaker label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorMeta {
    pub name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

/// A single chat message, user or assistant. Immutable once committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub conversation_id: ConversationId,
    pub speaker: Speaker,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: AuthorMeta,
}

impl Turn {
    pub fn user(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            conversation_id,
            speaker: Speaker::User,
            text: text.into(),
            created_at: Utc::now(),
            author: AuthorMeta::default(),
        }
    }

    pub fn assistant(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            conversation_id,
            speaker: Speaker::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            author: AuthorMeta {
                name: None,
                is_bot: true,
            },
        }
    }
}

/// Profile of the requesting user, injected into planning and synthesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
}

/// Where the request came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelContext {
    pub channel_name: Option<String>,
    #[serde(default)]
    pub is_direct: bool,
}

/// One request into the orchestration engine.
///
/// The cancellation token is observed at every suspension point; cloning the
/// request clones the token, so children share the same cancel signal.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub conversation_id: ConversationId,
    pub user_text: String,
    pub user_profile: UserProfile,
    pub channel_context: ChannelContext,
    pub cancel: CancellationToken,
}

impl EngineRequest {
    pub fn new(conversation_id: ConversationId, user_text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            user_text: user_text.into(),
            user_profile: UserProfile::default(),
            channel_context: ChannelContext::default(),
            cancel: CancellationToken::new(),
        }
    }
}
