//! Session log types and configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use withyou_common::{MessageRole, now_millis};

/// Which log a record belongs to. The safety gate writes to its own
/// channel so screening prompts never leak into specialist history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChannel {
    Main,
    Safety,
}

/// Identity of one append-only session log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub conversation_id: String,
    pub channel: SessionChannel,
}

impl SessionKey {
    pub fn main(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            channel: SessionChannel::Main,
        }
    }

    pub fn safety(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            channel: SessionChannel::Safety,
        }
    }

    /// The same conversation on the other channel.
    pub fn with_channel(&self, channel: SessionChannel) -> Self {
        Self {
            channel,
            ..self.clone()
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel = match self.channel {
            SessionChannel::Main => "main",
            SessionChannel::Safety => "safety",
        };
        write!(f, "{}/{}/{}", self.user_id, self.conversation_id, channel)
    }
}

/// One entry in a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: String,

    pub role: MessageRole,

    pub content: String,

    /// Agent that produced an assistant record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Creation timestamp (Unix millis)
    pub created_at: u64,
}

impl TurnRecord {
    pub fn user(turn_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            role: MessageRole::User,
            content: content.into(),
            agent: None,
            created_at: now_millis(),
        }
    }

    pub fn assistant(
        turn_id: impl Into<String>,
        agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            turn_id: turn_id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            agent: Some(agent.into()),
            created_at: now_millis(),
        }
    }
}

/// Configuration for the session log and recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Records handed to a model as conversation history.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Earlier records surfaced by recall.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Upper bound on the recall context, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_max_history_turns() -> usize {
    20
}

fn default_recall_limit() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    1_500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            recall_limit: default_recall_limit(),
            max_context_chars: default_max_context_chars(),
        }
    }
}
