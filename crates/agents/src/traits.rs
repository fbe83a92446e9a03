//! Specialist trait and the request/reply types shared by every specialist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use withyou_common::{MessageRole, Result, TurnInput};
use withyou_llm::ChatMessage;
use withyou_memory::TurnRecord;
use withyou_tools::{ToolContext, ToolOutput};

/// Configuration for specialist creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    /// Specialist ID, reported as `agent` in replies
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Custom system prompt (optional, uses default if not set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl SpecialistConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Everything a specialist may see for one safety-cleared turn.
#[derive(Debug, Clone)]
pub struct SpecialistRequest {
    pub turn: TurnInput,

    /// Prior main-channel records of this conversation, oldest first.
    pub history: Vec<TurnRecord>,

    /// Clock for relative scheduling.
    pub now: DateTime<Utc>,
}

impl SpecialistRequest {
    pub fn new(turn: TurnInput, history: Vec<TurnRecord>) -> Self {
        Self {
            turn,
            history,
            now: Utc::now(),
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(&self.turn.user_id, &self.turn.turn_id)
            .with_locale(self.turn.metadata.locale.clone())
            .with_now(self.now)
    }

    /// History as chat messages. Only user and assistant records are kept.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.history
            .iter()
            .filter_map(|r| match r.role {
                MessageRole::User => Some(ChatMessage::user(&r.content)),
                MessageRole::Assistant => Some(ChatMessage::assistant(&r.content)),
                MessageRole::System | MessageRole::Tool => None,
            })
            .collect()
    }
}

/// A tool call that was executed on behalf of a specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
    pub result: ToolOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistReply {
    pub agent: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocation>,
}

impl SpecialistReply {
    pub fn text(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
            tool_call: None,
        }
    }
}

/// A specialist that handles a turn once safety and triage have cleared it.
#[async_trait]
pub trait Specialist: Send + Sync {
    /// Get the specialist's unique identifier.
    fn id(&self) -> &str;

    /// Get the specialist's human-readable name.
    fn name(&self) -> &str;

    /// Tools this specialist may call. Anything else is refused.
    fn allowed_tools(&self) -> &[&'static str];

    fn may_use(&self, tool: &str) -> bool {
        self.allowed_tools().contains(&tool)
    }

    /// Get the specialist's system prompt.
    fn system_prompt(&self) -> &str;

    async fn respond(&self, request: &SpecialistRequest) -> Result<SpecialistReply>;
}
