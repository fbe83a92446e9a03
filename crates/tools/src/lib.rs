//! Deterministic tools for the withyou agents.
//!
//! Tools never fail across the agent boundary: every outcome, including bad
//! arguments, is a structured [`ToolOutput`] the calling agent can read.
//!
//! - **resource_lookup**: vetted crisis resources by locale
//! - **log_mood**: bounded mood scale with idempotent writes
//! - **schedule_activity**: timestamp normalization and idempotent booking
//! - **symptom_checker**: non-diagnostic keyword heuristic

pub mod clinical;
pub mod crisis;
pub mod mood;
pub mod registry;
pub mod scheduler;

pub use clinical::{
    Phq9Score, Phq9Severity, SymptomAssessment, SymptomCheckerTool, SymptomSeverity,
    check_symptoms, score_phq9,
};
pub use crisis::{CrisisDetector, CrisisResource, ResourceDirectory, ResourceLookupTool, Urgency};
pub use mood::{LogMoodTool, MoodEntry, MoodLog, MoodTrend, TrendStatus};
pub use registry::ToolRegistry;
pub use scheduler::{
    Calendar, CalendarEvent, Frequency, InMemoryCalendar, LedgerCalendar, ScheduleActivityTool,
    ServiceAccount, load_service_account,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace for identifiers derived from turn content (UUID v5).
pub const ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f1d_2c3a_8b4e_4f7a_9c0d_1e2f_3a4b_5c6d);

/// Per-call context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub turn_id: String,
    pub locale: Option<String>,
    /// Clock used for relative timestamps.
    pub now: DateTime<Utc>,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            turn_id: turn_id.into(),
            locale: None,
            now: Utc::now(),
        }
    }

    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Stable identifier for a side effect of this turn.
    pub fn derive_id(&self, kind: &str, discriminator: &str) -> String {
        let name = format!("{kind}:{}:{}:{discriminator}", self.user_id, self.turn_id);
        format!(
            "{kind}_{}",
            uuid::Uuid::new_v5(&ID_NAMESPACE, name.as_bytes()).simple()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    InvalidArgument,
    NotFound,
    Unavailable,
    Internal,
}

/// Structured tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutput {
    Success { data: Value },
    Error { code: ToolErrorCode, message: String },
}

impl ToolOutput {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Error {
            code: ToolErrorCode::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn error(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A deterministic function callable by an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn schema(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput;

    /// Function definition in the chat-completions `tools` shape.
    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.schema(),
            }
        })
    }
}

/// Deserialize tool arguments, turning failures into an `invalid_argument`
/// payload.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> std::result::Result<T, ToolOutput> {
    serde_json::from_value(args).map_err(|e| ToolOutput::invalid(format!("Invalid arguments: {e}")))
}

/// JSON schema for an argument type.
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}
