//! Planner specialist - behavioural activation and activity scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use withyou_common::Result;
use withyou_llm::LlmClient;
use withyou_tools::{ToolOutput, ToolRegistry};

use crate::runner::run_model_turn;
use crate::traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest, ToolInvocation};

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a behavioural activation planner. Your role is to:

1. Help the user pick one small, achievable activity that lifts their mood
2. Make it concrete: what, when and for how long
3. Schedule it with schedule_activity once the user agrees on a time

Times must be given as "YYYY-MM-DDTHH:MM" in UTC or "HH:MM".
Prefer 10 to 30 minute activities. Be encouraging, never pushy.
"#;

const PLANNER_TOOLS: &[&str] = &["schedule_activity"];

/// Behavioural activation planner.
pub struct PlannerAgent {
    config: SpecialistConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
}

impl PlannerAgent {
    pub fn new(config: SpecialistConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self { config, llm, tools }
    }

    pub fn with_default_config(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        let mut config = SpecialistConfig::new("behavioral_planner", "Behavioural Planner");
        config.temperature = 0.4;
        Self::new(config, llm, tools)
    }
}

/// Human-readable confirmation of a scheduling result.
fn confirmation(invocation: &ToolInvocation) -> Option<String> {
    match &invocation.result {
        ToolOutput::Success { data } => {
            let verb = if data["created"].as_bool().unwrap_or(false) {
                "Scheduled"
            } else {
                "Already scheduled"
            };
            Some(format!(
                "{verb}: \"{}\" from {} to {} (event {}).",
                data["activity"].as_str().unwrap_or_default(),
                data["start"].as_str().unwrap_or_default(),
                data["end"].as_str().unwrap_or_default(),
                data["event_id"].as_str().unwrap_or_default(),
            ))
        }
        ToolOutput::Error { message, .. } => Some(format!(
            "I couldn't put that on your calendar ({message}). Could you give me a time like 18:30 or 2026-05-05T18:30?"
        )),
    }
}

#[async_trait]
impl Specialist for PlannerAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn allowed_tools(&self) -> &[&'static str] {
        PLANNER_TOOLS
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(PLANNER_SYSTEM_PROMPT)
    }

    async fn respond(&self, request: &SpecialistRequest) -> Result<SpecialistReply> {
        info!(
            agent = %self.id(),
            turn_id = %request.turn.turn_id,
            "Planning turn"
        );

        let mut reply = run_model_turn(
            self,
            &self.config,
            self.llm.as_ref(),
            &self.tools,
            request,
            &request.turn.text,
            None,
        )
        .await?;

        if let Some(line) = reply.tool_call.as_ref().and_then(confirmation) {
            reply.content = format!("{}\n\n{line}", reply.content);
        }
        Ok(reply)
    }
}
