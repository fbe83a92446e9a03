//! Clinician bridge - consent-gated, PII-redacted handoff notes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use withyou_common::security::redact_pii;
use withyou_common::{MessageRole, Result};
use withyou_llm::LlmClient;
use withyou_tools::ToolRegistry;

use crate::runner::run_model_turn;
use crate::traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest};

const CLINICIAN_SYSTEM_PROMPT: &str = r#"You prepare a brief handoff note for a licensed clinician from a de-identified wellness conversation.

Write it in SOAP form:
S (Subjective): what the user reports, in their words where possible
O (Objective): observable facts from the conversation only
A (Assessment): patterns worth attention, without diagnosing
P (Plan): suggested next steps for the clinician to consider

Never invent details. Never include names, contact details or locations.
Placeholders such as [NAME] or [EMAIL] must stay as they are.
"#;

pub const CONSENT_REQUEST: &str = "I can prepare a short summary of our conversation for a \
     clinician, with names and contact details removed. I'll only do that with your permission. \
     If you'd like me to, please confirm that you consent to sharing it.";

/// Produces a SOAP-style note only when the user consented to sharing.
pub struct ClinicianAgent {
    config: SpecialistConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
}

impl ClinicianAgent {
    pub fn new(config: SpecialistConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self { config, llm, tools }
    }

    pub fn with_default_config(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        let mut config = SpecialistConfig::new("clinician_bridge", "Clinician Bridge");
        config.temperature = 0.2;
        Self::new(config, llm, tools)
    }
}

/// The conversation so far plus the current message, redacted.
fn redacted_transcript(request: &SpecialistRequest) -> String {
    let mut lines: Vec<String> = request
        .history
        .iter()
        .filter_map(|r| {
            let speaker = match r.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System | MessageRole::Tool => return None,
            };
            Some(format!("{speaker}: {}", redact_pii(&r.content)))
        })
        .collect();
    lines.push(format!("User: {}", redact_pii(&request.turn.text)));
    lines.join("\n")
}

#[async_trait]
impl Specialist for ClinicianAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn allowed_tools(&self) -> &[&'static str] {
        &[]
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(CLINICIAN_SYSTEM_PROMPT)
    }

    async fn respond(&self, request: &SpecialistRequest) -> Result<SpecialistReply> {
        if !request.turn.metadata.consent_to_share {
            info!(
                agent = %self.id(),
                turn_id = %request.turn.turn_id,
                "No consent to share, asking first"
            );
            return Ok(SpecialistReply::text(self.id(), CONSENT_REQUEST));
        }

        info!(
            target: "audit",
            agent = %self.id(),
            user_id = %request.turn.user_id,
            turn_id = %request.turn.turn_id,
            "Preparing clinician handoff with consent"
        );

        // The raw history must not reach the model; only the redacted
        // transcript does.
        let redacted_request = SpecialistRequest {
            turn: request.turn.clone(),
            history: Vec::new(),
            now: request.now,
        };
        let transcript = redacted_transcript(request);
        let prompt = format!("Conversation transcript:\n\n{transcript}\n\nWrite the handoff note.");

        let mut reply = run_model_turn(
            self,
            &self.config,
            self.llm.as_ref(),
            &self.tools,
            &redacted_request,
            &prompt,
            None,
        )
        .await?;
        reply.content = redact_pii(&reply.content);
        Ok(reply)
    }
}
