//! Model-backed triage router.
//!
//! # Security
//!
//! - Labels are validated against the closed set
//! - Rationale length is bounded
//! - Injection-like phrases in the user text are logged

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use withyou_agents::extract_json_object;
use withyou_common::security::{contains_injection_pattern, truncate};
use withyou_llm::{LlmClient, LlmRequest};

use crate::routing::{TriageLabel, TriageSignals, TriageVerdict};

/// Maximum length for the rationale field.
const MAX_RATIONALE_LENGTH: usize = 500;

const TRIAGE_SYSTEM_PROMPT: &str = r#"You are the triage router of a mental-wellness assistant. A safety screen has already cleared this message.

Decide which specialist should answer. Respond ONLY with a JSON object, no other text:

{"path": "coach|plan|refer|clinician", "rationale": "one short sentence"}

Paths:
- "coach": the user wants to talk through feelings, stress, worries or thoughts
- "plan": the user wants to plan or schedule an activity, habit or routine
- "refer": the user asks for professional help, therapy, helplines or services
- "clinician": the user wants a summary of the conversation for a doctor or therapist

Examples:

User: "I can't stop worrying about my exams"
{"path":"coach","rationale":"Exam anxiety the user wants to talk through"}

User: "Can you set up a 20 minute walk every evening?"
{"path":"plan","rationale":"Request to schedule a recurring activity"}

User: "Where can I find a therapist near me?"
{"path":"refer","rationale":"Asks for professional services"}

User: "Please write up what we discussed for my psychiatrist"
{"path":"clinician","rationale":"Asks for a clinician summary"}"#;

/// Chooses one specialist per safety-cleared turn.
///
/// Triage has no conversation history of its own. It never fails: anything
/// it cannot read becomes a `refer` fallback.
pub struct TriageAgent {
    llm: Arc<dyn LlmClient>,
}

impl TriageAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, text: &str, signals: &TriageSignals) -> TriageVerdict {
        if let Some(pattern) = contains_injection_pattern(text) {
            warn!(pattern, "Injection-like phrase in triage input");
        }

        let mut prompt = format!("Route this message:\n\n{text}");
        if !signals.is_empty() {
            prompt.push_str("\n\nSignals:\n");
            prompt.push_str(&signals.describe());
        }

        let request = LlmRequest::with_history(TRIAGE_SYSTEM_PROMPT, Vec::new(), prompt)
            .temperature(0.0)
            .max_tokens(200);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Triage model unavailable, falling back to refer");
                return TriageVerdict::fallback("Triage unavailable");
            }
        };
        debug!(response = %truncate(&response.content, 200), "Triage response");

        match parse_triage_output(&response.content) {
            Some(verdict) => {
                info!(path = %verdict.label, "Triage decision");
                verdict
            }
            None => {
                warn!(
                    output = %truncate(&response.content, 80),
                    "Triage output outside the closed set, falling back to refer"
                );
                TriageVerdict::fallback("Unrecognised triage output")
            }
        }
    }
}

/// Read the triage model output.
///
/// Accepts a JSON object with a `path` (or `route`/`label`) field anywhere
/// in the output, or a bare label. Returns `None` for anything outside the
/// closed set.
pub fn parse_triage_output(raw: &str) -> Option<TriageVerdict> {
    if let Some(json) = extract_json_object(raw) {
        let parsed: Value = serde_json::from_str(json).ok()?;
        let label = ["path", "route", "label"]
            .iter()
            .find_map(|field| parsed.get(*field).and_then(Value::as_str))
            .and_then(TriageLabel::parse)?;
        let rationale = parsed
            .get("rationale")
            .or_else(|| parsed.get("reasoning"))
            .and_then(Value::as_str)
            .unwrap_or("No rationale provided");
        return Some(TriageVerdict {
            label,
            rationale: truncate(rationale, MAX_RATIONALE_LENGTH),
            fallback: false,
        });
    }

    let bare = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.');
    TriageLabel::parse(bare).map(|label| TriageVerdict {
        label,
        rationale: "No rationale provided".into(),
        fallback: false,
    })
}
