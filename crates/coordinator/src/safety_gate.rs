//! The safety gate. Runs before anything else sees a turn.
//!
//! Stages, in order:
//! 1. Crisis keyword pre-filter (no model call)
//! 2. PHQ-9 item 9 (no model call)
//! 3. Safety model sentinel check in the isolated safety channel
//!
//! The gate never returns an error. A model failure or any output that is
//! not exactly the safe sentinel escalates.

use std::sync::Arc;

use tracing::{debug, warn};
use withyou_common::{MessageRole, TurnInput};
use withyou_llm::{ChatMessage, LlmClient, LlmRequest};
use withyou_memory::{SessionKey, SessionStore, TurnRecord};
use withyou_tools::{CrisisDetector, ResourceDirectory, Urgency};

use crate::routing::{SafetyAssessment, SafetySource, SafetyVerdict};

/// Model output meaning "no risk".
pub const SAFE_SENTINEL: &str = "SAFE";

/// Model output marker meaning "escalate".
pub const ESCALATE_SENTINEL: &str = "ESCALATE_CRISIS";

const SAFETY_AGENT_ID: &str = "safety_gate";

const SAFETY_SYSTEM_PROMPT: &str = r#"You are a safety screener for a mental-wellness assistant. You do not chat with the user.

Read the user's latest message and decide whether it shows any risk of self-harm, suicide, harm to others, abuse or a medical emergency.

- If there is no such risk, answer with exactly: SAFE
- If there is any risk, answer with ESCALATE_CRISIS on the first line, followed by one or two warm, calm sentences addressed to the user that acknowledge what they shared.

Never answer anything else. When unsure, escalate."#;

pub struct SafetyGate {
    detector: CrisisDetector,
    directory: ResourceDirectory,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<SessionStore>,
    default_locale: String,
}

impl SafetyGate {
    pub fn new(
        detector: CrisisDetector,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<SessionStore>,
        default_locale: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            directory: ResourceDirectory,
            llm,
            sessions,
            default_locale: default_locale.into(),
        }
    }

    /// Assess one turn.
    pub async fn assess(&self, turn: &TurnInput) -> SafetyAssessment {
        let key = SessionKey::safety(&turn.user_id, &turn.conversation_id);
        let history = self.sessions.history(&key).await;
        self.sessions
            .append(&key, TurnRecord::user(&turn.turn_id, &turn.text))
            .await;

        let assessment = match self.screen(turn) {
            Some(assessment) => assessment,
            None => self.model_check(turn, &history).await,
        };

        self.record_verdict(&key, turn, &assessment).await;
        assessment
    }

    /// The stages that need no model: the keyword pre-filter, then PHQ-9
    /// item 9. `None` means neither fired.
    pub fn screen(&self, turn: &TurnInput) -> Option<SafetyAssessment> {
        if let Some(pattern) = self.detector.detect(&turn.text) {
            debug!(turn_id = %turn.turn_id, pattern, "Crisis pre-filter matched");
            return Some(self.escalate(turn, SafetySource::Prefilter, None));
        }
        if turn
            .metadata
            .phq9
            .as_ref()
            .is_some_and(|answers| answers.self_harm_item() > 0)
        {
            return Some(self.escalate(turn, SafetySource::Questionnaire, None));
        }
        None
    }

    /// Screen a turn whose text cannot be handled normally (empty or over
    /// length). Only an escalation is logged to the safety channel, with
    /// `stored_text` in place of the full text.
    pub async fn screen_rejected(
        &self,
        turn: &TurnInput,
        stored_text: &str,
    ) -> Option<SafetyAssessment> {
        let assessment = self.screen(turn)?;
        let key = SessionKey::safety(&turn.user_id, &turn.conversation_id);
        self.sessions
            .append(&key, TurnRecord::user(&turn.turn_id, stored_text))
            .await;
        self.record_verdict(&key, turn, &assessment).await;
        Some(assessment)
    }

    async fn record_verdict(&self, key: &SessionKey, turn: &TurnInput, assessment: &SafetyAssessment) {
        let verdict = match assessment.verdict {
            SafetyVerdict::Safe => SAFE_SENTINEL,
            SafetyVerdict::Escalate => ESCALATE_SENTINEL,
        };
        self.sessions
            .append(
                key,
                TurnRecord::assistant(&turn.turn_id, SAFETY_AGENT_ID, verdict),
            )
            .await;
    }

    async fn model_check(&self, turn: &TurnInput, history: &[TurnRecord]) -> SafetyAssessment {
        let messages = history
            .iter()
            .filter_map(|r| match r.role {
                MessageRole::User => Some(ChatMessage::user(&r.content)),
                MessageRole::Assistant => Some(ChatMessage::assistant(&r.content)),
                MessageRole::System | MessageRole::Tool => None,
            })
            .collect();
        let request = LlmRequest::with_history(SAFETY_SYSTEM_PROMPT, messages, &turn.text)
            .temperature(0.0)
            .max_tokens(256);

        match self.llm.complete(request).await {
            Ok(response) => match interpret_safety_output(&response.content) {
                ModelSafety::Safe => SafetyAssessment::safe(),
                ModelSafety::Escalate(message) => {
                    self.escalate(turn, SafetySource::Model, message)
                }
                ModelSafety::Ambiguous => {
                    warn!(
                        turn_id = %turn.turn_id,
                        model = %self.llm.model_name(),
                        "Ambiguous safety output, failing closed"
                    );
                    self.escalate(turn, SafetySource::FailClosed, None)
                }
            },
            Err(e) => {
                warn!(
                    turn_id = %turn.turn_id,
                    error = %e,
                    "Safety model unavailable, failing closed"
                );
                self.escalate(turn, SafetySource::FailClosed, None)
            }
        }
    }

    fn escalate(
        &self,
        turn: &TurnInput,
        source: SafetySource,
        message: Option<String>,
    ) -> SafetyAssessment {
        let locale = turn
            .metadata
            .locale
            .as_deref()
            .unwrap_or(&self.default_locale);
        SafetyAssessment {
            verdict: SafetyVerdict::Escalate,
            source,
            message,
            resources: self.directory.lookup(Some(locale), Urgency::Immediate),
        }
    }
}

/// What the safety model said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSafety {
    Safe,
    /// Escalation with the model's message to the user, if it wrote one.
    Escalate(Option<String>),
    Ambiguous,
}

/// Read the safety model output.
///
/// The escalation marker wins wherever it appears. Otherwise the output must
/// normalize to exactly the safe sentinel; anything else is ambiguous.
pub fn interpret_safety_output(raw: &str) -> ModelSafety {
    if raw.contains(ESCALATE_SENTINEL) {
        let message = raw.replace(ESCALATE_SENTINEL, "");
        let message = message.trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-');
        return ModelSafety::Escalate((!message.is_empty()).then(|| message.to_string()));
    }

    let normalized = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
        .trim();
    if normalized.eq_ignore_ascii_case(SAFE_SENTINEL) {
        ModelSafety::Safe
    } else {
        ModelSafety::Ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use withyou_common::{Phq9Answers, WithYouError};
    use withyou_llm::ScriptedClient;
    use withyou_memory::MemoryConfig;

    fn gate(llm: Arc<ScriptedClient>) -> (SafetyGate, Arc<SessionStore>) {
        let sessions = Arc::new(SessionStore::new(MemoryConfig::default()));
        let gate = SafetyGate::new(
            CrisisDetector::new(&["no way out".to_string()]).unwrap(),
            llm,
            sessions.clone(),
            "global",
        );
        (gate, sessions)
    }

    #[test]
    fn test_interprets_sentinels() {
        assert_eq!(interpret_safety_output("SAFE"), ModelSafety::Safe);
        assert_eq!(interpret_safety_output("  safe.\n"), ModelSafety::Safe);
        assert_eq!(interpret_safety_output("\"SAFE\""), ModelSafety::Safe);
        assert_eq!(interpret_safety_output("ESCALATE_CRISIS"), ModelSafety::Escalate(None));
        assert_eq!(
            interpret_safety_output("ESCALATE_CRISIS\nI'm worried about you."),
            ModelSafety::Escalate(Some("I'm worried about you.".into()))
        );
    }

    #[test]
    fn test_anything_else_is_ambiguous() {
        assert_eq!(interpret_safety_output(""), ModelSafety::Ambiguous);
        assert_eq!(interpret_safety_output("It seems safe to me"), ModelSafety::Ambiguous);
        assert_eq!(interpret_safety_output("UNSAFE"), ModelSafety::Ambiguous);
        assert_eq!(interpret_safety_output("{\"verdict\":\"safe\"}"), ModelSafety::Ambiguous);
    }

    #[tokio::test]
    async fn test_prefilter_escalates_without_model() {
        let llm = Arc::new(ScriptedClient::fixed("safety", "SAFE"));
        let (gate, _) = gate(llm.clone());

        let turn = TurnInput::new("u1", "c1", "There is no way out for me").with_locale("in");
        let assessment = gate.assess(&turn).await;
        assert!(assessment.is_escalation());
        assert_eq!(assessment.source, SafetySource::Prefilter);
        assert!(assessment.resources.iter().any(|r| r.name == "Tele-MANAS"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_phq9_item_nine_escalates_without_model() {
        let llm = Arc::new(ScriptedClient::fixed("safety", "SAFE"));
        let (gate, _) = gate(llm.clone());

        let turn = TurnInput::new("u1", "c1", "Here are my answers")
            .with_phq9(Phq9Answers::new([1, 1, 0, 0, 0, 0, 0, 0, 1]).unwrap());
        let assessment = gate.assess(&turn).await;
        assert_eq!(assessment.source, SafetySource::Questionnaire);
        assert!(!assessment.resources.is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_screen_never_calls_the_model() {
        let llm = Arc::new(ScriptedClient::fixed("safety", "SAFE"));
        let (gate, sessions) = gate(llm.clone());

        assert!(gate.screen(&TurnInput::new("u1", "c1", "I had a long day")).is_none());
        let over_long = format!("{} I want to kill myself", "blah ".repeat(3000));
        let turn = TurnInput::new("u1", "c1", over_long).with_turn_id("t1");
        let assessment = gate.screen_rejected(&turn, "stored").await.unwrap();
        assert_eq!(assessment.source, SafetySource::Prefilter);
        assert_eq!(llm.call_count(), 0);

        let log = sessions.transcript(&SessionKey::safety("u1", "c1")).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "stored");
        assert_eq!(log[1].content, ESCALATE_SENTINEL);
    }

    #[tokio::test]
    async fn test_model_error_fails_closed() {
        let llm = Arc::new(ScriptedClient::new("safety", |_| {
            Err(WithYouError::RetriesExhausted {
                attempts: 3,
                last_error: "HTTP 503".into(),
            })
        }));
        let (gate, _) = gate(llm);

        let assessment = gate.assess(&TurnInput::new("u1", "c1", "hello")).await;
        assert!(assessment.is_escalation());
        assert_eq!(assessment.source, SafetySource::FailClosed);
        assert!(!assessment.resources.is_empty());
    }

    #[tokio::test]
    async fn test_safety_channel_is_separate_from_main() {
        let llm = Arc::new(ScriptedClient::fixed("safety", "SAFE"));
        let (gate, sessions) = gate(llm.clone());

        let first = TurnInput::new("u1", "c1", "I had a long day").with_turn_id("t1");
        let second = TurnInput::new("u1", "c1", "Work was stressful").with_turn_id("t2");
        assert!(!gate.assess(&first).await.is_escalation());
        assert!(!gate.assess(&second).await.is_escalation());

        assert_eq!(sessions.len(&SessionKey::safety("u1", "c1")).await, 4);
        assert!(sessions.is_empty(&SessionKey::main("u1", "c1")).await);

        // The second call sees the first exchange as history.
        let sent = llm.requests();
        assert_eq!(sent[1].messages.len(), 3);
        assert_eq!(sent[1].messages[1].content, SAFE_SENTINEL);
    }
}
