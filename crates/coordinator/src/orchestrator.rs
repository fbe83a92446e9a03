//! Turn orchestration: safety, then triage, then one specialist.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use withyou_agents::{
    ClinicianAgent, CoachAgent, PlannerAgent, ReferralAgent, Specialist, SpecialistRequest,
};
use withyou_common::security::{
    MAX_TURN_TEXT_LENGTH, neutralize_control_chars, sanitize_turn_text, truncate,
};
use withyou_common::{Result, TurnInput, WithYouError};
use withyou_llm::{ModelClients, build_model_clients};
use withyou_memory::{MemoryRetriever, SessionKey, SessionStore, TurnRecord};
use withyou_tools::{
    Calendar, CrisisDetector, MoodLog, SymptomSeverity, ToolRegistry, TrendStatus,
    check_symptoms, score_phq9,
};

use crate::audit;
use crate::config::WithYouConfig;
use crate::routing::{
    LIMITS_NOTICE, SafetyAssessment, TriageLabel, TriageSignals, TriageVerdict, TurnOutcome,
};
use crate::safety_gate::SafetyGate;
use crate::triage_agent::TriageAgent;

/// Days of mood history considered for the trend signal.
const MOOD_TREND_WINDOW_DAYS: i64 = 7;

const SAFETY_AGENT_ID: &str = "safety_gate";

/// Closed-set dispatch table from triage label to specialist.
#[derive(Clone)]
pub struct Specialists {
    pub coach: Arc<dyn Specialist>,
    pub plan: Arc<dyn Specialist>,
    pub refer: Arc<dyn Specialist>,
    pub clinician: Arc<dyn Specialist>,
}

impl Specialists {
    pub fn for_label(&self, label: TriageLabel) -> &Arc<dyn Specialist> {
        match label {
            TriageLabel::Coach => &self.coach,
            TriageLabel::Plan => &self.plan,
            TriageLabel::Refer => &self.refer,
            TriageLabel::Clinician => &self.clinician,
        }
    }
}

/// Runs turns end to end.
///
/// Turns of one conversation are serialized; different conversations run
/// concurrently. A turn reaches a specialist only after the safety gate
/// cleared that same turn.
pub struct Orchestrator {
    gate: SafetyGate,
    triage: TriageAgent,
    specialists: Specialists,
    sessions: Arc<SessionStore>,
    mood_log: Arc<MoodLog>,
    session_locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    /// Build everything from configuration. `lookup` resolves environment
    /// variables; missing secrets are configuration errors.
    pub fn from_config<F>(config: &WithYouConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = config.llm.resolve_api_key(&lookup)?;
        let clients = build_model_clients(&config.llm, &api_key)?;
        let calendar = config.calendar.build(&lookup)?;
        Self::with_clients(config, clients, calendar)
    }

    /// Build with caller-supplied model clients and calendar.
    pub fn with_clients(
        config: &WithYouConfig,
        clients: ModelClients,
        calendar: Arc<dyn Calendar>,
    ) -> Result<Self> {
        let sessions = Arc::new(SessionStore::new(config.session.clone()));
        let mood_log = Arc::new(MoodLog::new());
        let tools = ToolRegistry::standard(mood_log.clone(), calendar);

        let detector = CrisisDetector::new(&config.safety.extra_keywords)?;
        let gate = SafetyGate::new(
            detector,
            clients.safety.clone(),
            sessions.clone(),
            &config.default_locale,
        );
        let triage = TriageAgent::new(clients.routing.clone());

        let retriever = Arc::new(MemoryRetriever::new(sessions.clone()));
        let specialists = Specialists {
            coach: Arc::new(
                CoachAgent::with_default_config(clients.reasoning.clone(), tools.clone())
                    .with_memory(retriever),
            ),
            plan: Arc::new(PlannerAgent::with_default_config(
                clients.reasoning.clone(),
                tools.clone(),
            )),
            refer: Arc::new(ReferralAgent::with_default_config(tools.clone())),
            clinician: Arc::new(ClinicianAgent::with_default_config(
                clients.reasoning.clone(),
                tools,
            )),
        };

        info!(
            app = %config.app_name,
            safety_model = %clients.safety.model_name(),
            routing_model = %clients.routing.model_name(),
            reasoning_model = %clients.reasoning.model_name(),
            "Orchestrator ready"
        );

        Ok(Self {
            gate,
            triage,
            specialists,
            sessions,
            mood_log,
            session_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn mood_log(&self) -> &Arc<MoodLog> {
        &self.mood_log
    }

    pub async fn handle_turn(&self, turn: TurnInput) -> Result<TurnOutcome> {
        self.handle_turn_at(turn, Utc::now()).await
    }

    /// Run one turn with an explicit clock.
    ///
    /// Fails only on invalid input that screens clean, or when the referral
    /// fallback itself fails. Safety and triage problems are resolved to
    /// escalate and refer.
    #[instrument(skip_all, fields(turn_id = %turn.turn_id, user_id = %turn.user_id))]
    pub async fn handle_turn_at(&self, turn: TurnInput, now: DateTime<Utc>) -> Result<TurnOutcome> {
        let key = SessionKey::main(&turn.user_id, &turn.conversation_id);
        let lock = self.session_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.run_turn(turn, &key, now).await
        };
        drop(lock);
        self.release_session_lock(&key);
        outcome
    }

    async fn run_turn(
        &self,
        mut turn: TurnInput,
        key: &SessionKey,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        let raw = std::mem::take(&mut turn.text);
        turn.text = match sanitize_turn_text(&raw) {
            Ok(text) => text,
            Err(e) => return self.screen_rejected(turn, &raw, key, e).await,
        };

        let history: Vec<TurnRecord> = self
            .sessions
            .history(key)
            .await
            .into_iter()
            .filter(|r| r.turn_id != turn.turn_id)
            .collect();

        let assessment = self.gate.assess(&turn).await;
        audit::safety_decision(&turn, &assessment);

        if assessment.is_escalation() {
            return Ok(self.escalated(key, &turn, assessment).await);
        }

        let signals = self.signals(&turn, now);
        let mut verdict = self.triage.classify(&turn.text, &signals).await;

        let request = SpecialistRequest::new(turn.clone(), history).with_now(now);
        let specialist = self.specialists.for_label(verdict.label);
        audit::routing_decision(&turn, &verdict, specialist.id());

        let reply = match specialist.respond(&request).await {
            Ok(reply) => reply,
            Err(e) if verdict.label != TriageLabel::Refer => {
                audit::specialist_failed(&turn, specialist.id(), &e);
                verdict = TriageVerdict::fallback(format!("{} specialist failed", verdict.label));
                self.specialists.refer.respond(&request).await?
            }
            Err(e) => return Err(e),
        };

        self.record(key, &turn, &reply.agent, &reply.content).await;
        debug!(agent = %reply.agent, tool = ?reply.tool_call.as_ref().map(|c| &c.tool), "Turn handled");

        Ok(TurnOutcome::Handled {
            safety: assessment,
            triage: verdict,
            reply,
        })
    }

    /// Text that fails sanitizing still passes the model-free safety stages
    /// over its full length. Only a clean screen surfaces the input error.
    async fn screen_rejected(
        &self,
        mut turn: TurnInput,
        raw: &str,
        key: &SessionKey,
        error: WithYouError,
    ) -> Result<TurnOutcome> {
        turn.text = neutralize_control_chars(raw);
        let stored = truncate(turn.text.trim(), MAX_TURN_TEXT_LENGTH);

        let Some(assessment) = self.gate.screen_rejected(&turn, &stored).await else {
            return Err(error);
        };
        audit::safety_decision(&turn, &assessment);
        warn!(turn_id = %turn.turn_id, error = %error, "Invalid turn escalated by safety screen");

        turn.text = stored;
        Ok(self.escalated(key, &turn, assessment).await)
    }

    async fn escalated(
        &self,
        key: &SessionKey,
        turn: &TurnInput,
        assessment: SafetyAssessment,
    ) -> TurnOutcome {
        let outcome = TurnOutcome::Escalated {
            assessment,
            limits_notice: LIMITS_NOTICE.to_string(),
        };
        self.record(key, turn, SAFETY_AGENT_ID, &outcome.display_text())
            .await;
        outcome
    }

    fn session_lock(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once no turn holds or awaits it. Clones only
    /// happen under the map lock, so a count of one is final.
    fn release_session_lock(&self, key: &SessionKey) {
        let mut locks = self.session_locks.lock();
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    fn signals(&self, turn: &TurnInput, now: DateTime<Utc>) -> TriageSignals {
        let symptoms = check_symptoms(&turn.text);
        let trend = self
            .mood_log
            .trend(&turn.user_id, now, MOOD_TREND_WINDOW_DAYS);
        TriageSignals {
            phq9: turn.metadata.phq9.as_ref().map(score_phq9),
            symptom_severity: (symptoms.severity > SymptomSeverity::Low)
                .then_some(symptoms.severity),
            mood_trend: (trend.status != TrendStatus::InsufficientData).then_some(trend.status),
        }
    }

    async fn record(&self, key: &SessionKey, turn: &TurnInput, agent: &str, reply: &str) {
        self.sessions
            .append(key, TurnRecord::user(&turn.turn_id, &turn.text))
            .await;
        self.sessions
            .append(key, TurnRecord::assistant(&turn.turn_id, agent, reply))
            .await;
    }
}
