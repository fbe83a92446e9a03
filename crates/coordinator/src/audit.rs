//! Audit trail events on the `audit` tracing target.
//!
//! Events carry identifiers and decisions only, never turn text.

use tracing::{info, warn};
use withyou_common::TurnInput;

use crate::routing::{SafetyAssessment, TriageVerdict};

pub fn safety_decision(turn: &TurnInput, assessment: &SafetyAssessment) {
    if assessment.is_escalation() {
        warn!(
            target: "audit",
            user_id = %turn.user_id,
            conversation_id = %turn.conversation_id,
            turn_id = %turn.turn_id,
            source = %assessment.source,
            resources = assessment.resources.len(),
            "Crisis escalation"
        );
    } else {
        info!(
            target: "audit",
            user_id = %turn.user_id,
            conversation_id = %turn.conversation_id,
            turn_id = %turn.turn_id,
            "Safety cleared"
        );
    }
}

pub fn routing_decision(turn: &TurnInput, verdict: &TriageVerdict, agent: &str) {
    info!(
        target: "audit",
        user_id = %turn.user_id,
        turn_id = %turn.turn_id,
        path = %verdict.label,
        fallback = verdict.fallback,
        agent,
        "Turn routed"
    );
}

pub fn specialist_failed(turn: &TurnInput, agent: &str, error: &dyn std::fmt::Display) {
    warn!(
        target: "audit",
        user_id = %turn.user_id,
        turn_id = %turn.turn_id,
        agent,
        error = %error,
        "Specialist failed, replying with referral"
    );
}
