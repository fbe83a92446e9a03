//! Safety and triage decision types, and the per-turn outcome.

use std::fmt;

use serde::{Deserialize, Serialize};
use withyou_agents::SpecialistReply;
use withyou_tools::{CrisisResource, Phq9Score, SymptomSeverity, TrendStatus};

/// Always shown alongside crisis resources.
pub const LIMITS_NOTICE: &str = "I'm an AI wellness companion, not a crisis service or a \
     substitute for professional care, and I can't contact anyone on your behalf. If you are \
     in immediate danger, please call your local emergency number now.";

/// Shown when an escalation carries no model-written message.
pub const DEFAULT_CRISIS_MESSAGE: &str = "I'm really concerned about what you've shared, and \
     I'm glad you told me. You deserve support right now from people who can help.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    Escalate,
}

/// Which stage of the safety gate decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetySource {
    /// Crisis keyword pre-filter
    Prefilter,
    /// PHQ-9 item 9 above zero
    Questionnaire,
    /// Safety model sentinel
    Model,
    /// Ambiguous model output or model failure
    FailClosed,
}

impl fmt::Display for SafetySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Prefilter => "prefilter",
            Self::Questionnaire => "questionnaire",
            Self::Model => "model",
            Self::FailClosed => "fail_closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub verdict: SafetyVerdict,
    pub source: SafetySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Non-empty whenever `verdict` is `Escalate`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<CrisisResource>,
}

impl SafetyAssessment {
    pub fn safe() -> Self {
        Self {
            verdict: SafetyVerdict::Safe,
            source: SafetySource::Model,
            message: None,
            resources: Vec::new(),
        }
    }

    pub fn is_escalation(&self) -> bool {
        self.verdict == SafetyVerdict::Escalate
    }

    /// The message to show the user on escalation.
    pub fn user_message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_CRISIS_MESSAGE)
    }
}

/// The closed set of specialists triage may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageLabel {
    Coach,
    Plan,
    Refer,
    Clinician,
}

impl TriageLabel {
    pub const ALL: [TriageLabel; 4] = [Self::Coach, Self::Plan, Self::Refer, Self::Clinician];

    /// Exact, case-insensitive match against the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "coach" => Some(Self::Coach),
            "plan" => Some(Self::Plan),
            "refer" => Some(Self::Refer),
            "clinician" => Some(Self::Clinician),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coach => "coach",
            Self::Plan => "plan",
            Self::Refer => "refer",
            Self::Clinician => "clinician",
        }
    }
}

impl fmt::Display for TriageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageVerdict {
    pub label: TriageLabel,
    pub rationale: String,
    /// Set when the label was not chosen by the model.
    #[serde(default)]
    pub fallback: bool,
}

impl TriageVerdict {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            label: TriageLabel::Refer,
            rationale: reason.into(),
            fallback: true,
        }
    }
}

/// Deterministic signals handed to triage alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phq9: Option<Phq9Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_severity: Option<SymptomSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood_trend: Option<TrendStatus>,
}

impl TriageSignals {
    pub fn is_empty(&self) -> bool {
        self.phq9.is_none() && self.symptom_severity.is_none() && self.mood_trend.is_none()
    }

    /// Bullet list for the triage prompt. Empty when there are no signals.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if let Some(score) = &self.phq9 {
            lines.push(format!(
                "- PHQ-9: {} (total {})",
                score.severity.as_str(),
                score.total
            ));
        }
        if let Some(severity) = self.symptom_severity {
            let s = match severity {
                SymptomSeverity::Low => "low",
                SymptomSeverity::Moderate => "moderate",
                SymptomSeverity::High => "high",
            };
            lines.push(format!("- Symptom screen: {s}"));
        }
        if let Some(trend) = self.mood_trend {
            lines.push(format!("- Mood trend (7 days): {trend}"));
        }
        lines.join("\n")
    }
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The safety gate escalated; no specialist ran.
    Escalated {
        assessment: SafetyAssessment,
        limits_notice: String,
    },
    Handled {
        safety: SafetyAssessment,
        triage: TriageVerdict,
        reply: SpecialistReply,
    },
}

impl TurnOutcome {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated { .. })
    }

    /// Text to show the user.
    pub fn display_text(&self) -> String {
        match self {
            Self::Escalated {
                assessment,
                limits_notice,
            } => {
                let resources = assessment
                    .resources
                    .iter()
                    .map(|r| match &r.note {
                        Some(note) => format!("- {}: {} ({note})", r.name, r.contact),
                        None => format!("- {}: {}", r.name, r.contact),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "{}\n\nPlease reach out now:\n{resources}\n\n{limits_notice}",
                    assessment.user_message()
                )
            }
            Self::Handled { reply, .. } => reply.content.clone(),
        }
    }
}
