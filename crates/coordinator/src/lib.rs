//! Safety-gated routing for withyou.
//!
//! Every turn passes the same two-stage gate before any specialist sees it:
//!
//! ```text
//! User turn
//!      │
//!      ▼
//! ┌──────────────┐  escalate   ┌──────────────────────────────┐
//! │ Safety gate  │ ──────────► │ Crisis resources + limits    │
//! │ prefilter →  │             └──────────────────────────────┘
//! │ PHQ-9 →      │
//! │ model        │
//! └──────┬───────┘
//!        │ safe
//!        ▼
//! ┌──────────────┐
//! │ Triage agent │  coach | plan | refer | clinician
//! └──────┬───────┘
//!        ▼
//!   one specialist (at most one tool call)
//! ```

pub mod audit;
pub mod config;
pub mod orchestrator;
pub mod routing;
pub mod safety_gate;
pub mod triage_agent;

pub use config::{CalendarBackend, CalendarConfig, SafetyConfig, WithYouConfig};
pub use orchestrator::{Orchestrator, Specialists};
pub use routing::{
    DEFAULT_CRISIS_MESSAGE, LIMITS_NOTICE, SafetyAssessment, SafetySource, SafetyVerdict,
    TriageLabel, TriageSignals, TriageVerdict, TurnOutcome,
};
pub use safety_gate::{ModelSafety, SafetyGate, interpret_safety_output};
pub use triage_agent::{TriageAgent, parse_triage_output};
