//! Specialist agents for withyou.
//!
//! Each specialist handles a turn only after the safety gate cleared it and
//! triage picked it:
//!
//! - **Coach** (`cbt_coach`): empathetic CBT framing, may screen symptoms or
//!   log mood, recalls earlier conversations
//! - **Planner** (`behavioral_planner`): behavioural activation, may schedule
//!   one activity
//! - **Clinician** (`clinician_bridge`): consent-gated SOAP handoff note over
//!   a redacted transcript
//! - **Referral** (`referral`): deterministic list of support resources
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌───────────┐  ┌──────────┐
//! │  Coach   │  │ Planner  │  │ Clinician │  │ Referral │
//! └────┬─────┘  └────┬─────┘  └─────┬─────┘  └────┬─────┘
//!      │  model +    │  model +     │  model       │  no model
//!      ▼  ≤1 tool    ▼  ≤1 tool     ▼              ▼
//! ┌────────────────────────────────────────────────────────┐
//! │            Tool registry (allowlist per agent)         │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod clinician;
pub mod coach;
pub mod directive;
pub mod planner;
pub mod referral;
pub mod runner;
pub mod traits;

pub use clinician::ClinicianAgent;
pub use coach::CoachAgent;
pub use directive::{ToolCallRequest, ToolDirective, extract_json_object, parse_directive};
pub use planner::PlannerAgent;
pub use referral::ReferralAgent;
pub use traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest, ToolInvocation};
