//! Integration tests for the specialists behind the `Specialist` trait.
//!
//! A scripted model client stands in for the hosted model.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use withyou_agents::{
    ClinicianAgent, CoachAgent, PlannerAgent, ReferralAgent, Specialist, SpecialistRequest,
};
use withyou_common::TurnInput;
use withyou_llm::{LlmClient, ScriptedClient};
use withyou_tools::{Calendar, InMemoryCalendar, MoodLog, ToolRegistry};

struct Fixture {
    mood: Arc<MoodLog>,
    calendar: Arc<InMemoryCalendar>,
    tools: ToolRegistry,
}

impl Fixture {
    fn new() -> Self {
        let mood = Arc::new(MoodLog::new());
        let calendar = Arc::new(InMemoryCalendar::new());
        let tools = ToolRegistry::standard(mood.clone(), calendar.clone());
        Self {
            mood,
            calendar,
            tools,
        }
    }

    fn specialists(&self, llm: Arc<dyn LlmClient>) -> Vec<Box<dyn Specialist>> {
        vec![
            Box::new(CoachAgent::with_default_config(llm.clone(), self.tools.clone())),
            Box::new(PlannerAgent::with_default_config(llm.clone(), self.tools.clone())),
            Box::new(ClinicianAgent::with_default_config(llm, self.tools.clone())),
            Box::new(ReferralAgent::with_default_config(self.tools.clone())),
        ]
    }
}

fn request(text: &str) -> SpecialistRequest {
    SpecialistRequest::new(
        TurnInput::new("user_1", "conv_1", text)
            .with_turn_id("turn_1")
            .with_consent(true),
        vec![],
    )
    .with_now(Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap())
}

#[tokio::test]
async fn test_allowlists_are_disjoint_where_it_matters() {
    let fixture = Fixture::new();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedClient::fixed("m", "ok"));
    let specialists = fixture.specialists(llm);

    let ids: Vec<&str> = specialists.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["cbt_coach", "behavioral_planner", "clinician_bridge", "referral"]);

    let coach = &specialists[0];
    assert!(coach.may_use("log_mood"));
    assert!(coach.may_use("symptom_checker"));
    assert!(!coach.may_use("schedule_activity"));

    let planner = &specialists[1];
    assert!(planner.may_use("schedule_activity"));
    assert!(!planner.may_use("log_mood"));

    assert!(specialists[2].allowed_tools().is_empty());
}

#[tokio::test]
async fn test_every_specialist_makes_at_most_one_tool_call() {
    let fixture = Fixture::new();
    // Asks for every tool at once; only `tool_call` is honoured.
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedClient::fixed(
        "m",
        r#"{"reply":"Done.","tool_call":{"name":"schedule_activity","arguments":{"activity":"Walk","start":"18:00"}},"tool_calls":[{"name":"log_mood"},{"name":"symptom_checker"}]}"#,
    ));

    for specialist in fixture.specialists(llm) {
        let reply = specialist.respond(&request("Let's plan a walk")).await.unwrap();
        assert_eq!(reply.agent, specialist.id());
        if let Some(call) = &reply.tool_call {
            assert!(specialist.may_use(&call.tool), "{} ran {}", specialist.id(), call.tool);
        }
    }

    // Only the planner was allowed to book.
    assert_eq!(fixture.calendar.events_for("user_1").unwrap().len(), 1);
    assert!(fixture.mood.entries_for("user_1").is_empty());
}

#[tokio::test]
async fn test_tool_errors_reach_the_reply_not_the_caller() {
    let fixture = Fixture::new();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedClient::fixed(
        "m",
        r#"{"reply":"Logged.","tool_call":{"name":"log_mood","arguments":{"valence":9,"emotion":"great"}}}"#,
    ));
    let coach = CoachAgent::with_default_config(llm, fixture.tools.clone());

    let reply = coach.respond(&request("I feel great")).await.unwrap();
    let call = reply.tool_call.unwrap();
    assert!(!call.result.is_success());
    assert_eq!(call.result.to_value()["code"], "invalid_argument");
    assert!(fixture.mood.entries_for("user_1").is_empty());
}
