//! Built-in scenarios run against scripted models, no API key needed.

use std::sync::Arc;

use colored::*;
use withyou_common::TurnInput;
use withyou_coordinator::{Orchestrator, WithYouConfig};
use withyou_llm::{LlmRequest, ModelClients, ScriptedClient};
use withyou_tools::InMemoryCalendar;

use crate::print_outcome;

const SCENARIOS: &[(&str, &str)] = &[
    ("Crisis phrase", "I want to end my life"),
    ("Sleep worry", "I can't sleep before my presentation"),
    ("Habit scheduling", "Can you schedule a 20 minute walk at 18:30?"),
    ("Looking for help", "Where can I find a therapist?"),
];

fn scripted_clients() -> ModelClients {
    let safety = ScriptedClient::fixed("demo-safety", "SAFE");

    let routing = ScriptedClient::new("demo-routing", |request: &LlmRequest| {
        let text = request.last_user_content().unwrap_or_default().to_lowercase();
        let path = if text.contains("schedule") {
            "plan"
        } else if text.contains("therapist") {
            "refer"
        } else {
            "coach"
        };
        Ok(format!(r#"{{"path":"{path}","rationale":"demo routing"}}"#))
    });

    let reasoning = ScriptedClient::new("demo-reasoning", |request: &LlmRequest| {
        let text = request.last_user_content().unwrap_or_default().to_lowercase();
        if text.contains("walk") {
            Ok(r#"{"reply":"A short evening walk is a lovely idea.","tool_call":{"name":"schedule_activity","arguments":{"activity":"Evening walk","start":"18:30","duration_minutes":20}}}"#.to_string())
        } else {
            Ok("That sounds really stressful. Before bed, try writing down what's on your mind, \
                then a few slow breaths: in for four, out for six."
                .to_string())
        }
    });

    ModelClients {
        safety: Arc::new(safety),
        routing: Arc::new(routing),
        reasoning: Arc::new(reasoning),
    }
}

pub async fn run(config: &WithYouConfig, json: bool) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::with_clients(
        config,
        scripted_clients(),
        Arc::new(InMemoryCalendar::new()),
    )?;

    for (i, (title, text)) in SCENARIOS.iter().enumerate() {
        println!("{} {}", format!("── {title}").bright_yellow().bold(), "──".bright_yellow());
        println!("{} {text}", "You:".bright_cyan().bold());
        let turn = TurnInput::new("demo-user", "demo", *text).with_turn_id(format!("demo_{i}"));
        let outcome = orchestrator.handle_turn(turn).await?;
        print_outcome(&outcome, json)?;
        println!();
    }
    Ok(())
}
