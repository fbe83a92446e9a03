//! One model call plus at most one allowlisted tool call.

use serde_json::Value;
use tracing::{debug, info, warn};
use withyou_common::Result;
use withyou_llm::{LlmClient, LlmRequest};
use withyou_tools::ToolRegistry;

use crate::directive::parse_directive;
use crate::traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest, ToolInvocation};

/// Used when the model returns nothing a user should see.
pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm here with you. Could you tell me a little more about what's going on?";

const DIRECTIVE_INSTRUCTIONS: &str = r#"You may call at most one tool. To call it, answer ONLY with JSON:
{"reply": "<what you say to the user>", "tool_call": {"name": "<tool name>", "arguments": {...}}}
If no tool is needed, answer in plain text."#;

/// Assemble the system prompt: instructions, tool section, clock and any
/// extra context.
pub fn compose_system_prompt(
    base: &str,
    tool_definitions: &[Value],
    request: &SpecialistRequest,
    extra_context: Option<&str>,
) -> String {
    let mut prompt = base.trim_end().to_string();

    if !tool_definitions.is_empty() {
        let tools = serde_json::to_string_pretty(tool_definitions).unwrap_or_default();
        prompt.push_str(&format!("\n\n{DIRECTIVE_INSTRUCTIONS}\n\nAvailable tools:\n{tools}"));
    }

    prompt.push_str(&format!(
        "\n\nCurrent time (UTC): {}",
        request.now.format("%Y-%m-%dT%H:%M:%SZ")
    ));

    if let Some(context) = extra_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(context);
    }
    prompt
}

/// Run a specialist turn against `llm`.
///
/// `user_text` is what the model sees as the final user message; callers
/// pass a redacted version when the raw text must not leave the process.
pub async fn run_model_turn<S>(
    specialist: &S,
    config: &SpecialistConfig,
    llm: &dyn LlmClient,
    tools: &ToolRegistry,
    request: &SpecialistRequest,
    user_text: &str,
    extra_context: Option<&str>,
) -> Result<SpecialistReply>
where
    S: Specialist + ?Sized,
{
    let definitions = tools.definitions_for(specialist.allowed_tools());
    let system_prompt =
        compose_system_prompt(specialist.system_prompt(), &definitions, request, extra_context);

    let llm_request = LlmRequest::with_history(system_prompt, request.chat_history(), user_text)
        .temperature(config.temperature)
        .max_tokens(config.max_tokens);

    let response = llm.complete(llm_request).await?;
    let directive = parse_directive(&response.content);
    debug!(
        agent = %specialist.id(),
        tool_requested = ?directive.tool_call.as_ref().map(|c| c.name.as_str()),
        "Parsed specialist output"
    );

    let mut content = directive.reply;
    let tool_call = match directive.tool_call {
        Some(call) if !specialist.may_use(&call.name) => {
            warn!(
                target: "audit",
                agent = %specialist.id(),
                user_id = %request.turn.user_id,
                turn_id = %request.turn.turn_id,
                tool = %call.name,
                "Refused tool call outside allowlist"
            );
            None
        }
        Some(call) => {
            let ctx = request.tool_context();
            let result = tools.execute(&call.name, call.arguments.clone(), &ctx).await;
            info!(
                agent = %specialist.id(),
                tool = %call.name,
                success = result.is_success(),
                "Specialist tool call"
            );
            Some(ToolInvocation {
                tool: call.name,
                arguments: call.arguments,
                result,
            })
        }
        None => None,
    };

    if content.is_empty() {
        content = EMPTY_REPLY_FALLBACK.to_string();
    }

    Ok(SpecialistReply {
        agent: specialist.id().to_string(),
        content,
        tool_call,
    })
}
