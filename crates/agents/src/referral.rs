//! Referral handler - deterministic, no model.
//!
//! Also the fallback when triage cannot decide or a specialist fails.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use withyou_common::Result;
use withyou_tools::{CrisisResource, ToolRegistry};

use crate::traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest, ToolInvocation};

const REFERRAL_INTRO: &str = "It sounds like talking to a professional could really help. \
     Here are some places that offer support:";

const REFERRAL_OUTRO: &str = "I'm still here if you'd like to keep talking.";

const REFERRAL_TOOLS: &[&str] = &["resource_lookup"];

pub struct ReferralAgent {
    config: SpecialistConfig,
    tools: ToolRegistry,
}

impl ReferralAgent {
    pub fn new(config: SpecialistConfig, tools: ToolRegistry) -> Self {
        Self { config, tools }
    }

    pub fn with_default_config(tools: ToolRegistry) -> Self {
        Self::new(SpecialistConfig::new("referral", "Referral"), tools)
    }
}

fn format_resources(resources: &[CrisisResource]) -> String {
    resources
        .iter()
        .map(|r| match &r.note {
            Some(note) => format!("- {}: {} ({note})", r.name, r.contact),
            None => format!("- {}: {}", r.name, r.contact),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Specialist for ReferralAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn allowed_tools(&self) -> &[&'static str] {
        REFERRAL_TOOLS
    }

    fn system_prompt(&self) -> &str {
        ""
    }

    async fn respond(&self, request: &SpecialistRequest) -> Result<SpecialistReply> {
        let arguments = json!({ "urgency": "informational" });
        let result = self
            .tools
            .execute("resource_lookup", arguments.clone(), &request.tool_context())
            .await;

        let resources: Vec<CrisisResource> = result
            .data()
            .and_then(|d| serde_json::from_value(d["resources"].clone()).ok())
            .unwrap_or_default();

        info!(
            agent = %self.id(),
            turn_id = %request.turn.turn_id,
            resources = resources.len(),
            "Referral"
        );

        let content = if resources.is_empty() {
            format!("{REFERRAL_INTRO}\n- Your local doctor or health service\n\n{REFERRAL_OUTRO}")
        } else {
            format!("{REFERRAL_INTRO}\n{}\n\n{REFERRAL_OUTRO}", format_resources(&resources))
        };

        Ok(SpecialistReply {
            agent: self.id().to_string(),
            content,
            tool_call: Some(ToolInvocation {
                tool: "resource_lookup".into(),
                arguments,
                result,
            }),
        })
    }
}
