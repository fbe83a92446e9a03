//! Coach specialist - empathetic CBT-style support.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use withyou_common::Result;
use withyou_llm::LlmClient;
use withyou_memory::{MemoryRetriever, SessionKey};
use withyou_tools::ToolRegistry;

use crate::runner::run_model_turn;
use crate::traits::{Specialist, SpecialistConfig, SpecialistReply, SpecialistRequest};

const COACH_SYSTEM_PROMPT: &str = r#"You are a warm, supportive wellness coach using cognitive behavioural therapy (CBT) techniques. Your role is to:

1. Reflect back what the user is feeling without judgement
2. Gently help them notice unhelpful thought patterns
3. Offer one small, practical coping strategy at a time
4. Build on what has helped them before, when you know it

You are not a therapist and you do not diagnose.
Keep replies short: three to five sentences.
If the user mentions symptoms, you may screen them with symptom_checker.
If the user shares how they feel, you may record it with log_mood.
"#;

const COACH_TOOLS: &[&str] = &["symptom_checker", "log_mood"];

/// CBT coach with access to the user's earlier conversations.
pub struct CoachAgent {
    config: SpecialistConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    retriever: Option<Arc<MemoryRetriever>>,
}

impl CoachAgent {
    pub fn new(config: SpecialistConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self {
            config,
            llm,
            tools,
            retriever: None,
        }
    }

    pub fn with_default_config(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self::new(SpecialistConfig::new("cbt_coach", "CBT Coach"), llm, tools)
    }

    /// Recall earlier conversations into the prompt.
    pub fn with_memory(mut self, retriever: Arc<MemoryRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }
}

#[async_trait]
impl Specialist for CoachAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn allowed_tools(&self) -> &[&'static str] {
        COACH_TOOLS
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(COACH_SYSTEM_PROMPT)
    }

    async fn respond(&self, request: &SpecialistRequest) -> Result<SpecialistReply> {
        info!(
            agent = %self.id(),
            turn_id = %request.turn.turn_id,
            history = request.history.len(),
            "Coaching turn"
        );

        let recalled = match &self.retriever {
            Some(retriever) => {
                let key = SessionKey::main(&request.turn.user_id, &request.turn.conversation_id);
                retriever
                    .build_context(&key, &request.turn.text, &request.turn.turn_id)
                    .await
            }
            None => String::new(),
        };

        run_model_turn(
            self,
            &self.config,
            self.llm.as_ref(),
            &self.tools,
            request,
            &request.turn.text,
            Some(&recalled),
        )
        .await
    }
}
