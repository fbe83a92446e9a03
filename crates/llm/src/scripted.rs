//! Deterministic in-process client for tests and offline wiring checks.

use async_trait::async_trait;
use parking_lot::Mutex;
use withyou_common::Result;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

type Responder = dyn Fn(&LlmRequest) -> Result<String> + Send + Sync;

/// Answers every request through a caller-supplied closure and records what
/// it was asked.
pub struct ScriptedClient {
    model: String,
    responder: Box<Responder>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    pub fn new<F>(model: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            model: model.into(),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A client that always answers with `reply`.
    pub fn fixed(model: impl Into<String>, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(model, move |_| Ok(reply.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let content = (self.responder)(&request)?;
        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
