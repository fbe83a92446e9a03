use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::clinical::SymptomCheckerTool;
use crate::crisis::ResourceLookupTool;
use crate::mood::{LogMoodTool, MoodLog};
use crate::scheduler::{Calendar, ScheduleActivityTool};
use crate::{Tool, ToolContext, ToolErrorCode, ToolOutput};

/// Name-indexed set of tools shared by every specialist.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in tool, wired to the given stores.
    pub fn standard(mood_log: Arc<MoodLog>, calendar: Arc<dyn Calendar>) -> Self {
        let mut registry = Self::new();
        registry.register(ResourceLookupTool::new());
        registry.register(LogMoodTool::new(mood_log));
        registry.register(ScheduleActivityTool::new(calendar));
        registry.register(SymptomCheckerTool);
        registry
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Function definitions for the named tools, sorted by name. Unknown
    /// names are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<Value> {
        let mut selected: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| self.tools.contains_key(*n))
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolOutput {
        match self.get(name) {
            Some(tool) => {
                debug!(tool = name, user_id = %ctx.user_id, "Executing tool");
                tool.execute(args, ctx).await
            }
            None => ToolOutput::error(ToolErrorCode::NotFound, format!("Tool '{name}' not found")),
        }
    }
}
