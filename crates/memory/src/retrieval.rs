//! Recall of earlier session records for the coach.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use withyou_common::MessageRole;
use withyou_common::security::truncate;

use crate::store::SessionStore;
use crate::types::{SessionKey, TurnRecord};

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "before", "being", "could", "does", "doing",
    "from", "have", "just", "like", "more", "much", "really", "some", "that", "their", "them",
    "then", "there", "they", "this", "very", "what", "when", "with", "would", "your",
];

/// Finds what the user said and what helped in earlier turns.
pub struct MemoryRetriever {
    store: Arc<SessionStore>,
}

impl MemoryRetriever {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Earlier main-channel records of the same user that share keywords
    /// with `query`, best match first. Records of `exclude_turn` are
    /// skipped.
    pub async fn recall(&self, key: &SessionKey, query: &str, exclude_turn: &str) -> Vec<TurnRecord> {
        let query_terms = keywords(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, TurnRecord)> = self
            .store
            .user_records(&key.user_id)
            .await
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.turn_id != exclude_turn)
            .filter_map(|r| {
                let overlap = keywords(&r.content).intersection(&query_terms).count();
                (overlap > 0).then_some((overlap, r))
            })
            .collect();

        // Highest overlap first, newer before older on ties.
        scored.sort_by(|(sa, ra), (sb, rb)| sb.cmp(sa).then(rb.created_at.cmp(&ra.created_at)));
        scored.truncate(self.store.config().recall_limit);

        debug!(session = %key, recalled = scored.len(), "Recalled earlier records");
        scored.into_iter().map(|(_, r)| r).collect()
    }

    /// Recall formatted as a context block, bounded by
    /// `max_context_chars`. Empty when nothing relevant exists.
    pub async fn build_context(&self, key: &SessionKey, query: &str, exclude_turn: &str) -> String {
        let max_chars = self.store.config().max_context_chars;
        let mut parts = Vec::new();
        let mut used = 0;

        for record in self.recall(key, query, exclude_turn).await {
            let part = format_record(&record);
            let len = part.chars().count();
            if used + len > max_chars {
                continue;
            }
            used += len;
            parts.push(part);
        }

        if parts.is_empty() {
            return String::new();
        }
        format!("## From earlier conversations\n\n{}", parts.join("\n"))
    }
}

fn format_record(record: &TurnRecord) -> String {
    let speaker = match record.role {
        MessageRole::User => "User said",
        MessageRole::Assistant => "You suggested",
        MessageRole::System | MessageRole::Tool => "Note",
    };
    format!("- {speaker}: {}", truncate(&record.content, 200))
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}
