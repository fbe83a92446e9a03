//! In-process, append-only session logs.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{MemoryConfig, SessionChannel, SessionKey, TurnRecord};
use withyou_common::MessageRole;

/// All session logs for the process lifetime.
///
/// Records are only ever appended. A record whose `(turn_id, role)` is
/// already present in the same log is ignored, so a redelivered turn
/// leaves the log unchanged.
pub struct SessionStore {
    config: MemoryConfig,
    sessions: RwLock<HashMap<SessionKey, Vec<TurnRecord>>>,
}

impl SessionStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Append a record. Returns `false` when it was a duplicate.
    pub async fn append(&self, key: &SessionKey, record: TurnRecord) -> bool {
        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(key.clone()).or_default();
        if log
            .iter()
            .any(|r| r.turn_id == record.turn_id && r.role == record.role)
        {
            debug!(session = %key, turn_id = %record.turn_id, "Duplicate record ignored");
            return false;
        }
        debug!(
            session = %key,
            turn_id = %record.turn_id,
            role = ?record.role,
            "Appending record"
        );
        log.push(record);
        true
    }

    /// Whether the log already holds a record for `turn_id` with `role`.
    pub async fn contains(&self, key: &SessionKey, turn_id: &str, role: MessageRole) -> bool {
        self.sessions
            .read()
            .await
            .get(key)
            .is_some_and(|log| log.iter().any(|r| r.turn_id == turn_id && r.role == role))
    }

    /// The last `max_history_turns` records, oldest first.
    pub async fn history(&self, key: &SessionKey) -> Vec<TurnRecord> {
        self.recent(key, self.config.max_history_turns).await
    }

    /// The last `limit` records, oldest first.
    pub async fn recent(&self, key: &SessionKey, limit: usize) -> Vec<TurnRecord> {
        let sessions = self.sessions.read().await;
        match sessions.get(key) {
            Some(log) => log[log.len().saturating_sub(limit)..].to_vec(),
            None => Vec::new(),
        }
    }

    /// The full log, oldest first.
    pub async fn transcript(&self, key: &SessionKey) -> Vec<TurnRecord> {
        self.sessions
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self, key: &SessionKey) -> usize {
        self.sessions.read().await.get(key).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, key: &SessionKey) -> bool {
        self.len(key).await == 0
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Main-channel records of `user_id` across all conversations.
    pub async fn user_records(&self, user_id: &str) -> Vec<(SessionKey, TurnRecord)> {
        let sessions = self.sessions.read().await;
        let mut records: Vec<(SessionKey, TurnRecord)> = sessions
            .iter()
            .filter(|(k, _)| k.user_id == user_id && k.channel == SessionChannel::Main)
            .flat_map(|(k, log)| log.iter().map(move |r| (k.clone(), r.clone())))
            .collect();
        records.sort_by_key(|(_, r)| r.created_at);
        records
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}
