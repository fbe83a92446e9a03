//! Mood logging with idempotent writes and trend analysis.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{Tool, ToolContext, ToolOutput, parse_args, schema_of};

pub const MIN_VALENCE: i64 = 1;
pub const MAX_VALENCE: i64 = 5;
pub const MAX_EMOTION_CHARS: usize = 32;
pub const MAX_NOTES_CHARS: usize = 500;

/// Entries needed before a trend is reported.
pub const MIN_TREND_ENTRIES: usize = 3;
/// Change in average valence between window halves that counts as a trend.
const TREND_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: String,
    pub user_id: String,
    pub valence: u8,
    pub emotion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Improving,
    Stable,
    Deteriorating,
    InsufficientData,
}

impl std::fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Deteriorating => "deteriorating",
            Self::InsufficientData => "insufficient_data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodTrend {
    pub status: TrendStatus,
    pub entries: usize,
    pub window_days: i64,
    pub average_valence: Option<f64>,
}

/// In-process mood store, keyed by user.
#[derive(Debug, Default)]
pub struct MoodLog {
    entries: RwLock<HashMap<String, Vec<MoodEntry>>>,
}

impl MoodLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` unless its id was already written. Returns whether
    /// the entry was newly created.
    pub fn record(&self, entry: MoodEntry) -> bool {
        let mut entries = self.entries.write();
        let user_entries = entries.entry(entry.user_id.clone()).or_default();
        if user_entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        user_entries.push(entry);
        true
    }

    pub fn entries_for(&self, user_id: &str) -> Vec<MoodEntry> {
        self.entries.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Compare the average valence of the older and newer halves of the
    /// entries recorded in the last `window_days` days.
    pub fn trend(&self, user_id: &str, now: DateTime<Utc>, window_days: i64) -> MoodTrend {
        let since = now - Duration::days(window_days);
        let mut recent: Vec<MoodEntry> = self
            .entries_for(user_id)
            .into_iter()
            .filter(|e| e.recorded_at >= since && e.recorded_at <= now)
            .collect();
        recent.sort_by_key(|e| e.recorded_at);

        let average = |slice: &[MoodEntry]| {
            slice.iter().map(|e| e.valence as f64).sum::<f64>() / slice.len() as f64
        };

        let average_valence = (!recent.is_empty()).then(|| average(&recent));
        let status = if recent.len() < MIN_TREND_ENTRIES {
            TrendStatus::InsufficientData
        } else {
            let mid = recent.len() / 2;
            let delta = average(&recent[mid..]) - average(&recent[..mid]);
            if delta > TREND_THRESHOLD {
                TrendStatus::Improving
            } else if delta < -TREND_THRESHOLD {
                TrendStatus::Deteriorating
            } else {
                TrendStatus::Stable
            }
        };

        MoodTrend {
            status,
            entries: recent.len(),
            window_days,
            average_valence,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogMoodArgs {
    /// Mood valence from 1 (very low) to 5 (very good).
    pub valence: i64,
    /// One word naming the main emotion, e.g. "anxious".
    pub emotion: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn validate(args: &LogMoodArgs) -> std::result::Result<(u8, String), ToolOutput> {
    if !(MIN_VALENCE..=MAX_VALENCE).contains(&args.valence) {
        return Err(ToolOutput::invalid(format!(
            "valence must be between {MIN_VALENCE} and {MAX_VALENCE}, got {}",
            args.valence
        )));
    }
    let emotion = args.emotion.trim().to_lowercase();
    if emotion.is_empty() {
        return Err(ToolOutput::invalid("emotion must not be empty"));
    }
    if emotion.split_whitespace().count() != 1 {
        return Err(ToolOutput::invalid("emotion must be a single word"));
    }
    if emotion.chars().count() > MAX_EMOTION_CHARS {
        return Err(ToolOutput::invalid(format!(
            "emotion must be at most {MAX_EMOTION_CHARS} characters"
        )));
    }
    if args
        .notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS)
    {
        return Err(ToolOutput::invalid(format!(
            "notes must be at most {MAX_NOTES_CHARS} characters"
        )));
    }
    Ok((args.valence as u8, emotion))
}

/// `log_mood`: record a mood check-in.
pub struct LogMoodTool {
    log: Arc<MoodLog>,
}

impl LogMoodTool {
    pub fn new(log: Arc<MoodLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for LogMoodTool {
    fn name(&self) -> &str {
        "log_mood"
    }

    fn description(&self) -> &str {
        "Record the user's current mood on a 1-5 scale with a one-word emotion."
    }

    fn schema(&self) -> Value {
        schema_of::<LogMoodArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let args: LogMoodArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let (valence, emotion) = match validate(&args) {
            Ok(v) => v,
            Err(e) => return e,
        };

        // One mood entry per turn.
        let entry = MoodEntry {
            id: ctx.derive_id("mood", ""),
            user_id: ctx.user_id.clone(),
            valence,
            emotion,
            notes: args.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            recorded_at: ctx.now,
        };
        let id = entry.id.clone();
        let created = self.log.record(entry);

        info!(
            target: "audit",
            user_id = %ctx.user_id,
            turn_id = %ctx.turn_id,
            entry_id = %id,
            valence,
            created,
            "Mood logged"
        );

        ToolOutput::success(json!({
            "entry_id": id,
            "valence": valence,
            "created": created,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, valence: u8, days_ago: i64) -> MoodEntry {
        MoodEntry {
            id: id.into(),
            user_id: "u1".into(),
            valence,
            emotion: "calm".into(),
            notes: None,
            recorded_at: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_duplicate_ids_are_not_written_twice() {
        let log = MoodLog::new();
        assert!(log.record(entry("m1", 3, 0)));
        assert!(!log.record(entry("m1", 5, 0)));
        assert_eq!(log.entries_for("u1").len(), 1);
        assert_eq!(log.entries_for("u1")[0].valence, 3);
    }

    #[test]
    fn test_trend_needs_enough_entries() {
        let log = MoodLog::new();
        log.record(entry("a", 2, 2));
        log.record(entry("b", 4, 1));
        let trend = log.trend("u1", now(), 7);
        assert_eq!(trend.status, TrendStatus::InsufficientData);
        assert_eq!(trend.average_valence, Some(3.0));
    }

    #[test]
    fn test_trend_detects_direction() {
        let improving = MoodLog::new();
        for (i, v) in [1, 2, 4, 5].into_iter().enumerate() {
            improving.record(entry(&format!("i{i}"), v, 4 - i as i64));
        }
        assert_eq!(improving.trend("u1", now(), 7).status, TrendStatus::Improving);

        let falling = MoodLog::new();
        for (i, v) in [5, 4, 2, 1].into_iter().enumerate() {
            falling.record(entry(&format!("f{i}"), v, 4 - i as i64));
        }
        assert_eq!(falling.trend("u1", now(), 7).status, TrendStatus::Deteriorating);

        let flat = MoodLog::new();
        for (i, v) in [3, 3, 3].into_iter().enumerate() {
            flat.record(entry(&format!("s{i}"), v, 3 - i as i64));
        }
        assert_eq!(flat.trend("u1", now(), 7).status, TrendStatus::Stable);
    }

    #[test]
    fn test_trend_ignores_entries_outside_window() {
        let log = MoodLog::new();
        log.record(entry("old1", 1, 30));
        log.record(entry("old2", 1, 29));
        log.record(entry("new", 5, 1));
        let trend = log.trend("u1", now(), 7);
        assert_eq!(trend.entries, 1);
        assert_eq!(trend.status, TrendStatus::InsufficientData);
    }

    #[tokio::test]
    async fn test_out_of_range_valence_is_rejected_without_write() {
        let log = Arc::new(MoodLog::new());
        let tool = LogMoodTool::new(log.clone());
        let ctx = ToolContext::new("u1", "t1").with_now(now());

        for valence in [0, 6, -1] {
            let out = tool
                .execute(json!({"valence": valence, "emotion": "sad"}), &ctx)
                .await;
            assert!(!out.is_success(), "valence {valence} accepted");
        }
        assert!(log.entries_for("u1").is_empty());
    }

    #[tokio::test]
    async fn test_emotion_must_be_one_word() {
        let tool = LogMoodTool::new(Arc::new(MoodLog::new()));
        let ctx = ToolContext::new("u1", "t1");
        let out = tool
            .execute(json!({"valence": 3, "emotion": "kind of sad"}), &ctx)
            .await;
        assert!(!out.is_success());
        let out = tool.execute(json!({"valence": 3, "emotion": "  "}), &ctx).await;
        assert!(!out.is_success());
    }

    #[tokio::test]
    async fn test_redelivered_turn_is_acknowledged_once() {
        let log = Arc::new(MoodLog::new());
        let tool = LogMoodTool::new(log.clone());
        let ctx = ToolContext::new("u1", "turn_42").with_now(now());
        let args = json!({"valence": 2, "emotion": "Anxious", "notes": "big day"});

        let first = tool.execute(args.clone(), &ctx).await;
        let second = tool.execute(args, &ctx).await;

        assert_eq!(first.data().unwrap()["created"], true);
        assert_eq!(second.data().unwrap()["created"], false);
        assert_eq!(
            first.data().unwrap()["entry_id"],
            second.data().unwrap()["entry_id"]
        );
        let entries = log.entries_for("u1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].emotion, "anxious");
    }
}
