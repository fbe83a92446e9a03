//! Activity scheduling against a calendar backend.
//!
//! Start times are normalized to UTC before an event id is derived, so the
//! same request redelivered for the same turn always maps to one event.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use withyou_common::{Result, WithYouError};

use crate::{Tool, ToolContext, ToolErrorCode, ToolOutput, parse_args, schema_of};

pub const MIN_DURATION_MINUTES: u32 = 5;
pub const MAX_DURATION_MINUTES: u32 = 240;
pub const DEFAULT_DURATION_MINUTES: u32 = 15;
pub const MAX_ACTIVITY_CHARS: usize = 120;
/// Furthest ahead of the turn clock an activity may start.
pub const MAX_SCHEDULE_AHEAD_DAYS: i64 = 366;
/// Slack for starts slightly in the past, e.g. a naive local time read as UTC.
pub const MAX_SCHEDULE_BEHIND_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Once,
    Daily,
    Weekdays,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub activity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Storage for scheduled events. `insert` returns `false` when an event
/// with the same id already exists.
pub trait Calendar: Send + Sync {
    fn insert(&self, event: CalendarEvent) -> Result<bool>;

    fn events_for(&self, user_id: &str) -> Result<Vec<CalendarEvent>>;
}

#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Calendar for InMemoryCalendar {
    fn insert(&self, event: CalendarEvent) -> Result<bool> {
        let mut events = self.events.lock();
        if events.iter().any(|e| e.id == event.id) {
            return Ok(false);
        }
        events.push(event);
        Ok(true)
    }

    fn events_for(&self, user_id: &str) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Service-account credentials used to tag ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Read and validate a service-account JSON file.
pub fn load_service_account(path: &Path) -> Result<ServiceAccount> {
    let content = fs::read_to_string(path).map_err(|e| {
        WithYouError::Config(format!(
            "Cannot read service account file {}: {e}",
            path.display()
        ))
    })?;
    let account: ServiceAccount = serde_json::from_str(&content).map_err(|e| {
        WithYouError::Config(format!(
            "Invalid service account file {}: {e}",
            path.display()
        ))
    })?;
    if account.client_email.trim().is_empty() {
        return Err(WithYouError::Config(format!(
            "Service account file {} has an empty client_email",
            path.display()
        )));
    }
    Ok(account)
}

/// Append-only JSON-lines calendar file.
#[derive(Debug)]
pub struct LedgerCalendar {
    path: PathBuf,
    account: Option<String>,
    lock: Mutex<()>,
}

impl LedgerCalendar {
    pub fn open(path: impl Into<PathBuf>, account: Option<&ServiceAccount>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened calendar ledger");
        Ok(Self {
            path,
            account: account.map(|a| a.client_email.clone()),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<CalendarEvent>> {
        let file = fs::File::open(&self.path)?;
        let mut events = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CalendarEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed ledger line"
                ),
            }
        }
        Ok(events)
    }
}

impl Calendar for LedgerCalendar {
    fn insert(&self, mut event: CalendarEvent) -> Result<bool> {
        let _guard = self.lock.lock();
        let existing: HashSet<String> = self.read_all()?.into_iter().map(|e| e.id).collect();
        if existing.contains(&event.id) {
            return Ok(false);
        }
        if event.account.is_none() {
            event.account = self.account.clone();
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&event)?)?;
        Ok(true)
    }

    fn events_for(&self, user_id: &str) -> Result<Vec<CalendarEvent>> {
        let _guard = self.lock.lock();
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect())
    }
}

/// Normalize `raw` to a UTC instant.
///
/// Accepts RFC 3339, naive ISO date-times (taken as UTC) and `HH:MM`,
/// which resolves to the next occurrence after `now`.
pub fn normalize_start(raw: &str, now: DateTime<Utc>) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("start must not be empty".into());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M") {
        let today = now.date_naive().and_time(time).and_utc();
        if today > now {
            return Ok(today);
        }
        return today
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| format!("start '{raw}' is out of range"));
    }

    Err(format!(
        "start '{raw}' is not RFC 3339, YYYY-MM-DDTHH:MM[:SS] or HH:MM"
    ))
}

/// Reject starts too far from `now` to be a real plan.
fn check_window(start: DateTime<Utc>, now: DateTime<Utc>) -> std::result::Result<(), String> {
    let earliest = now.checked_sub_signed(Duration::days(MAX_SCHEDULE_BEHIND_DAYS));
    let latest = now.checked_add_signed(Duration::days(MAX_SCHEDULE_AHEAD_DAYS));
    if earliest.is_some_and(|earliest| start < earliest) {
        return Err(format!("start {} is in the past", rfc3339(&start)));
    }
    if latest.is_some_and(|latest| start > latest) {
        return Err(format!(
            "start {} is more than {MAX_SCHEDULE_AHEAD_DAYS} days ahead",
            rfc3339(&start)
        ));
    }
    Ok(())
}

fn rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScheduleActivityArgs {
    /// Short description of the activity, e.g. "10 minute walk".
    pub activity: String,
    /// RFC 3339 timestamp, "YYYY-MM-DDTHH:MM" (UTC) or "HH:MM".
    pub start: String,
    /// Length in minutes, 5 to 240. Defaults to 15.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub frequency: Frequency,
}

/// `schedule_activity`: book a behavioural-activation activity.
pub struct ScheduleActivityTool {
    calendar: Arc<dyn Calendar>,
}

impl ScheduleActivityTool {
    pub fn new(calendar: Arc<dyn Calendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for ScheduleActivityTool {
    fn name(&self) -> &str {
        "schedule_activity"
    }

    fn description(&self) -> &str {
        "Schedule a small, concrete activity on the user's calendar."
    }

    fn schema(&self) -> Value {
        schema_of::<ScheduleActivityArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let args: ScheduleActivityArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };

        let activity = args.activity.trim();
        if activity.is_empty() {
            return ToolOutput::invalid("activity must not be empty");
        }
        if activity.chars().count() > MAX_ACTIVITY_CHARS {
            return ToolOutput::invalid(format!(
                "activity must be at most {MAX_ACTIVITY_CHARS} characters"
            ));
        }

        let duration = args.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
            return ToolOutput::invalid(format!(
                "duration_minutes must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}, got {duration}"
            ));
        }

        let start = match normalize_start(&args.start, ctx.now) {
            Ok(s) => s,
            Err(message) => return ToolOutput::invalid(message),
        };
        if let Err(message) = check_window(start, ctx.now) {
            return ToolOutput::invalid(message);
        }
        let Some(end) = start.checked_add_signed(Duration::minutes(duration as i64)) else {
            return ToolOutput::invalid(format!("start '{}' is out of range", args.start.trim()));
        };

        let discriminator = format!("{}|{}", activity.to_lowercase(), rfc3339(&start));
        let event = CalendarEvent {
            id: ctx.derive_id("event", &discriminator),
            user_id: ctx.user_id.clone(),
            activity: activity.to_string(),
            start,
            end,
            frequency: args.frequency,
            account: None,
        };
        let event_id = event.id.clone();

        let created = match self.calendar.insert(event) {
            Ok(created) => created,
            Err(e) => {
                warn!(user_id = %ctx.user_id, error = %e, "Calendar write failed");
                return ToolOutput::error(ToolErrorCode::Unavailable, format!("Calendar unavailable: {e}"));
            }
        };

        info!(
            target: "audit",
            user_id = %ctx.user_id,
            turn_id = %ctx.turn_id,
            event_id = %event_id,
            created,
            "Activity scheduled"
        );

        ToolOutput::success(json!({
            "event_id": event_id,
            "activity": activity,
            "start": rfc3339(&start),
            "end": rfc3339(&end),
            "duration_minutes": duration,
            "frequency": args.frequency,
            "created": created,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap()
    }

    fn ctx(turn: &str) -> ToolContext {
        ToolContext::new("u1", turn).with_now(now())
    }

    #[test]
    fn test_normalizes_supported_formats() {
        assert_eq!(
            normalize_start("2026-03-11T07:00:00+05:30", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 1, 30, 0).unwrap()
        );
        assert_eq!(
            normalize_start("2026-03-11T07:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 7, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_start("2026-03-11 07:00:30", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 7, 0, 30).unwrap()
        );
    }

    #[test]
    fn test_clock_time_resolves_to_next_occurrence() {
        assert_eq!(
            normalize_start("22:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 10, 22, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_start("07:15", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 7, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_garbage_start_is_rejected() {
        assert!(normalize_start("tomorrow-ish", now()).is_err());
        assert!(normalize_start("", now()).is_err());
        assert!(normalize_start("25:00", now()).is_err());
    }

    #[tokio::test]
    async fn test_schedules_and_reports_normalized_times() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let tool = ScheduleActivityTool::new(calendar.clone());

        let out = tool
            .execute(
                json!({"activity": "Evening walk", "start": "2026-03-11T07:00", "duration_minutes": 20}),
                &ctx("t1"),
            )
            .await;

        let data = out.data().unwrap();
        assert_eq!(data["start"], "2026-03-11T07:00:00Z");
        assert_eq!(data["end"], "2026-03-11T07:20:00Z");
        assert_eq!(data["frequency"], "once");
        assert_eq!(data["created"], true);
        assert!(data["event_id"].as_str().unwrap().starts_with("event_"));
        assert_eq!(calendar.events_for("u1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_double_book() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let tool = ScheduleActivityTool::new(calendar.clone());
        let args = json!({"activity": "Stretch", "start": "2026-03-11T07:00:00Z"});

        let first = tool.execute(args.clone(), &ctx("t1")).await;
        let again = tool.execute(args.clone(), &ctx("t1")).await;
        let other_turn = tool.execute(args, &ctx("t2")).await;

        assert_eq!(first.data().unwrap()["event_id"], again.data().unwrap()["event_id"]);
        assert_eq!(again.data().unwrap()["created"], false);
        assert_eq!(other_turn.data().unwrap()["created"], true);
        assert_eq!(calendar.events_for("u1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_invalid() {
        let tool = ScheduleActivityTool::new(Arc::new(InMemoryCalendar::new()));
        for minutes in [0, 4, 241] {
            let out = tool
                .execute(
                    json!({"activity": "Read", "start": "08:00", "duration_minutes": minutes}),
                    &ctx("t1"),
                )
                .await;
            assert!(!out.is_success(), "{minutes} accepted");
        }
    }

    #[tokio::test]
    async fn test_default_duration_is_fifteen_minutes() {
        let tool = ScheduleActivityTool::new(Arc::new(InMemoryCalendar::new()));
        let out = tool
            .execute(json!({"activity": "Read", "start": "22:00", "frequency": "daily"}), &ctx("t1"))
            .await;
        let data = out.data().unwrap();
        assert_eq!(data["start"], "2026-03-10T22:00:00Z");
        assert_eq!(data["end"], "2026-03-10T22:15:00Z");
        assert_eq!(data["frequency"], "daily");
    }

    #[tokio::test]
    async fn test_empty_activity_is_invalid() {
        let tool = ScheduleActivityTool::new(Arc::new(InMemoryCalendar::new()));
        let out = tool
            .execute(json!({"activity": "   ", "start": "22:00"}), &ctx("t1"))
            .await;
        assert!(matches!(
            out,
            ToolOutput::Error {
                code: ToolErrorCode::InvalidArgument,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_extreme_start_is_invalid_not_a_panic() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let tool = ScheduleActivityTool::new(calendar.clone());
        for start in ["+262142-12-31T23:59:00", "-262143-01-01T00:00:00", "2031-03-11T07:00", "2026-03-01T07:00"] {
            let out = tool
                .execute(
                    json!({"activity": "Walk", "start": start, "duration_minutes": 240}),
                    &ctx("t1"),
                )
                .await;
            assert!(
                matches!(out, ToolOutput::Error { code: ToolErrorCode::InvalidArgument, .. }),
                "{start} accepted"
            );
        }
        assert!(calendar.events_for("u1").unwrap().is_empty());
    }

    #[test]
    fn test_clock_time_at_end_of_calendar_is_an_error() {
        let last_day = NaiveDateTime::MAX.and_utc();
        assert!(normalize_start("00:00", last_day).is_err());
    }

    #[test]
    fn test_ledger_persists_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("calendar.jsonl");
        let account = ServiceAccount {
            client_email: "bot@project.iam.gserviceaccount.com".into(),
            project_id: None,
        };
        let ledger = LedgerCalendar::open(&path, Some(&account)).unwrap();

        let event = CalendarEvent {
            id: "event_1".into(),
            user_id: "u1".into(),
            activity: "Walk".into(),
            start: now(),
            end: now() + Duration::minutes(15),
            frequency: Frequency::Once,
            account: None,
        };
        assert!(ledger.insert(event.clone()).unwrap());
        assert!(!ledger.insert(event).unwrap());

        let reopened = LedgerCalendar::open(&path, None).unwrap();
        let events = reopened.events_for("u1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].account.as_deref(),
            Some("bot@project.iam.gserviceaccount.com")
        );
        assert!(reopened.events_for("someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_service_account_requires_client_email() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"client_email": "a@b.iam", "project_id": "p"}"#).unwrap();
        assert_eq!(load_service_account(&good).unwrap().client_email, "a@b.iam");

        let blank = dir.path().join("blank.json");
        fs::write(&blank, r#"{"client_email": " "}"#).unwrap();
        assert!(load_service_account(&blank).is_err());

        let missing = dir.path().join("missing.json");
        assert!(load_service_account(&missing).is_err());
    }
}
