//! Crisis keyword detection and the vetted resource directory.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;
use withyou_common::{Result, WithYouError};

use crate::{Tool, ToolContext, ToolOutput, parse_args, schema_of};

/// Phrases that always trigger the pre-filter.
pub const DEFAULT_CRISIS_PATTERNS: &[&str] = &[
    r"\bkill(ing)?\s+my\s*self\b",
    r"\bhurt(ing)?\s+my\s*self\b",
    r"\bwant(s|ed)?\s+to\s+die\b",
    r"\bsuicid(e|al)\b",
    r"\boverdos(e|ing)\b",
    r"\bend\s+it\s+all\b",
    r"\bend(ing)?\s+my\s+life\b",
    r"\bcut(ting)?\s+my\s*self\b",
];

/// Case-insensitive crisis phrase matcher.
#[derive(Debug, Clone)]
pub struct CrisisDetector {
    patterns: Vec<Regex>,
}

impl CrisisDetector {
    /// Built-in patterns plus `extra_keywords`, which are matched as
    /// literal phrases on word boundaries.
    pub fn new(extra_keywords: &[String]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(DEFAULT_CRISIS_PATTERNS.len() + extra_keywords.len());
        for pattern in DEFAULT_CRISIS_PATTERNS {
            patterns.push(compile(pattern)?);
        }
        for keyword in extra_keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
            patterns.push(compile(&format!(r"\b{}\b", words.join(r"\s+")))?);
        }
        Ok(Self { patterns })
    }

    /// The first matching pattern, if any.
    pub fn detect(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(text))
            .map(|p| p.as_str())
    }

    pub fn is_crisis(&self, text: &str) -> bool {
        self.detect(text).is_some()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| WithYouError::Config(format!("Invalid crisis pattern '{pattern}': {e}")))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Immediate,
    Informational,
}

/// A vetted support contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisResource {
    pub name: String,
    pub contact: String,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

struct Entry {
    name: &'static str,
    contact: &'static str,
    note: Option<&'static str>,
}

const fn entry(name: &'static str, contact: &'static str, note: Option<&'static str>) -> Entry {
    Entry { name, contact, note }
}

const INDIA_IMMEDIATE: &[Entry] = &[
    entry("Tele-MANAS", "14416 or 1-800-891-4416", Some("24/7, free, multilingual")),
    entry("Vandrevala Foundation", "+91 9999 666 555", Some("24/7 call or WhatsApp")),
    entry("AASRA", "+91 98204 66726", None),
];
const INDIA_INFORMATIONAL: &[Entry] = &[
    entry("NIMHANS", "https://nimhans.ac.in", None),
    entry("The Live Love Laugh Foundation", "https://www.thelivelovelaughfoundation.org", None),
];

const USA_IMMEDIATE: &[Entry] = &[
    entry("988 Suicide & Crisis Lifeline", "Call or text 988", Some("24/7")),
    entry("Crisis Text Line", "Text HOME to 741741", None),
];
const USA_INFORMATIONAL: &[Entry] = &[
    entry("NAMI HelpLine", "1-800-950-6264", Some("Weekdays, information and referral")),
    entry("MentalHealth.gov", "https://www.mentalhealth.gov", None),
];

const UK_IMMEDIATE: &[Entry] = &[
    entry("Samaritans", "116 123", Some("24/7, free")),
    entry("Shout", "Text SHOUT to 85258", None),
];
const UK_INFORMATIONAL: &[Entry] = &[
    entry("Mind", "https://www.mind.org.uk", None),
    entry("NHS Mental Health Services", "https://www.nhs.uk/mental-health", None),
];

const GLOBAL_IMMEDIATE: &[Entry] = &[
    entry(
        "Local emergency services",
        "Your local emergency number",
        Some("If you are in immediate danger, call now"),
    ),
    entry("Find A Helpline", "https://findahelpline.com", None),
    entry("Befrienders Worldwide", "https://www.befrienders.org", None),
];
const GLOBAL_INFORMATIONAL: &[Entry] = &[
    entry("World Health Organization: Mental health", "https://www.who.int/health-topics/mental-health", None),
    entry("Find A Helpline", "https://findahelpline.com", None),
];

/// Static locale → resource table. Lookups never return an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceDirectory;

impl ResourceDirectory {
    /// Canonical locale key: `india`, `usa`, `uk` or `global`.
    pub fn normalize_locale(locale: Option<&str>) -> &'static str {
        match locale.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("india" | "in" | "en-in" | "hi-in") => "india",
            Some("usa" | "us" | "en-us" | "united states") => "usa",
            Some("uk" | "gb" | "en-gb" | "united kingdom") => "uk",
            _ => "global",
        }
    }

    pub fn lookup(&self, locale: Option<&str>, urgency: Urgency) -> Vec<CrisisResource> {
        let key = Self::normalize_locale(locale);
        let table = match (key, urgency) {
            ("india", Urgency::Immediate) => INDIA_IMMEDIATE,
            ("india", Urgency::Informational) => INDIA_INFORMATIONAL,
            ("usa", Urgency::Immediate) => USA_IMMEDIATE,
            ("usa", Urgency::Informational) => USA_INFORMATIONAL,
            ("uk", Urgency::Immediate) => UK_IMMEDIATE,
            ("uk", Urgency::Informational) => UK_INFORMATIONAL,
            (_, Urgency::Immediate) => GLOBAL_IMMEDIATE,
            (_, Urgency::Informational) => GLOBAL_INFORMATIONAL,
        };
        table
            .iter()
            .map(|e| CrisisResource {
                name: e.name.to_string(),
                contact: e.contact.to_string(),
                locale: key.to_string(),
                note: e.note.map(str::to_string),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResourceLookupArgs {
    /// Country or locale, e.g. "india", "us", "gb". Defaults to the turn locale.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

/// `resource_lookup`: vetted helplines for a locale.
#[derive(Debug, Default)]
pub struct ResourceLookupTool {
    directory: ResourceDirectory,
}

impl ResourceLookupTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for ResourceLookupTool {
    fn name(&self) -> &str {
        "resource_lookup"
    }

    fn description(&self) -> &str {
        "Look up vetted crisis and support resources for a location."
    }

    fn schema(&self) -> Value {
        schema_of::<ResourceLookupArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let args: ResourceLookupArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let location = args.location.or_else(|| ctx.locale.clone());
        let resources = self.directory.lookup(location.as_deref(), args.urgency);

        if args.urgency == Urgency::Immediate {
            warn!(
                target: "audit",
                user_id = %ctx.user_id,
                turn_id = %ctx.turn_id,
                locale = ResourceDirectory::normalize_locale(location.as_deref()),
                "Immediate crisis resources requested"
            );
        }

        ToolOutput::success(json!({
            "locale": ResourceDirectory::normalize_locale(location.as_deref()),
            "urgency": args.urgency,
            "resources": resources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CrisisDetector {
        CrisisDetector::new(&[]).unwrap()
    }

    #[test]
    fn test_detects_default_phrases_case_insensitively() {
        let d = detector();
        assert!(d.is_crisis("I want to end my life"));
        assert!(d.is_crisis("sometimes I think about SUICIDE"));
        assert!(d.is_crisis("I feel suicidal tonight"));
        assert!(d.is_crisis("I might overdose"));
        assert!(d.is_crisis("I just want to end it all"));
        assert!(d.is_crisis("I keep cutting myself"));
        assert!(d.is_crisis("i want to kill myself"));
    }

    #[test]
    fn test_ordinary_text_passes() {
        let d = detector();
        assert!(!d.is_crisis("I can't sleep before my presentation"));
        assert!(!d.is_crisis("The deadline is killing my weekend"));
        assert!(!d.is_crisis("I want to get better at running"));
    }

    #[test]
    fn test_extra_keywords_match_as_literal_phrases() {
        let d = CrisisDetector::new(&["no way out".into(), "  ".into(), "a+b".into()]).unwrap();
        assert_eq!(d.pattern_count(), DEFAULT_CRISIS_PATTERNS.len() + 2);
        assert!(d.is_crisis("there is No   way out for me"));
        assert!(!d.is_crisis("no way, out of milk"));
    }

    #[test]
    fn test_locale_aliases_normalize() {
        assert_eq!(ResourceDirectory::normalize_locale(Some("IN")), "india");
        assert_eq!(ResourceDirectory::normalize_locale(Some("us")), "usa");
        assert_eq!(ResourceDirectory::normalize_locale(Some("gb")), "uk");
        assert_eq!(ResourceDirectory::normalize_locale(Some("fr")), "global");
        assert_eq!(ResourceDirectory::normalize_locale(None), "global");
    }

    #[test]
    fn test_lookup_is_never_empty() {
        let directory = ResourceDirectory;
        for locale in [Some("india"), Some("usa"), Some("uk"), Some("mars"), None] {
            for urgency in [Urgency::Immediate, Urgency::Informational] {
                assert!(!directory.lookup(locale, urgency).is_empty());
            }
        }
    }

    #[test]
    fn test_unknown_locale_falls_back_to_global() {
        let resources = ResourceDirectory.lookup(Some("atlantis"), Urgency::Immediate);
        assert!(resources.iter().all(|r| r.locale == "global"));
    }

    #[tokio::test]
    async fn test_tool_uses_context_locale_when_unspecified() {
        let ctx = ToolContext::new("u1", "t1").with_locale(Some("uk".into()));
        let out = ResourceLookupTool::new().execute(json!({}), &ctx).await;
        let data = out.data().unwrap();
        assert_eq!(data["locale"], "uk");
        assert_eq!(data["urgency"], "immediate");
        assert_eq!(data["resources"][0]["name"], "Samaritans");
    }

    #[tokio::test]
    async fn test_tool_rejects_unknown_urgency() {
        let ctx = ToolContext::new("u1", "t1");
        let out = ResourceLookupTool::new()
            .execute(json!({"urgency": "whenever"}), &ctx)
            .await;
        assert!(!out.is_success());
    }
}
