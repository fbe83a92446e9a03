//! Non-diagnostic screening helpers: symptom keyword heuristic and PHQ-9
//! scoring.

use async_trait::async_trait;
use std::sync::LazyLock;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use withyou_common::Phq9Answers;

use crate::crisis::DEFAULT_CRISIS_PATTERNS;
use crate::{Tool, ToolContext, ToolOutput, parse_args, schema_of};

pub const DISCLAIMER: &str = "This is not a diagnosis. Only a qualified professional can assess \
     your situation. If you feel unsafe, contact local emergency services.";

const MAX_SYMPTOM_TEXT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomSeverity {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomFlags {
    pub self_harm: bool,
    pub low_mood: bool,
    pub anxiety: bool,
    pub sleep: bool,
    pub appetite: bool,
    pub concentration: bool,
}

impl SymptomFlags {
    fn count(&self) -> usize {
        [
            self.self_harm,
            self.low_mood,
            self.anxiety,
            self.sleep,
            self.appetite,
            self.concentration,
        ]
        .into_iter()
        .filter(|f| *f)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomAssessment {
    pub severity: SymptomSeverity,
    pub flags: SymptomFlags,
    pub suggestion: String,
    pub disclaimer: String,
}

fn any_of(words: &[&str]) -> Regex {
    let alternation = words.join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b")).unwrap()
}

static SELF_HARM: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DEFAULT_CRISIS_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
        .collect()
});
static LOW_MOOD: LazyLock<Regex> = LazyLock::new(|| {
    any_of(&["sad", "depressed", "hopeless", "empty", "worthless", "numb", "down", "crying"])
});
static ANXIETY: LazyLock<Regex> = LazyLock::new(|| {
    any_of(&["anxious", "anxiety", "panic", "panicking", "nervous", "worried", "worry", "on edge", "racing thoughts"])
});
static SLEEP: LazyLock<Regex> = LazyLock::new(|| {
    any_of(&["can't sleep", "cannot sleep", "insomnia", "sleepless", "awake all night", "sleeping too much", "oversleeping"])
});
static APPETITE: LazyLock<Regex> = LazyLock::new(|| {
    any_of(&["not eating", "no appetite", "overeating", "lost weight", "can't eat"])
});
static CONCENTRATION: LazyLock<Regex> = LazyLock::new(|| {
    any_of(&["can't focus", "cannot focus", "can't concentrate", "distracted", "brain fog"])
});

/// Keyword heuristic over free text. Any self-harm phrase is `High`; two
/// or more other symptom groups are `Moderate`.
pub fn check_symptoms(text: &str) -> SymptomAssessment {
    let text = text.replace('’', "'");
    let flags = SymptomFlags {
        self_harm: SELF_HARM.iter().any(|r| r.is_match(&text)),
        low_mood: LOW_MOOD.is_match(&text),
        anxiety: ANXIETY.is_match(&text),
        sleep: SLEEP.is_match(&text),
        appetite: APPETITE.is_match(&text),
        concentration: CONCENTRATION.is_match(&text),
    };

    let (severity, suggestion) = if flags.self_harm {
        (
            SymptomSeverity::High,
            "Please reach out to a crisis line or someone you trust right now.",
        )
    } else if flags.count() >= 2 {
        (
            SymptomSeverity::Moderate,
            "Consider talking to a mental health professional about these symptoms.",
        )
    } else {
        (
            SymptomSeverity::Low,
            "Self-care strategies and regular check-ins may help.",
        )
    };

    SymptomAssessment {
        severity,
        flags,
        suggestion: suggestion.to_string(),
        disclaimer: DISCLAIMER.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phq9Severity {
    Minimal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
}

impl Phq9Severity {
    pub fn from_total(total: u8) -> Self {
        match total {
            0..=4 => Self::Minimal,
            5..=9 => Self::Mild,
            10..=14 => Self::Moderate,
            15..=19 => Self::ModeratelySevere,
            _ => Self::Severe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::ModeratelySevere => "moderately_severe",
            Self::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phq9Score {
    pub total: u8,
    pub severity: Phq9Severity,
    /// Item 9 (thoughts of self harm) answered above zero.
    pub self_harm_flag: bool,
}

pub fn score_phq9(answers: &Phq9Answers) -> Phq9Score {
    let total: u8 = answers.items().iter().sum();
    Phq9Score {
        total,
        severity: Phq9Severity::from_total(total),
        self_harm_flag: answers.self_harm_item() > 0,
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SymptomCheckerArgs {
    /// The user's own description of how they have been feeling.
    pub symptoms: String,
}

/// `symptom_checker`: keyword screening with a mandatory disclaimer.
#[derive(Debug, Default)]
pub struct SymptomCheckerTool;

#[async_trait]
impl Tool for SymptomCheckerTool {
    fn name(&self) -> &str {
        "symptom_checker"
    }

    fn description(&self) -> &str {
        "Screen a description of symptoms for severity. Not a diagnosis."
    }

    fn schema(&self) -> Value {
        schema_of::<SymptomCheckerArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutput {
        let args: SymptomCheckerArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let symptoms = args.symptoms.trim();
        if symptoms.is_empty() {
            return ToolOutput::invalid("symptoms must not be empty");
        }
        if symptoms.chars().count() > MAX_SYMPTOM_TEXT_CHARS {
            return ToolOutput::invalid(format!(
                "symptoms must be at most {MAX_SYMPTOM_TEXT_CHARS} characters"
            ));
        }
        match serde_json::to_value(check_symptoms(symptoms)) {
            Ok(data) => ToolOutput::success(data),
            Err(e) => ToolOutput::error(crate::ToolErrorCode::Internal, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_self_harm_language_is_high() {
        let assessment = check_symptoms("I keep thinking about hurting myself");
        assert_eq!(assessment.severity, SymptomSeverity::High);
        assert!(assessment.flags.self_harm);
        assert!(!assessment.disclaimer.is_empty());
    }

    #[test]
    fn test_multiple_groups_are_moderate() {
        let assessment = check_symptoms("I can’t sleep and I feel anxious all day");
        assert_eq!(assessment.severity, SymptomSeverity::Moderate);
        assert!(assessment.flags.sleep);
        assert!(assessment.flags.anxiety);
    }

    #[test]
    fn test_single_group_is_low() {
        let assessment = check_symptoms("I can't sleep before my presentation");
        assert_eq!(assessment.severity, SymptomSeverity::Low);
        assert!(assessment.flags.sleep);
        assert!(!assessment.flags.self_harm);
    }

    #[test]
    fn test_phq9_bands() {
        let cases = [
            (0, Phq9Severity::Minimal),
            (4, Phq9Severity::Minimal),
            (5, Phq9Severity::Mild),
            (9, Phq9Severity::Mild),
            (10, Phq9Severity::Moderate),
            (14, Phq9Severity::Moderate),
            (15, Phq9Severity::ModeratelySevere),
            (19, Phq9Severity::ModeratelySevere),
            (20, Phq9Severity::Severe),
            (27, Phq9Severity::Severe),
        ];
        for (total, expected) in cases {
            assert_eq!(Phq9Severity::from_total(total), expected, "total {total}");
        }
    }

    #[test]
    fn test_phq9_score_flags_item_nine() {
        let answers = Phq9Answers::new([3, 3, 2, 2, 1, 1, 0, 0, 1]).unwrap();
        let score = score_phq9(&answers);
        assert_eq!(score.total, 13);
        assert_eq!(score.severity, Phq9Severity::Moderate);
        assert!(score.self_harm_flag);

        let calm = Phq9Answers::new([0; 9]).unwrap();
        assert!(!score_phq9(&calm).self_harm_flag);
    }

    #[tokio::test]
    async fn test_tool_returns_assessment_payload() {
        let ctx = ToolContext::new("u1", "t1");
        let out = SymptomCheckerTool
            .execute(json!({"symptoms": "feeling hopeless and can't focus"}), &ctx)
            .await;
        let data = out.data().unwrap();
        assert_eq!(data["severity"], "moderate");
        assert_eq!(data["flags"]["low_mood"], true);
        assert_eq!(data["flags"]["concentration"], true);
        assert!(data["disclaimer"].as_str().unwrap().contains("not a diagnosis"));
    }

    #[tokio::test]
    async fn test_tool_rejects_empty_text() {
        let ctx = ToolContext::new("u1", "t1");
        let out = SymptomCheckerTool.execute(json!({"symptoms": " "}), &ctx).await;
        assert!(!out.is_success());
    }
}
