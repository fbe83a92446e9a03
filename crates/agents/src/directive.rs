//! Parsing of model output into a reply plus an optional tool call.
//!
//! Specialists are asked to answer either in plain text or with a single
//! JSON directive:
//!
//! ```text
//! {"reply": "...", "tool_call": {"name": "...", "arguments": {...}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDirective {
    pub reply: String,
    pub tool_call: Option<ToolCallRequest>,
}

#[derive(Deserialize)]
struct RawDirective {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    tool_call: Option<ToolCallRequest>,
}

/// Interpret raw model output. Anything that is not a directive is a plain
/// reply with no tool call.
pub fn parse_directive(raw: &str) -> ToolDirective {
    let plain = || ToolDirective {
        reply: raw.trim().to_string(),
        tool_call: None,
    };

    let Some(json) = extract_json_object(raw) else {
        return plain();
    };
    let Ok(directive) = serde_json::from_str::<RawDirective>(json) else {
        return plain();
    };
    if directive.reply.is_none() && directive.tool_call.is_none() {
        return plain();
    }

    let reply = match directive.reply {
        Some(reply) => reply.trim().to_string(),
        // Prose written around the JSON still counts as the reply.
        None => raw.replace(json, "").replace("```json", "").replace("```", "").trim().to_string(),
    };

    ToolDirective {
        reply,
        tool_call: directive.tool_call.filter(|c| !c.name.trim().is_empty()),
    }
}

/// Extract the first balanced JSON object from a string that may contain
/// other text. Braces inside string literals are ignored.
pub fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_object_simple() {
        let input = r#"{"path":"coach","rationale":"sleep worry"}"#;
        assert_eq!(extract_json_object(input), Some(input));
    }

    #[test]
    fn test_extract_json_object_with_text() {
        let input = r#"Here you go: {"path":"plan"} Done!"#;
        assert_eq!(extract_json_object(input), Some(r#"{"path":"plan"}"#));
    }

    #[test]
    fn test_extract_json_object_nested_and_braces_in_strings() {
        let input = r#"{"reply":"use {curly} words \"ok\"","tool_call":{"name":"x","arguments":{}}}"#;
        assert_eq!(extract_json_object(input), Some(input));
    }

    #[test]
    fn test_extract_json_object_none_or_incomplete() {
        assert_eq!(extract_json_object("No JSON here"), None);
        assert_eq!(extract_json_object(r#"{"path":"coach""#), None);
    }

    #[test]
    fn test_plain_text_is_reply_only() {
        let directive = parse_directive("  That sounds really hard.  ");
        assert_eq!(directive.reply, "That sounds really hard.");
        assert!(directive.tool_call.is_none());
    }

    #[test]
    fn test_directive_with_tool_call() {
        let raw = r#"```json
{"reply": "Let's book it.", "tool_call": {"name": "schedule_activity", "arguments": {"activity": "walk", "start": "18:00"}}}
```"#;
        let directive = parse_directive(raw);
        assert_eq!(directive.reply, "Let's book it.");
        let call = directive.tool_call.unwrap();
        assert_eq!(call.name, "schedule_activity");
        assert_eq!(call.arguments["start"], "18:00");
    }

    #[test]
    fn test_tool_call_without_reply_keeps_surrounding_prose() {
        let raw = r#"I'll note that down. {"tool_call": {"name": "log_mood", "arguments": {"valence": 2, "emotion": "tired"}}}"#;
        let directive = parse_directive(raw);
        assert_eq!(directive.reply, "I'll note that down.");
        assert_eq!(directive.tool_call.unwrap().arguments, json!({"valence": 2, "emotion": "tired"}));
    }

    #[test]
    fn test_unrelated_json_is_treated_as_text() {
        let raw = r#"Example: {"mood": 3}"#;
        let directive = parse_directive(raw);
        assert_eq!(directive.reply, raw);
        assert!(directive.tool_call.is_none());
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let directive = parse_directive(r#"{"reply":"ok","tool_call":{"name":"symptom_checker"}}"#);
        assert_eq!(directive.tool_call.unwrap().arguments, json!({}));
    }

    #[test]
    fn test_blank_tool_name_is_dropped() {
        let directive = parse_directive(r#"{"reply":"ok","tool_call":{"name":"  "}}"#);
        assert!(directive.tool_call.is_none());
    }
}
