//! Turn input and transcript message types.

use crate::{Result, WithYouError};
use serde::{Deserialize, Serialize};

/// Number of items on the PHQ-9 questionnaire.
pub const PHQ9_ITEM_COUNT: usize = 9;

/// Highest score a single PHQ-9 item can take ("nearly every day").
pub const PHQ9_MAX_ITEM_SCORE: u8 = 3;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Raw PHQ-9 item scores, in questionnaire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Phq9Answers {
    items: [u8; PHQ9_ITEM_COUNT],
}

impl Phq9Answers {
    pub fn new(items: [u8; PHQ9_ITEM_COUNT]) -> Result<Self> {
        if let Some((idx, score)) = items
            .iter()
            .enumerate()
            .find(|(_, s)| **s > PHQ9_MAX_ITEM_SCORE)
        {
            return Err(WithYouError::InvalidInput(format!(
                "PHQ-9 item {} has score {}, expected 0..={}",
                idx + 1,
                score,
                PHQ9_MAX_ITEM_SCORE
            )));
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[u8; PHQ9_ITEM_COUNT] {
        &self.items
    }

    /// Item 9: thoughts that you would be better off dead or of hurting yourself.
    pub fn self_harm_item(&self) -> u8 {
        self.items[PHQ9_ITEM_COUNT - 1]
    }
}

impl TryFrom<Vec<u8>> for Phq9Answers {
    type Error = WithYouError;

    fn try_from(value: Vec<u8>) -> Result<Self> {
        let items: [u8; PHQ9_ITEM_COUNT] = value.as_slice().try_into().map_err(|_| {
            WithYouError::InvalidInput(format!(
                "PHQ-9 requires {} answers, got {}",
                PHQ9_ITEM_COUNT,
                value.len()
            ))
        })?;
        Self::new(items)
    }
}

impl From<Phq9Answers> for Vec<u8> {
    fn from(value: Phq9Answers) -> Self {
        value.items.to_vec()
    }
}

/// Optional structured context that travels with a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// User's region, e.g. "india", "usa", "global".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Whether the user agreed to have a clinical summary shared.
    #[serde(default)]
    pub consent_to_share: bool,

    /// Structured questionnaire answers, if the client collected them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phq9: Option<Phq9Answers>,
}

/// One user turn entering the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    /// Delivery-stable identifier. Redelivering a turn must reuse it.
    pub turn_id: String,

    pub user_id: String,

    pub conversation_id: String,

    /// Raw user text.
    pub text: String,

    #[serde(default)]
    pub metadata: TurnMetadata,

    /// Timestamp (Unix millis)
    pub received_at: u64,
}

impl TurnInput {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            turn_id: format!("turn_{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            text: text.into(),
            metadata: TurnMetadata::default(),
            received_at: now_millis(),
        }
    }

    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = turn_id.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.metadata.locale = Some(locale.into());
        self
    }

    pub fn with_consent(mut self, consent: bool) -> Self {
        self.metadata.consent_to_share = consent;
        self
    }

    pub fn with_phq9(mut self, answers: Phq9Answers) -> Self {
        self.metadata.phq9 = Some(answers);
        self
    }
}

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_builder_methods() {
        let turn = TurnInput::new("user_1", "conv_1", "hello")
            .with_turn_id("turn-42")
            .with_locale("india")
            .with_consent(true);

        assert_eq!(turn.turn_id, "turn-42");
        assert_eq!(turn.metadata.locale.as_deref(), Some("india"));
        assert!(turn.metadata.consent_to_share);
        assert!(turn.received_at > 0);
    }

    #[test]
    fn test_turn_ids_are_unique() {
        let a = TurnInput::new("u", "c", "one");
        let b = TurnInput::new("u", "c", "two");
        assert_ne!(a.turn_id, b.turn_id);
    }

    #[test]
    fn test_phq9_rejects_out_of_range_item() {
        let err = Phq9Answers::new([0, 1, 2, 3, 4, 0, 0, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("item 5"));
    }

    #[test]
    fn test_phq9_rejects_wrong_length() {
        let parsed: std::result::Result<Phq9Answers, _> = serde_json::from_str("[0, 1, 2]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_phq9_self_harm_item_is_last() {
        let answers = Phq9Answers::new([0, 0, 0, 0, 0, 0, 0, 0, 2]).unwrap();
        assert_eq!(answers.self_harm_item(), 2);
    }

    #[test]
    fn test_metadata_deserializes_from_partial_json() {
        let json = r#"{"locale":"usa","phq9":[1,1,1,1,1,1,1,1,0]}"#;
        let meta: TurnMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.locale.as_deref(), Some("usa"));
        assert!(!meta.consent_to_share);
        assert_eq!(meta.phq9.unwrap().self_harm_item(), 0);
    }
}
