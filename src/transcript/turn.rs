//! Turns and the per-session chat history

use super::ContentBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged exchange in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// User prompt as typed, without the pre-prompt prefix
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![ContentBlock::text(text)],
            created_at: Utc::now(),
        }
    }

    /// Empty assistant turn, filled in by the reducer
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            blocks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// All text blocks joined, mainly for logging and tests
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Ordered turns of one session; append-only until reset
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_has_single_text_block() {
        let turn = Turn::user("hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.blocks, vec![ContentBlock::text("hello")]);
    }

    #[test]
    fn test_history_append_and_clear() {
        let mut history = ChatHistory::new();
        assert!(history.is_empty());

        history.push(Turn::user("q"));
        history.push(Turn::assistant());
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[1].role, Role::Assistant);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_serializes_as_list() {
        let mut history = ChatHistory::new();
        history.push(Turn::user("q"));
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value[0]["role"], "user");
        assert_eq!(value[0]["blocks"][0]["content"], "q");
    }
}
