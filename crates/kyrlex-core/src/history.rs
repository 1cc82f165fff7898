//! Conversation history rendered into the prompt.
//!
//! Only the tail of a conversation matters: the two turns before the latest exchange
//! are shortened at a sentence boundary, and the latest exchange is kept verbatim.

use std::fmt;

/// Character budget for each older turn.
pub const OLDER_TURN_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    /// Record a question and its answer.
    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.push(Role::User, question);
        self.push(Role::Assistant, answer);
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

    /// Render recent turns as `role: content` lines, or "" for a fresh conversation.
    pub fn render(&self) -> String {
        let n = self.turns.len();
        if n <= 2 {
            return String::new();
        }

        let older_start = n.saturating_sub(4);
        let mut lines = Vec::with_capacity(4);

        for turn in &self.turns[older_start..n - 2] {
            lines.push(format!(
                "{}: {}",
                turn.role,
                truncate_at_sentence(&turn.content, OLDER_TURN_CHARS)
            ));
        }
        for turn in &self.turns[n - 2..] {
            lines.push(format!("{}: {}", turn.role, turn.content));
        }

        lines.join("\n")
    }
}

/// Shorten `text` to at most `max_chars` characters, preferring a sentence boundary.
///
/// Text within the budget is returned unchanged. Otherwise the cut goes after the last
/// sentence end (`. `, `! `, `? `) in the second half of the budget, then at the last
/// space with `...` appended, then mid-word with `...` appended.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();

    let sentence_end = [". ", "! ", "? "]
        .iter()
        .filter_map(|p| truncated.rfind(p))
        .max();
    if let Some(pos) = sentence_end {
        if 2 * truncated[..pos].chars().count() > max_chars {
            return truncated[..=pos].to_string();
        }
    }

    if let Some(pos) = truncated.rfind(' ').filter(|&pos| pos > 0) {
        return format!("{}...", &truncated[..pos]);
    }

    format!("{}...", truncated)
}
