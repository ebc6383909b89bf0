//! Chat transcript
//!
//! Append-only record of the conversation with the interviewer. Held only in
//! memory; the backend is the durable authority for interview state.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "you"),
            ChatRole::Assistant => write!(f, "interviewer"),
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// Append-only ordered transcript for one page of conversation
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    /// Append an entry stamped with the current local time, returning a copy
    /// for rendering.
    pub(crate) fn append(&mut self, role: ChatRole, content: impl Into<String>) -> ChatEntry {
        let entry = ChatEntry {
            role,
            content: content.into(),
            timestamp: Local::now(),
        };
        self.entries.push(entry.clone());
        entry
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(dead_code)]
    pub(crate) fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut transcript = Transcript::default();
        transcript.append(ChatRole::User, "hello");
        transcript.append(ChatRole::Assistant, "welcome");
        transcript.append(ChatRole::User, "thanks");

        assert_eq!(transcript.len(), 3);
        let contents: Vec<&str> = transcript
            .entries()
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(contents, vec!["hello", "welcome", "thanks"]);
        assert_eq!(transcript.entries()[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
