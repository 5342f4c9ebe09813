use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation. Entry 0 is the full constructed prompt and is never
/// part of the visible transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh conversation whose first entry is `prompt`.
    pub fn start(prompt: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.push_user(prompt);
        history
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(HistoryEntry {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.entries.push(HistoryEntry {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn visible(&self) -> &[HistoryEntry] {
        self.entries.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_transcript_skips_the_prompt() {
        let mut history = ConversationHistory::start("full prompt");
        assert!(history.visible().is_empty());

        history.push_assistant("answer");
        history.push_user("why?");
        let visible: Vec<&str> = history.visible().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(visible, ["answer", "why?"]);
        assert!(ConversationHistory::new().visible().is_empty());
    }
}
