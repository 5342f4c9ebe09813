//! Context captured per top-level action and the prompts built from it.

use serde::{Deserialize, Serialize};

use crate::selection::PageContext;

use super::history::{ConversationHistory, Role};

/// Replaced wholesale on every Explain or search action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub selection: String,
    pub paragraph: String,
    pub heading: String,
    pub url: String,
}

impl ContextSnapshot {
    pub fn new(selection: impl Into<String>, page: PageContext) -> Self {
        Self {
            selection: selection.into(),
            paragraph: page.paragraph,
            heading: page.heading,
            url: page.url,
        }
    }
}

fn context_block(ctx: &ContextSnapshot) -> String {
    format!(
        "Page: {}\nSection: {}\nSurrounding paragraph: {}",
        ctx.url, ctx.heading, ctx.paragraph
    )
}

pub fn explain_prompt(ctx: &ContextSnapshot) -> String {
    format!(
        "Explain the selected text in plain language for a curious reader.\n\n\
         Selected text: \"{}\"\n{}\n\n\
         Keep the answer short and focused on what the selection means here.",
        ctx.selection,
        context_block(ctx)
    )
}

pub fn search_prompt(query: &str, ctx: &ContextSnapshot) -> String {
    format!(
        "Answer the question using the page as context.\n\n\
         Question: {}\nSelected text: \"{}\"\n{}",
        query,
        ctx.selection,
        context_block(ctx)
    )
}

/// Follow-up prompt: the whole conversation so far plus the last context.
pub fn deeper_prompt(history: &ConversationHistory, ctx: &ContextSnapshot, follow_up: &str) -> String {
    let mut transcript = String::new();
    for entry in history.entries() {
        let speaker = match entry.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(&entry.content);
        transcript.push_str("\n\n");
    }

    format!(
        "Continue the conversation below about \"{}\".\n{}\n\n{}User: {}\n\n\
         Go deeper than the previous answer.",
        ctx.selection,
        context_block(ctx),
        transcript,
        follow_up
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relativity() -> ContextSnapshot {
        ContextSnapshot::new(
            "E=mc²",
            PageContext {
                paragraph: "Mass and energy are interchangeable.".into(),
                heading: "Relativity".into(),
                url: "https://example.com".into(),
            },
        )
    }

    #[test]
    fn explain_prompt_embeds_each_field_once() {
        let prompt = explain_prompt(&relativity());
        for field in ["E=mc²", "Relativity", "https://example.com", "Mass and energy are interchangeable."] {
            assert_eq!(prompt.matches(field).count(), 1, "{field}");
        }
    }

    #[test]
    fn deeper_prompt_carries_transcript_and_follow_up() {
        let ctx = relativity();
        let mut history = ConversationHistory::start(explain_prompt(&ctx));
        history.push_assistant("Energy equals mass times c squared.");
        let prompt = deeper_prompt(&history, &ctx, "What is c?");
        assert!(prompt.contains("Assistant: Energy equals mass times c squared."));
        assert!(prompt.ends_with("User: What is c?\n\nGo deeper than the previous answer."));
    }
}
