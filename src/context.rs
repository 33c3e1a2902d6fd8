//! Context assembly: merges the system policy, retrieved document chunks,
//! and recent history into the ordered message list sent to the model.

use crate::llm::ChatMessage;

/// How many stored messages of history ride along with each submission.
pub const HISTORY_WINDOW: usize = 6;

/// Upper bound on the retrieved-context system entry. The concatenated
/// chunks are cut to their first `MAX_CONTEXT_CHARS` characters so the
/// request always fits the model's input limit.
pub const MAX_CONTEXT_CHARS: usize = 6000;

/// User-facing answer-style switches. Rendering is a pure function of the
/// flags: same flags, same instruction text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct SystemPolicy {
    /// Lead with code, then a short explanation.
    pub code_first: bool,
    /// Keep answers short.
    pub concise: bool,
}

impl SystemPolicy {
    pub fn render(&self) -> String {
        let mut text = String::from("You are a helpful assistant.");
        text.push_str(
            "\n\nRules:\
             \n- If the user asks to explain a topic, explain clearly without code.\
             \n- If the user asks for code, give code first, then a short explanation.\
             \n- Keep answers clean and structured.",
        );
        if self.code_first {
            text.push_str("\n- Prefer showing code before prose whenever code is involved.");
        }
        if self.concise {
            text.push_str("\n- Be brief: a few sentences unless more is essential.");
        }
        text
    }
}

/// Builds the ordered message list for one submission:
/// system policy, then (if any) one system entry of retrieved chunks
/// nearest-first, then the last [`HISTORY_WINDOW`] messages in
/// chronological order, then the new user message.
pub fn build_context(
    policy: &SystemPolicy,
    retrieved_chunks: &[String],
    history: &[ChatMessage],
    new_user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(HISTORY_WINDOW + 3);
    messages.push(ChatMessage::new("system", policy.render()));

    if !retrieved_chunks.is_empty() {
        messages.push(ChatMessage::new(
            "system",
            render_retrieved(retrieved_chunks),
        ));
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    messages.extend(history[start..].iter().cloned());

    messages.push(ChatMessage::new("user", new_user_text));
    messages
}

fn render_retrieved(chunks: &[String]) -> String {
    let mut body = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            body.push_str("\n\n---\n\n");
        }
        body.push_str(chunk);
    }
    let body: String = body.chars().take(MAX_CONTEXT_CHARS).collect();
    format!(
        "Excerpts from the user's uploaded documents, most relevant first. \
         Answer from these when they are relevant:\n\n{body}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    #[test]
    fn empty_history_yields_system_then_user() {
        let context = build_context(&SystemPolicy::default(), &[], &[], "hello");
        let roles: Vec<&str> = context.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user"]);
        assert_eq!(context.last().unwrap().content, "hello");
    }

    #[test]
    fn retrieved_chunks_become_a_second_system_entry() {
        let chunks = vec!["first chunk".to_string(), "second chunk".to_string()];
        let context = build_context(&SystemPolicy::default(), &chunks, &[], "q");
        let roles: Vec<&str> = context.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "system", "user"]);
        let ctx = &context[1].content;
        assert!(ctx.contains("first chunk"));
        // Nearest chunk comes first in the rendered entry.
        assert!(ctx.find("first chunk").unwrap() < ctx.find("second chunk").unwrap());
    }

    #[test]
    fn history_is_windowed_to_the_most_recent_entries() {
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| msg(if i % 2 == 0 { "user" } else { "assistant" }, &format!("m{i}")))
            .collect();
        let context = build_context(&SystemPolicy::default(), &[], &history, "new");
        // system + 6 history + new user message
        assert_eq!(context.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(context[1].content, "m4");
        assert_eq!(context[context.len() - 2].content, "m9");
    }

    #[test]
    fn oversized_context_is_truncated_deterministically() {
        let chunks = vec!["x".repeat(MAX_CONTEXT_CHARS * 2)];
        let a = build_context(&SystemPolicy::default(), &chunks, &[], "q");
        let b = build_context(&SystemPolicy::default(), &chunks, &[], "q");
        assert_eq!(a[1].content, b[1].content);
        assert!(a[1].content.chars().count() < MAX_CONTEXT_CHARS + 200);
    }

    #[test]
    fn policy_rendering_is_pure() {
        let policy = SystemPolicy {
            code_first: true,
            concise: false,
        };
        assert_eq!(policy.render(), policy.render());
        assert_ne!(policy.render(), SystemPolicy::default().render());
    }
}
