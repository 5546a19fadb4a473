//! Persona prompt templates and prompt assembly.

use crate::index::ScoredChunk;
use crate::models::{AgentType, Language, Message};

/// Placeholder interpolated when retrieval comes back empty.
const NO_CONTEXT_PLACEHOLDER: &str =
    "(no relevant knowledge base articles were found for this message)";

/// Policy/persona template for an agent type.
pub fn system_prompt(agent: AgentType) -> &'static str {
    match agent {
        AgentType::Support => {
            "You are a customer support agent for this organization. Answer using ONLY the \
             provided knowledge base context. Be concise, warm, and concrete. If the context \
             does not cover the question, say you will check with the team rather than \
             guessing. Never invent policies, prices, or dates. Never promise refunds or \
             exceptions you cannot verify from the context."
        }
        AgentType::Sales => {
            "You are a sales assistant for this organization. Use the provided knowledge base \
             context to answer questions about offerings and guide the prospect toward the \
             next step (a call, a demo, or a signup). Be helpful first and persuasive second. \
             If the context does not cover the question, offer to connect them with the team. \
             Never invent pricing or commitments."
        }
    }
}

/// Assemble the user prompt: retrieved context, recent history, the incoming
/// message, and an explicit language directive.
pub fn build_user_prompt(
    chunks: &[ScoredChunk],
    history: &[Message],
    incoming: &str,
    language: Language,
    history_limit: usize,
) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str("Knowledge base context:\n");
    if chunks.is_empty() {
        prompt.push_str(NO_CONTEXT_PLACEHOLDER);
        prompt.push('\n');
    } else {
        for chunk in chunks {
            prompt.push_str(&format!("[{}]: {}\n", chunk.metadata.title, chunk.text));
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        let start = history.len().saturating_sub(history_limit);
        for message in &history[start..] {
            prompt.push_str(&format!("{}: {}\n", message.sender, message.content));
        }
    }

    prompt.push_str(&format!("\nCustomer message:\n{incoming}\n"));

    let directive = match language {
        Language::En => "Respond in English.",
        Language::Es => "Responde en español.",
    };
    prompt.push('\n');
    prompt.push_str(directive);

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{Channel, ChunkMetadata, Direction, MessageStatus};

    fn chunk(title: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            id: format!("{title}_chunk_0"),
            score: 0.9,
            text: text.into(),
            metadata: ChunkMetadata {
                document_id: title.into(),
                title: title.into(),
                category: "faq".into(),
                language: crate::models::LanguageScope::Both,
                audience: crate::models::Audience::Both,
            },
        }
    }

    fn message(sender: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            direction: Direction::Inbound,
            sender: sender.into(),
            channel: Channel::Email,
            content: content.into(),
            status: MessageStatus::Received,
            context: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn personas_differ() {
        assert!(system_prompt(AgentType::Support).contains("support"));
        assert!(system_prompt(AgentType::Sales).contains("sales"));
        assert_ne!(system_prompt(AgentType::Support), system_prompt(AgentType::Sales));
    }

    #[test]
    fn context_is_rendered_title_then_text() {
        let prompt = build_user_prompt(
            &[chunk("Shipping", "We ship within 2 days.")],
            &[],
            "When will my order arrive?",
            Language::En,
            6,
        );
        assert!(prompt.contains("[Shipping]: We ship within 2 days."));
        assert!(prompt.contains("When will my order arrive?"));
        assert!(prompt.ends_with("Respond in English."));
    }

    #[test]
    fn empty_retrieval_gets_placeholder() {
        let prompt = build_user_prompt(&[], &[], "hello", Language::En, 6);
        assert!(prompt.contains(NO_CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn history_is_limited_to_last_n() {
        let history: Vec<Message> = (0..10)
            .map(|i| message("customer", &format!("message {i}")))
            .collect();
        let prompt = build_user_prompt(&[], &history, "latest", Language::En, 3);
        assert!(!prompt.contains("message 6"));
        assert!(prompt.contains("message 7"));
        assert!(prompt.contains("message 9"));
    }

    #[test]
    fn spanish_directive_is_appended() {
        let prompt = build_user_prompt(&[], &[], "hola", Language::Es, 6);
        assert!(prompt.ends_with("Responde en español."));
    }
}
