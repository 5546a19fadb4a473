//! Retrieval-augmented responder.
//!
//! Given an inbound message, detects the language, retrieves matching
//! knowledge chunks, assembles a persona-governed prompt, calls the
//! completion service, and evaluates the escalation rule table. Any
//! unrecoverable failure propagates — sending a degraded or wrong answer
//! is worse than visibly failing, so there is no silent fallback reply.

pub mod escalation;
pub mod language;
pub mod prompts;

pub use escalation::{EscalationCategory, EscalationRules};
pub use language::detect_language;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ResponderConfig;
use crate::error::Error;
use crate::index::{ChunkFilter, VectorIndex};
use crate::llm::{CompletionClient, CompletionRequest, EmbeddingClient};
use crate::models::{AgentType, Channel, Confidence, Language, Lead, Message};

/// Output of a generation run.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub response: String,
    pub language: Language,
    /// Titles of the documents whose chunks were retrieved.
    pub docs_used: Vec<String>,
    pub confidence: Confidence,
    pub should_escalate: bool,
    pub reasoning: String,
}

/// Retrieval-augmented reply generator.
pub struct Responder {
    completion: Arc<dyn CompletionClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    escalation: EscalationRules,
    config: ResponderConfig,
}

impl Responder {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        embeddings: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        escalation: EscalationRules,
        config: ResponderConfig,
    ) -> Self {
        Self {
            completion,
            embeddings,
            index,
            escalation,
            config,
        }
    }

    /// Generate a reply for an inbound message.
    pub async fn generate(
        &self,
        incoming: &str,
        agent: AgentType,
        channel: Channel,
        lead: &Lead,
        history: &[Message],
    ) -> Result<GeneratedReply, Error> {
        // 1. Language detection (deterministic; defaults to English).
        let language = detect_language(incoming);

        // 2. Retrieval. Empty results are valid — confidence drops instead.
        let query_vector = self.embeddings.embed(incoming).await?;
        let filter = ChunkFilter { agent, language };
        let chunks = self
            .index
            .query(&query_vector, self.config.top_k, &filter)
            .await?;

        debug!(
            lead_id = %lead.id,
            agent = %agent,
            language = %language,
            retrieved = chunks.len(),
            "Retrieved knowledge context"
        );

        // 3–4. Prompt assembly and completion, output capped per channel.
        let max_tokens = match channel {
            Channel::Sms => self.config.sms_max_tokens,
            Channel::Email => self.config.email_max_tokens,
        };
        let request = CompletionRequest {
            system: prompts::system_prompt(agent).to_string(),
            prompt: prompts::build_user_prompt(
                &chunks,
                history,
                incoming,
                language,
                self.config.history_limit,
            ),
            max_tokens,
            temperature: self.config.temperature,
        };
        let response = self.completion.complete(request).await?;

        // 5. Escalation check — independent of model output.
        let escalation_hit = self.escalation.check(incoming);
        let should_escalate = escalation_hit.is_some();

        // 6. Two-level confidence proxy.
        let confidence = if chunks.is_empty() {
            Confidence::Low
        } else {
            Confidence::High
        };

        let mut docs_used: Vec<String> = Vec::new();
        for chunk in &chunks {
            if !docs_used.contains(&chunk.metadata.title) {
                docs_used.push(chunk.metadata.title.clone());
            }
        }

        let reasoning = match escalation_hit {
            Some(keyword) => format!("escalation keyword matched: \"{}\"", keyword.phrase),
            None => format!(
                "answered from {} retrieved chunk(s) across {} document(s)",
                chunks.len(),
                docs_used.len()
            ),
        };

        info!(
            lead_id = %lead.id,
            language = %language,
            confidence = ?confidence,
            should_escalate,
            "Generated reply"
        );

        Ok(GeneratedReply {
            response: response.content,
            language,
            docs_used,
            confidence,
            should_escalate,
            reasoning,
        })
    }
}
