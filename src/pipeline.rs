//! End-to-end inbound message handling: identity resolution, logging,
//! generation, and delivery.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::delivery::{DeliveryEngine, DeliveryOutcome};
use crate::error::Error;
use crate::identity::IdentityResolver;
use crate::models::{Channel, Direction, Language, Message, MessageStatus};
use crate::responder::Responder;
use crate::store::{LeadDefaults, Store};

/// An inbound message as extracted from a webhook payload.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw sender identifier (email address or phone number).
    pub sender: String,
    /// Display name if the channel carries one.
    pub sender_name: Option<String>,
    pub channel: Channel,
    pub content: String,
}

/// What the pipeline did with one inbound message.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub lead_id: Uuid,
    pub conversation_id: Uuid,
    pub language: Language,
    pub outcome: DeliveryOutcome,
}

/// Orchestrates one inbound message through the full pipeline.
pub struct InboundPipeline {
    store: Arc<dyn Store>,
    resolver: IdentityResolver,
    responder: Arc<Responder>,
    delivery: Arc<DeliveryEngine>,
    config: Arc<AppConfig>,
}

impl InboundPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        responder: Arc<Responder>,
        delivery: Arc<DeliveryEngine>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(store.clone()),
            store,
            responder,
            delivery,
            config,
        }
    }

    pub async fn handle(&self, inbound: InboundMessage) -> Result<PipelineReport, Error> {
        let agent = self.config.agent_for(inbound.channel);
        let defaults = LeadDefaults::default();

        let lead = self
            .resolver
            .resolve_lead(&inbound.sender, inbound.channel, &defaults)
            .await?;
        let conversation = self
            .resolver
            .resolve_conversation(lead.id, agent, inbound.channel)
            .await?;

        // History is read before the new message lands so the prompt does
        // not contain the incoming text twice.
        let history = self.store.conversation_messages(conversation.id).await?;

        let now = Utc::now();
        self.store
            .append_message(Message {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                direction: Direction::Inbound,
                sender: inbound
                    .sender_name
                    .clone()
                    .unwrap_or_else(|| lead.identity.key().to_string()),
                channel: inbound.channel,
                content: inbound.content.clone(),
                status: MessageStatus::Received,
                context: None,
                created_at: now,
            })
            .await?;
        self.store
            .record_message_activity(conversation.id, Direction::Inbound, now)
            .await?;

        let reply = self
            .responder
            .generate(&inbound.content, agent, inbound.channel, &lead, &history)
            .await?;

        let settings = self.config.agent_settings(agent);
        let outcome = self
            .delivery
            .dispatch(&conversation, &lead, &inbound.content, &reply, settings)
            .await?;

        info!(
            lead_id = %lead.id,
            conversation_id = %conversation.id,
            outcome = ?outcome,
            "Inbound message handled"
        );

        Ok(PipelineReport {
            lead_id: lead.id,
            conversation_id: conversation.id,
            language: reply.language,
            outcome,
        })
    }
}
