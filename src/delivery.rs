//! Delivery policy engine — decides whether a generated reply is escalated,
//! auto-sent, or queued for human approval.
//!
//! A three-way exhaustive switch; there is no fourth path. Exactly one
//! message is written to the conversation log per decision (a failed
//! auto-send writes none and is retried by operators from the log).

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{EmailTransport, SmsTransport};
use crate::config::AgentSettings;
use crate::error::Error;
use crate::models::{
    ApprovalItem, ApprovalStatus, Channel, Conversation, ConversationStatus, Direction, Lead,
    Message, MessageStatus, ResponseContext,
};
use crate::responder::GeneratedReply;
use crate::store::Store;

/// Subject line used for auto-sent and approved email replies.
pub const REPLY_SUBJECT: &str = "Re: your message";

/// Pure policy decision, separated from its side effects for testability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    Escalate,
    AutoSend,
    Queue,
}

/// What actually happened when the decision was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Internal note written, conversation escalated, nothing sent.
    Escalated,
    /// Reply sent and logged.
    Sent,
    /// Transport failed; logged, pipeline kept alive, nothing recorded as sent.
    SendFailed,
    /// Approval item created, reply queued.
    Queued { approval_id: Uuid },
}

/// Map (should_escalate, auto_send) to exactly one decision.
pub fn decide(should_escalate: bool, auto_send: bool) -> DeliveryDecision {
    if should_escalate {
        DeliveryDecision::Escalate
    } else if auto_send {
        DeliveryDecision::AutoSend
    } else {
        DeliveryDecision::Queue
    }
}

/// Executes delivery decisions against the store and transports.
pub struct DeliveryEngine {
    store: Arc<dyn Store>,
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self { store, email, sms }
    }

    /// Execute the policy for a generated reply.
    pub async fn dispatch(
        &self,
        conversation: &Conversation,
        lead: &Lead,
        original_message: &str,
        reply: &GeneratedReply,
        settings: &AgentSettings,
    ) -> Result<DeliveryOutcome, Error> {
        let decision = decide(reply.should_escalate, settings.auto_send);
        let destination = lead.identity.key().to_string();

        match decision {
            DeliveryDecision::Escalate => self.escalate(conversation, reply).await,
            DeliveryDecision::AutoSend => {
                self.auto_send(conversation, reply, &destination, settings).await
            }
            DeliveryDecision::Queue => {
                self.queue(conversation, original_message, reply, &destination).await
            }
        }
    }

    async fn escalate(
        &self,
        conversation: &Conversation,
        reply: &GeneratedReply,
    ) -> Result<DeliveryOutcome, Error> {
        let note = format!(
            "Escalated to a human agent ({}). Suggested reply withheld: {}",
            reply.reasoning, reply.response
        );
        self.append_outbound(conversation, note, MessageStatus::InternalNote, reply)
            .await?;
        self.store
            .update_conversation_status(conversation.id, ConversationStatus::Escalated)
            .await?;

        info!(
            conversation_id = %conversation.id,
            reasoning = %reply.reasoning,
            "Conversation escalated"
        );
        Ok(DeliveryOutcome::Escalated)
    }

    async fn auto_send(
        &self,
        conversation: &Conversation,
        reply: &GeneratedReply,
        destination: &str,
        settings: &AgentSettings,
    ) -> Result<DeliveryOutcome, Error> {
        if let Some((min_ms, max_ms)) = settings.typing_delay_ms {
            let delay = rand::thread_rng().gen_range(min_ms..=max_ms.max(min_ms));
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let send_result = match conversation.channel {
            Channel::Email => {
                self.email
                    .send(destination, REPLY_SUBJECT, &reply.response)
                    .await
            }
            Channel::Sms => self.sms.send(destination, &reply.response).await,
        };

        match send_result {
            Ok(()) => {
                self.append_outbound(
                    conversation,
                    reply.response.clone(),
                    MessageStatus::Sent,
                    reply,
                )
                .await?;
                self.store
                    .record_message_activity(conversation.id, Direction::Outbound, Utc::now())
                    .await?;
                info!(conversation_id = %conversation.id, "Auto-sent reply");
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => {
                // Swallowed on purpose: a transport failure must not take
                // down the request pipeline.
                warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "Auto-send transport failure"
                );
                Ok(DeliveryOutcome::SendFailed)
            }
        }
    }

    async fn queue(
        &self,
        conversation: &Conversation,
        original_message: &str,
        reply: &GeneratedReply,
        destination: &str,
    ) -> Result<DeliveryOutcome, Error> {
        let item = ApprovalItem {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            agent: conversation.agent,
            channel: conversation.channel,
            original_message: original_message.to_string(),
            proposed_response: reply.response.clone(),
            reasoning: reply.reasoning.clone(),
            docs_used: reply.docs_used.clone(),
            status: ApprovalStatus::Pending,
            destination: destination.to_string(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        let approval_id = item.id;
        self.store.insert_approval(item).await?;

        self.append_outbound(
            conversation,
            reply.response.clone(),
            MessageStatus::PendingApproval,
            reply,
        )
        .await?;

        info!(
            conversation_id = %conversation.id,
            approval_id = %approval_id,
            "Reply queued for approval"
        );
        Ok(DeliveryOutcome::Queued { approval_id })
    }

    async fn append_outbound(
        &self,
        conversation: &Conversation,
        content: String,
        status: MessageStatus,
        reply: &GeneratedReply,
    ) -> Result<(), Error> {
        self.store
            .append_message(Message {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                direction: Direction::Outbound,
                sender: conversation.agent.to_string(),
                channel: conversation.channel,
                content,
                status,
                context: Some(ResponseContext {
                    docs_used: reply.docs_used.clone(),
                    confidence: reply.confidence,
                    reasoning: reply.reasoning.clone(),
                }),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
