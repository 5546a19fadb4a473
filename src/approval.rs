//! Human approval workflow over queued replies.
//!
//! Pending items can be edited, approved, or rejected. Approved and
//! rejected are terminal; the store enforces that at most one terminal
//! transition succeeds, and conflicts surface as `InvalidTransition`.
//!
//! Approve sends first and completes second: if the transport fails the
//! item stays pending and the operator can retry.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::channels::{EmailTransport, SmsTransport};
use crate::delivery::REPLY_SUBJECT;
use crate::error::{ApprovalError, Error, StoreError};
use crate::models::{
    ApprovalItem, ApprovalStatus, Channel, Direction, Message, MessageStatus,
};
use crate::store::Store;

pub struct ApprovalWorkflow {
    store: Arc<dyn Store>,
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
}

impl ApprovalWorkflow {
    pub fn new(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self { store, email, sms }
    }

    pub async fn pending(&self) -> Result<Vec<ApprovalItem>, Error> {
        Ok(self.store.pending_approvals().await?)
    }

    /// Replace the proposed response of a still-pending item.
    pub async fn edit(&self, id: Uuid, text: &str) -> Result<ApprovalItem, Error> {
        match self.store.edit_approval(id, text).await {
            Ok(item) => Ok(item),
            Err(e) => Err(self.map_conflict(id, e, "edit").await),
        }
    }

    /// Approve a pending item: send the (possibly edited) reply over the
    /// item's channel, then mark it approved and log the sent message.
    pub async fn approve(&self, id: Uuid, edited: Option<&str>) -> Result<ApprovalItem, Error> {
        let item = self
            .store
            .get_approval(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "approval".into(),
                id: id.to_string(),
            })?;
        if item.status != ApprovalStatus::Pending {
            return Err(ApprovalError::InvalidTransition {
                id,
                status: item.status.to_string(),
                action: "approve".into(),
            }
            .into());
        }

        let body = edited.unwrap_or(&item.proposed_response);
        match item.channel {
            Channel::Email => {
                self.email
                    .send(&item.destination, REPLY_SUBJECT, body)
                    .await?
            }
            Channel::Sms => self.sms.send(&item.destination, body).await?,
        }

        let completed = match self
            .store
            .complete_approval(id, ApprovalStatus::Approved, edited)
            .await
        {
            Ok(item) => item,
            Err(e) => return Err(self.map_conflict(id, e, "approve").await),
        };

        self.store
            .append_message(Message {
                id: Uuid::new_v4(),
                conversation_id: completed.conversation_id,
                direction: Direction::Outbound,
                sender: completed.agent.to_string(),
                channel: completed.channel,
                content: completed.proposed_response.clone(),
                status: MessageStatus::Sent,
                context: None,
                created_at: Utc::now(),
            })
            .await?;
        self.store
            .record_message_activity(completed.conversation_id, Direction::Outbound, Utc::now())
            .await?;

        info!(approval_id = %id, conversation_id = %completed.conversation_id, "Approval sent");
        Ok(completed)
    }

    /// Reject a pending item. Nothing is sent.
    pub async fn reject(&self, id: Uuid) -> Result<ApprovalItem, Error> {
        let item = match self
            .store
            .complete_approval(id, ApprovalStatus::Rejected, None)
            .await
        {
            Ok(item) => item,
            Err(e) => return Err(self.map_conflict(id, e, "reject").await),
        };
        info!(approval_id = %id, "Approval rejected");
        Ok(item)
    }

    /// A `Conflict` from the store means the item already left the pending
    /// state; report which terminal state it is in.
    async fn map_conflict(&self, id: Uuid, err: StoreError, action: &str) -> Error {
        match err {
            StoreError::Conflict(_) => {
                let status = match self.store.get_approval(id).await {
                    Ok(Some(item)) => item.status.to_string(),
                    _ => "unknown".to_string(),
                };
                ApprovalError::InvalidTransition {
                    id,
                    status,
                    action: action.to_string(),
                }
                .into()
            }
            other => other.into(),
        }
    }
}
