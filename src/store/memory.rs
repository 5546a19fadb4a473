//! In-memory `Store` backend.
//!
//! Holds everything under a single `RwLock`, which makes the
//! find-or-create and compare-and-swap operations naturally atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AgentType, ApprovalItem, ApprovalStatus, Channel, Conversation, ConversationStatus, Direction,
    Lead, LeadIdentity, Message, SendAttempt, SequenceState, Subscriber,
};
use crate::store::traits::{LeadDefaults, Store};

#[derive(Default)]
struct Inner {
    leads: HashMap<Uuid, Lead>,
    /// identity key → lead id.
    lead_index: HashMap<String, Uuid>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
    approvals: HashMap<Uuid, ApprovalItem>,
    subscribers: HashMap<String, Subscriber>,
    send_attempts: Vec<SendAttempt>,
}

/// In-memory reference backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity: &str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_or_create_lead(
        &self,
        identity: &LeadIdentity,
        defaults: &LeadDefaults,
    ) -> Result<(Lead, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.lead_index.get(identity.key()) {
            let lead = inner
                .leads
                .get(id)
                .cloned()
                .ok_or_else(|| not_found("lead", id))?;
            return Ok((lead, false));
        }

        let lead = Lead {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            status: defaults.status,
            tags: defaults.tags.clone(),
            created_at: Utc::now(),
        };
        inner.lead_index.insert(identity.key().to_string(), lead.id);
        inner.leads.insert(lead.id, lead.clone());
        Ok((lead, true))
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.inner.read().await.leads.get(&id).cloned())
    }

    async fn find_or_create_active_conversation(
        &self,
        lead_id: Uuid,
        agent: AgentType,
        channel: Channel,
    ) -> Result<(Conversation, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .conversations
            .values()
            .find(|c| {
                c.lead_id == lead_id
                    && c.agent == agent
                    && c.status == ConversationStatus::Active
            })
            .cloned()
        {
            return Ok((existing, false));
        }

        let conversation = Conversation::new(lead_id, agent, channel);
        inner.conversations.insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn update_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or_else(|| not_found("conversation", id))?;
        conversation.status = status;
        Ok(())
    }

    async fn record_message_activity(
        &self,
        id: Uuid,
        direction: Direction,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or_else(|| not_found("conversation", id))?;
        match direction {
            Direction::Inbound => conversation.inbound_count += 1,
            Direction::Outbound => conversation.outbound_count += 1,
        }
        if conversation.first_message_at.is_none() {
            conversation.first_message_at = Some(at);
        }
        conversation.last_message_at = Some(at);
        Ok(())
    }

    async fn active_conversation_count(
        &self,
        lead_id: Uuid,
        agent: AgentType,
    ) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .conversations
            .values()
            .filter(|c| {
                c.lead_id == lead_id
                    && c.agent == agent
                    && c.status == ConversationStatus::Active
            })
            .count())
    }

    async fn append_message(&self, message: Message) -> Result<(), StoreError> {
        self.inner.write().await.messages.push(message);
        Ok(())
    }

    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_approval(&self, item: ApprovalItem) -> Result<(), StoreError> {
        self.inner.write().await.approvals.insert(item.id, item);
        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalItem>, StoreError> {
        Ok(self.inner.read().await.approvals.get(&id).cloned())
    }

    async fn pending_approvals(&self) -> Result<Vec<ApprovalItem>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<ApprovalItem> = inner
            .approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        items.sort_by_key(|a| a.created_at);
        Ok(items)
    }

    async fn edit_approval(&self, id: Uuid, text: &str) -> Result<ApprovalItem, StoreError> {
        let mut inner = self.inner.write().await;
        let item = inner
            .approvals
            .get_mut(&id)
            .ok_or_else(|| not_found("approval_item", id))?;
        if item.status != ApprovalStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "approval item {id} is {}, proposed response is frozen",
                item.status
            )));
        }
        item.proposed_response = text.to_string();
        Ok(item.clone())
    }

    async fn complete_approval(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        final_text: Option<&str>,
    ) -> Result<ApprovalItem, StoreError> {
        let mut inner = self.inner.write().await;
        let item = inner
            .approvals
            .get_mut(&id)
            .ok_or_else(|| not_found("approval_item", id))?;
        if item.status != ApprovalStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "approval item {id} is already {}",
                item.status
            )));
        }
        if let Some(text) = final_text {
            item.proposed_response = text.to_string();
        }
        item.status = status;
        item.resolved_at = Some(Utc::now());
        Ok(item.clone())
    }

    async fn upsert_subscriber(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        tags: &[String],
    ) -> Result<Subscriber, StoreError> {
        let mut inner = self.inner.write().await;
        let subscriber = inner
            .subscribers
            .entry(id.to_string())
            .or_insert_with(|| Subscriber {
                id: id.to_string(),
                email: email.to_string(),
                name: None,
                tags: Vec::new(),
                sequences: HashMap::new(),
            });
        subscriber.email = email.to_string();
        if let Some(name) = name {
            subscriber.name = Some(name.to_string());
        }
        for tag in tags {
            if !subscriber.tags.contains(tag) {
                subscriber.tags.push(tag.clone());
            }
        }
        Ok(subscriber.clone())
    }

    async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.inner.read().await.subscribers.get(id).cloned())
    }

    async fn subscribers_with_due_steps(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .subscribers
            .values()
            .filter(|s| {
                s.sequences
                    .values()
                    .any(|st| !st.completed && st.next_send_at <= now)
            })
            .cloned()
            .collect())
    }

    async fn set_sequence_state(
        &self,
        subscriber_id: &str,
        state: SequenceState,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let subscriber = inner
            .subscribers
            .get_mut(subscriber_id)
            .ok_or_else(|| not_found("subscriber", subscriber_id))?;
        subscriber.sequences.insert(state.sequence.clone(), state);
        Ok(())
    }

    async fn advance_sequence(
        &self,
        subscriber_id: &str,
        sequence: &str,
        expected_step: usize,
        new_state: SequenceState,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let subscriber = inner
            .subscribers
            .get_mut(subscriber_id)
            .ok_or_else(|| not_found("subscriber", subscriber_id))?;
        let Some(state) = subscriber.sequences.get_mut(sequence) else {
            return Err(not_found("sequence_state", sequence));
        };
        if state.current_step != expected_step || state.completed {
            return Ok(false);
        }
        *state = new_state;
        Ok(true)
    }

    async fn record_send_attempt(&self, attempt: SendAttempt) -> Result<(), StoreError> {
        self.inner.write().await.send_attempts.push(attempt);
        Ok(())
    }

    async fn send_attempts(&self, subscriber_id: &str) -> Result<Vec<SendAttempt>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .send_attempts
            .iter()
            .filter(|a| a.subscriber_id == subscriber_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStatus;

    #[tokio::test]
    async fn find_or_create_lead_is_idempotent_per_identity() {
        let store = MemoryStore::new();
        let identity = LeadIdentity::Email("alice@example.com".into());
        let defaults = LeadDefaults::default();

        let (first, created) = store.find_or_create_lead(&identity, &defaults).await.unwrap();
        assert!(created);
        assert_eq!(first.status, LeadStatus::New);

        let (second, created) = store.find_or_create_lead(&identity, &defaults).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn at_most_one_active_conversation_per_lead_agent() {
        let store = MemoryStore::new();
        let lead_id = Uuid::new_v4();

        let (first, created) = store
            .find_or_create_active_conversation(lead_id, AgentType::Support, Channel::Email)
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .find_or_create_active_conversation(lead_id, AgentType::Support, Channel::Email)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        assert_eq!(
            store
                .active_conversation_count(lead_id, AgentType::Support)
                .await
                .unwrap(),
            1
        );

        // A different agent gets its own conversation.
        let (sales, created) = store
            .find_or_create_active_conversation(lead_id, AgentType::Sales, Channel::Email)
            .await
            .unwrap();
        assert!(created);
        assert_ne!(sales.id, first.id);
    }

    #[tokio::test]
    async fn escalated_conversation_is_not_reused() {
        let store = MemoryStore::new();
        let lead_id = Uuid::new_v4();
        let (first, _) = store
            .find_or_create_active_conversation(lead_id, AgentType::Support, Channel::Sms)
            .await
            .unwrap();
        store
            .update_conversation_status(first.id, ConversationStatus::Escalated)
            .await
            .unwrap();

        let (second, created) = store
            .find_or_create_active_conversation(lead_id, AgentType::Support, Channel::Sms)
            .await
            .unwrap();
        assert!(created);
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn message_activity_updates_counters_and_timestamps() {
        let store = MemoryStore::new();
        let (conv, _) = store
            .find_or_create_active_conversation(Uuid::new_v4(), AgentType::Support, Channel::Email)
            .await
            .unwrap();

        let t1 = Utc::now();
        store
            .record_message_activity(conv.id, Direction::Inbound, t1)
            .await
            .unwrap();
        let t2 = t1 + chrono::Duration::seconds(5);
        store
            .record_message_activity(conv.id, Direction::Outbound, t2)
            .await
            .unwrap();

        let updated = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(updated.inbound_count, 1);
        assert_eq!(updated.outbound_count, 1);
        assert_eq!(updated.first_message_at, Some(t1));
        assert_eq!(updated.last_message_at, Some(t2));
    }

    #[tokio::test]
    async fn complete_approval_is_terminal() {
        let store = MemoryStore::new();
        let item = ApprovalItem {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            agent: AgentType::Support,
            channel: Channel::Email,
            original_message: "hi".into(),
            proposed_response: "hello".into(),
            reasoning: "".into(),
            docs_used: vec![],
            status: ApprovalStatus::Pending,
            destination: "a@b.com".into(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        store.insert_approval(item.clone()).await.unwrap();

        let approved = store
            .complete_approval(item.id, ApprovalStatus::Approved, Some("edited"))
            .await
            .unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.proposed_response, "edited");
        assert!(approved.resolved_at.is_some());

        let err = store
            .complete_approval(item.id, ApprovalStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store.edit_approval(item.id, "too late").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn upsert_subscriber_merges_tags_and_keeps_sequences() {
        let store = MemoryStore::new();
        store
            .upsert_subscriber("a@b.com", "a@b.com", Some("Ann"), &["newsletter".into()])
            .await
            .unwrap();
        store
            .set_sequence_state(
                "a@b.com",
                SequenceState {
                    sequence: "welcome".into(),
                    current_step: 0,
                    started_at: Utc::now(),
                    next_send_at: Utc::now(),
                    completed: false,
                },
            )
            .await
            .unwrap();

        let updated = store
            .upsert_subscriber("a@b.com", "a@b.com", None, &["newsletter".into(), "booking".into()])
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["newsletter".to_string(), "booking".to_string()]);
        assert_eq!(updated.name.as_deref(), Some("Ann"));
        assert!(updated.sequences.contains_key("welcome"));
    }

    #[tokio::test]
    async fn advance_sequence_is_conditional() {
        let store = MemoryStore::new();
        store
            .upsert_subscriber("a@b.com", "a@b.com", None, &[])
            .await
            .unwrap();
        let started = Utc::now();
        store
            .set_sequence_state(
                "a@b.com",
                SequenceState {
                    sequence: "welcome".into(),
                    current_step: 0,
                    started_at: started,
                    next_send_at: started,
                    completed: false,
                },
            )
            .await
            .unwrap();

        let advanced = store
            .advance_sequence(
                "a@b.com",
                "welcome",
                0,
                SequenceState {
                    sequence: "welcome".into(),
                    current_step: 1,
                    started_at: started,
                    next_send_at: started + chrono::Duration::days(2),
                    completed: false,
                },
            )
            .await
            .unwrap();
        assert!(advanced);

        // A stale tick that still expects step 0 loses the race.
        let advanced = store
            .advance_sequence(
                "a@b.com",
                "welcome",
                0,
                SequenceState {
                    sequence: "welcome".into(),
                    current_step: 1,
                    started_at: started,
                    next_send_at: started,
                    completed: false,
                },
            )
            .await
            .unwrap();
        assert!(!advanced);
    }
}
