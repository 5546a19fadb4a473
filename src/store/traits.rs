//! Backend-agnostic `Store` trait covering leads, conversations, messages,
//! approval items, and drip subscribers.
//!
//! Operations that close known race windows are expressed as single trait
//! methods so backends can make them atomic: `find_or_create_lead` and
//! `find_or_create_active_conversation` replace query-then-create, and
//! `advance_sequence` is a compare-and-swap on the step index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ApprovalItem, ApprovalStatus, Conversation, ConversationStatus, Direction, Lead, LeadIdentity,
    LeadStatus, Message, SendAttempt, SequenceState, Subscriber,
};

/// Defaults applied when first contact creates a lead.
#[derive(Debug, Clone)]
pub struct LeadDefaults {
    pub status: LeadStatus,
    pub tags: Vec<String>,
}

impl Default for LeadDefaults {
    fn default() -> Self {
        Self {
            status: LeadStatus::New,
            tags: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Leads ───────────────────────────────────────────────────────

    /// Find a lead by its normalized identity key, creating it with the
    /// given defaults if absent. Returns the lead and whether it was created.
    async fn find_or_create_lead(
        &self,
        identity: &LeadIdentity,
        defaults: &LeadDefaults,
    ) -> Result<(Lead, bool), StoreError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Find the active conversation for (lead, agent), creating a fresh one
    /// if none exists. At most one active conversation per pair.
    async fn find_or_create_active_conversation(
        &self,
        lead_id: Uuid,
        agent: crate::models::AgentType,
        channel: crate::models::Channel,
    ) -> Result<(Conversation, bool), StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    async fn update_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<(), StoreError>;

    /// Bump message counters and first/last timestamps for a conversation.
    async fn record_message_activity(
        &self,
        id: Uuid,
        direction: Direction,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Count conversations with `status = Active` for a (lead, agent) pair.
    async fn active_conversation_count(
        &self,
        lead_id: Uuid,
        agent: crate::models::AgentType,
    ) -> Result<usize, StoreError>;

    // ── Messages (append-only) ──────────────────────────────────────

    async fn append_message(&self, message: Message) -> Result<(), StoreError>;

    /// All messages for a conversation, ordered by timestamp ascending.
    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, StoreError>;

    // ── Approval items ──────────────────────────────────────────────

    async fn insert_approval(&self, item: ApprovalItem) -> Result<(), StoreError>;

    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalItem>, StoreError>;

    async fn pending_approvals(&self) -> Result<Vec<ApprovalItem>, StoreError>;

    /// Replace the proposed response. Fails with `Conflict` unless the item
    /// is still pending.
    async fn edit_approval(&self, id: Uuid, text: &str) -> Result<ApprovalItem, StoreError>;

    /// Transition a pending item to a terminal status, optionally replacing
    /// the proposed response in the same write. Fails with `Conflict` if the
    /// item is already terminal — at most one terminal transition succeeds.
    async fn complete_approval(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        final_text: Option<&str>,
    ) -> Result<ApprovalItem, StoreError>;

    // ── Subscribers ─────────────────────────────────────────────────

    /// Idempotently create or update a subscriber record. Tags are merged;
    /// existing sequence states are preserved.
    async fn upsert_subscriber(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        tags: &[String],
    ) -> Result<Subscriber, StoreError>;

    async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>, StoreError>;

    /// Subscribers with at least one non-completed sequence state whose
    /// `next_send_at <= now`.
    async fn subscribers_with_due_steps(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscriber>, StoreError>;

    /// Set (or overwrite) a sequence state — used at enrollment.
    async fn set_sequence_state(
        &self,
        subscriber_id: &str,
        state: SequenceState,
    ) -> Result<(), StoreError>;

    /// Conditionally replace a sequence state: the write only applies if the
    /// stored `current_step` still equals `expected_step`. Returns `false`
    /// when the condition fails (another tick advanced first).
    async fn advance_sequence(
        &self,
        subscriber_id: &str,
        sequence: &str,
        expected_step: usize,
        new_state: SequenceState,
    ) -> Result<bool, StoreError>;

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_send_attempt(&self, attempt: SendAttempt) -> Result<(), StoreError>;

    async fn send_attempts(&self, subscriber_id: &str) -> Result<Vec<SendAttempt>, StoreError>;
}
