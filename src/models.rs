//! Core data model — leads, conversations, messages, knowledge documents,
//! approval items, and drip subscribers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Agent persona ───────────────────────────────────────────────────

/// Which response persona handles a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Support-oriented persona.
    Support,
    /// Sales-oriented persona.
    Sales,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Sales => "sales",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "support" => Ok(Self::Support),
            "sales" => Ok(Self::Sales),
            _ => Err(format!("Unknown agent type: {s}")),
        }
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Outbound/inbound message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Sms => f.write_str("sms"),
        }
    }
}

// ── Language ────────────────────────────────────────────────────────

/// Detected language of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Es,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::En => f.write_str("en"),
            Self::Es => f.write_str("es"),
        }
    }
}

/// Language scope of a knowledge document or chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageScope {
    En,
    Es,
    Both,
}

impl LanguageScope {
    /// Whether a chunk with this scope serves a message in `lang`.
    pub fn matches(&self, lang: Language) -> bool {
        match self {
            Self::Both => true,
            Self::En => lang == Language::En,
            Self::Es => lang == Language::Es,
        }
    }
}

/// Audience scope of a knowledge document or chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Support,
    Sales,
    Both,
}

impl Audience {
    /// Whether a chunk with this audience serves `agent`.
    pub fn matches(&self, agent: AgentType) -> bool {
        match self {
            Self::Both => true,
            Self::Support => agent == AgentType::Support,
            Self::Sales => agent == AgentType::Sales,
        }
    }
}

// ── Knowledge ───────────────────────────────────────────────────────

/// A source document in the organizational knowledge base.
///
/// Owned by the knowledge-management collaborator; the indexer only reads
/// it and writes derived chunks into the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub category: String,
    pub language: LanguageScope,
    pub audience: Audience,
    pub content: String,
    pub active: bool,
}

/// Metadata copied onto every derived chunk.
///
/// Chunks are replaced wholesale when the parent document changes, so this
/// always reflects the parent's current audience/language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub language: LanguageScope,
    pub audience: Audience,
}

// ── Lead ────────────────────────────────────────────────────────────

/// The single canonical identity key of a lead.
///
/// Exactly one of email or phone is canonical per record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadIdentity {
    Email(String),
    Phone(String),
}

impl LeadIdentity {
    /// The normalized identifier string used as the dedup key.
    pub fn key(&self) -> &str {
        match self {
            Self::Email(s) | Self::Phone(s) => s,
        }
    }
}

impl std::fmt::Display for LeadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Customer,
    Closed,
}

/// A prospective or existing customer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub identity: LeadIdentity,
    pub status: LeadStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ── Conversation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Escalated,
    Resolved,
    Converted,
}

/// A bounded thread of messages between a lead and one agent persona.
///
/// Invariant: at most one conversation with `status = Active` exists per
/// (lead, agent) pair. The store enforces this via an atomic find-or-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub agent: AgentType,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub inbound_count: u32,
    pub outbound_count: u32,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// A fresh active conversation with zeroed counters.
    pub fn new(lead_id: Uuid, agent: AgentType, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            agent,
            channel,
            status: ConversationStatus::Active,
            inbound_count: 0,
            outbound_count: 0,
            first_message_at: None,
            last_message_at: None,
        }
    }
}

// ── Message ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Sent,
    PendingApproval,
    InternalNote,
}

/// Two-level retrieval confidence signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

/// Context attached to a generated outbound message for operator review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseContext {
    pub docs_used: Vec<String>,
    pub confidence: Confidence,
    pub reasoning: String,
}

/// One entry in the append-only conversation log.
///
/// Never mutated after creation; ordering is by `created_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub sender: String,
    pub channel: Channel,
    pub content: String,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ResponseContext>,
    pub created_at: DateTime<Utc>,
}

// ── Approval ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// A queued outbound message awaiting human review.
///
/// Exactly one terminal transition (approved xor rejected) is permitted;
/// `proposed_response` is mutable only while pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub agent: AgentType,
    pub channel: Channel,
    pub original_message: String,
    pub proposed_response: String,
    pub reasoning: String,
    pub docs_used: Vec<String>,
    pub status: ApprovalStatus,
    /// Destination identifier (email address or phone number).
    pub destination: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// ── Drip subscribers ────────────────────────────────────────────────

/// Per-sequence progress for a subscriber.
///
/// Invariants: `current_step` never decreases; `next_send_at` is always
/// `started_at + steps[current_step].day_offset`; `completed = true` is
/// terminal and excludes the state from scheduler consideration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceState {
    pub sequence: String,
    pub current_step: usize,
    pub started_at: DateTime<Utc>,
    pub next_send_at: DateTime<Utc>,
    pub completed: bool,
}

/// A drip-campaign subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Canonical identifier (normalized email).
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub tags: Vec<String>,
    /// Sequence name → enrollment state.
    pub sequences: HashMap<String, SequenceState>,
}

/// One audited drip send attempt, recorded for success and failure alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAttempt {
    pub id: Uuid,
    pub subscriber_id: String,
    pub sequence: String,
    pub step: usize,
    pub template_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_matching() {
        assert!(Audience::Both.matches(AgentType::Support));
        assert!(Audience::Both.matches(AgentType::Sales));
        assert!(Audience::Support.matches(AgentType::Support));
        assert!(!Audience::Support.matches(AgentType::Sales));
        assert!(!Audience::Sales.matches(AgentType::Support));
    }

    #[test]
    fn language_scope_matching() {
        assert!(LanguageScope::Both.matches(Language::En));
        assert!(LanguageScope::Both.matches(Language::Es));
        assert!(LanguageScope::Es.matches(Language::Es));
        assert!(!LanguageScope::Es.matches(Language::En));
    }

    #[test]
    fn agent_type_round_trip() {
        for agent in [AgentType::Support, AgentType::Sales] {
            let s = agent.to_string();
            assert_eq!(s.parse::<AgentType>().unwrap(), agent);
        }
    }

    #[test]
    fn new_conversation_is_active_with_zeroed_counters() {
        let conv = Conversation::new(Uuid::new_v4(), AgentType::Support, Channel::Email);
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.inbound_count, 0);
        assert_eq!(conv.outbound_count, 0);
        assert!(conv.first_message_at.is_none());
    }

    #[test]
    fn lead_identity_key() {
        let email = LeadIdentity::Email("a@b.com".into());
        assert_eq!(email.key(), "a@b.com");
        let phone = LeadIdentity::Phone("+15551234567".into());
        assert_eq!(phone.key(), "+15551234567");
    }

    #[test]
    fn serde_snake_case_enums() {
        let json = serde_json::to_value(MessageStatus::PendingApproval).unwrap();
        assert_eq!(json, "pending_approval");
        let json = serde_json::to_value(ConversationStatus::Escalated).unwrap();
        assert_eq!(json, "escalated");
    }
}
