//! Identity resolution — maps raw sender identifiers to durable leads and
//! active conversations.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, PipelineError};
use crate::models::{AgentType, Channel, Conversation, Lead, LeadIdentity};
use crate::store::{LeadDefaults, Store};

/// Normalize a raw sender identifier for a channel.
///
/// Email addresses are trimmed and lower-cased. Phone numbers are
/// canonicalized to a single `+`-prefixed international form: separators are
/// stripped, a `00` prefix becomes `+`, and bare 10-digit national numbers
/// are assumed NANP and get `+1`.
pub fn normalize_identifier(raw: &str, channel: Channel) -> Result<LeadIdentity, PipelineError> {
    match channel {
        Channel::Email => {
            let email = raw.trim().to_lowercase();
            if email.is_empty() || !email.contains('@') {
                return Err(PipelineError::InvalidIdentifier(raw.to_string()));
            }
            Ok(LeadIdentity::Email(email))
        }
        Channel::Sms => {
            let phone = canonicalize_phone(raw)
                .ok_or_else(|| PipelineError::InvalidIdentifier(raw.to_string()))?;
            Ok(LeadIdentity::Phone(phone))
        }
    }
}

fn canonicalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let digits = if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else {
        digits
    };

    let canonical = match digits.len() {
        0..=6 => return None,
        10 => format!("+1{digits}"),
        _ => format!("+{digits}"),
    };
    Some(canonical)
}

/// Resolves leads and conversations via the store's atomic find-or-create
/// operations, closing the query-then-create race window.
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve a raw identifier to a lead, creating one with the given
    /// defaults on first contact.
    pub async fn resolve_lead(
        &self,
        raw_identifier: &str,
        channel: Channel,
        defaults: &LeadDefaults,
    ) -> Result<Lead, Error> {
        let identity = normalize_identifier(raw_identifier, channel)?;
        let (lead, created) = self.store.find_or_create_lead(&identity, defaults).await?;
        if created {
            info!(lead_id = %lead.id, identity = %identity, "Created lead on first contact");
        } else {
            debug!(lead_id = %lead.id, identity = %identity, "Resolved existing lead");
        }
        Ok(lead)
    }

    /// Resolve the active conversation for (lead, agent), creating a fresh
    /// one with zeroed counters if none is active.
    pub async fn resolve_conversation(
        &self,
        lead_id: Uuid,
        agent: AgentType,
        channel: Channel,
    ) -> Result<Conversation, Error> {
        let (conversation, created) = self
            .store
            .find_or_create_active_conversation(lead_id, agent, channel)
            .await?;
        if created {
            info!(
                conversation_id = %conversation.id,
                lead_id = %lead_id,
                agent = %agent,
                "Opened new conversation"
            );
        }
        Ok(conversation)
    }
}
