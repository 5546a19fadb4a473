//! Escalation keyword rules.
//!
//! A deterministic, data-driven rule table — effectively policy, so the
//! keyword set is configurable rather than hard-coded into logic. Matching
//! is a lower-cased substring check, independent of model output.

use tracing::debug;

/// Why a keyword escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationCategory {
    /// Legal threats.
    Legal,
    /// Explicit requests for a human or manager.
    HumanRequest,
    /// Profanity-adjacent complaint terms.
    Complaint,
}

/// One escalation rule.
#[derive(Debug, Clone)]
pub struct EscalationKeyword {
    pub phrase: String,
    pub category: EscalationCategory,
}

/// The configured escalation rule table.
#[derive(Debug, Clone)]
pub struct EscalationRules {
    keywords: Vec<EscalationKeyword>,
}

impl Default for EscalationRules {
    fn default() -> Self {
        use EscalationCategory::*;
        let table: &[(&str, EscalationCategory)] = &[
            ("lawyer", Legal),
            ("attorney", Legal),
            ("legal action", Legal),
            ("sue", Legal),
            ("lawsuit", Legal),
            ("better business bureau", Legal),
            ("manager", HumanRequest),
            ("supervisor", HumanRequest),
            ("speak to a human", HumanRequest),
            ("talk to a human", HumanRequest),
            ("real person", HumanRequest),
            ("human being", HumanRequest),
            ("unacceptable", Complaint),
            ("ridiculous", Complaint),
            ("terrible service", Complaint),
            ("worst", Complaint),
            ("scam", Complaint),
            ("fraud", Complaint),
        ];
        Self {
            keywords: table
                .iter()
                .map(|(phrase, category)| EscalationKeyword {
                    phrase: (*phrase).to_string(),
                    category: *category,
                })
                .collect(),
        }
    }
}

impl EscalationRules {
    /// An empty rule table (for testing).
    pub fn empty() -> Self {
        Self { keywords: Vec::new() }
    }

    /// Add a phrase to the table.
    pub fn add(&mut self, phrase: &str, category: EscalationCategory) {
        self.keywords.push(EscalationKeyword {
            phrase: phrase.to_lowercase(),
            category,
        });
    }

    /// Check a message against the table. Returns the first matching rule.
    pub fn check(&self, message: &str) -> Option<&EscalationKeyword> {
        let lower = message.to_lowercase();
        let hit = self.keywords.iter().find(|k| lower.contains(&k.phrase));
        if let Some(keyword) = hit {
            debug!(phrase = %keyword.phrase, "Escalation keyword matched");
        }
        hit
    }

    pub fn should_escalate(&self, message: &str) -> bool {
        self.check(message).is_some()
    }
}
