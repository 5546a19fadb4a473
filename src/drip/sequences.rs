//! Sequence and template definitions for the drip scheduler.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// One step of a drip sequence: a template sent `day_offset` days after
/// enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub day_offset: u32,
    pub template_id: String,
}

/// An ordered drip sequence. Step offsets must be non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<SequenceStep>,
}

impl Sequence {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.steps.is_empty() {
            return Err(SchedulerError::InvalidSequence(format!(
                "sequence {} has no steps",
                self.name
            )));
        }
        for pair in self.steps.windows(2) {
            if pair[1].day_offset < pair[0].day_offset {
                return Err(SchedulerError::InvalidSequence(format!(
                    "sequence {} steps are not in non-decreasing day order",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// An outbound message template. `{{name}}` in the subject or body is
/// replaced with the subscriber's name, falling back to "there".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: String,
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn render(&self, name: Option<&str>) -> (String, String) {
        let name = name.unwrap_or("there");
        (
            self.subject.replace("{{name}}", name),
            self.body.replace("{{name}}", name),
        )
    }
}

/// In-memory registry of sequences and templates.
#[derive(Debug, Default)]
pub struct SequenceLibrary {
    sequences: HashMap<String, Sequence>,
    templates: HashMap<String, MessageTemplate>,
}

impl SequenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library preloaded with the standard welcome sequence.
    pub fn with_defaults() -> Self {
        let mut lib = Self::new();
        lib.add_template(MessageTemplate {
            id: "welcome".into(),
            subject: "Welcome aboard, {{name}}!".into(),
            body: "Hi {{name}},\n\nThanks for signing up. Reply to this email any time \
                   and a member of our team will get back to you."
                .into(),
        });
        lib.add_template(MessageTemplate {
            id: "getting-started".into(),
            subject: "Getting the most out of your account".into(),
            body: "Hi {{name}},\n\nHere are three things most people set up in their \
                   first week. Stuck on any of them? Just reply."
                .into(),
        });
        lib.add_template(MessageTemplate {
            id: "check-in".into(),
            subject: "How is it going, {{name}}?".into(),
            body: "Hi {{name}},\n\nYou have been with us a week now. Anything we can \
                   help with?"
                .into(),
        });
        lib.add_sequence(Sequence {
            name: "welcome".into(),
            steps: vec![
                SequenceStep {
                    day_offset: 0,
                    template_id: "welcome".into(),
                },
                SequenceStep {
                    day_offset: 2,
                    template_id: "getting-started".into(),
                },
                SequenceStep {
                    day_offset: 7,
                    template_id: "check-in".into(),
                },
            ],
        })
        .expect("default sequence is valid");
        lib
    }

    pub fn add_sequence(&mut self, sequence: Sequence) -> Result<(), SchedulerError> {
        sequence.validate()?;
        for step in &sequence.steps {
            if !self.templates.contains_key(&step.template_id) {
                return Err(SchedulerError::UnknownTemplate(step.template_id.clone()));
            }
        }
        self.sequences.insert(sequence.name.clone(), sequence);
        Ok(())
    }

    pub fn add_template(&mut self, template: MessageTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn sequence(&self, name: &str) -> Result<&Sequence, SchedulerError> {
        self.sequences
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownSequence(name.to_string()))
    }

    pub fn template(&self, id: &str) -> Result<&MessageTemplate, SchedulerError> {
        self.templates
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTemplate(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_decreasing_offsets() {
        let seq = Sequence {
            name: "bad".into(),
            steps: vec![
                SequenceStep {
                    day_offset: 3,
                    template_id: "a".into(),
                },
                SequenceStep {
                    day_offset: 1,
                    template_id: "b".into(),
                },
            ],
        };
        assert!(matches!(
            seq.validate(),
            Err(SchedulerError::InvalidSequence(_))
        ));
    }

    #[test]
    fn equal_offsets_are_allowed() {
        let seq = Sequence {
            name: "same-day".into(),
            steps: vec![
                SequenceStep {
                    day_offset: 0,
                    template_id: "a".into(),
                },
                SequenceStep {
                    day_offset: 0,
                    template_id: "b".into(),
                },
            ],
        };
        assert!(seq.validate().is_ok());
    }

    #[test]
    fn empty_sequence_is_invalid() {
        let seq = Sequence {
            name: "empty".into(),
            steps: vec![],
        };
        assert!(seq.validate().is_err());
    }

    #[test]
    fn library_rejects_sequence_with_unknown_template() {
        let mut lib = SequenceLibrary::new();
        let err = lib
            .add_sequence(Sequence {
                name: "orphan".into(),
                steps: vec![SequenceStep {
                    day_offset: 0,
                    template_id: "missing".into(),
                }],
            })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTemplate(_)));
    }

    #[test]
    fn template_substitutes_name_with_fallback() {
        let tpl = MessageTemplate {
            id: "t".into(),
            subject: "Hello {{name}}".into(),
            body: "Hi {{name}}!".into(),
        };
        assert_eq!(tpl.render(Some("Ada")).0, "Hello Ada");
        assert_eq!(tpl.render(None).1, "Hi there!");
    }

    #[test]
    fn default_library_resolves_welcome_sequence() {
        let lib = SequenceLibrary::with_defaults();
        let seq = lib.sequence("welcome").unwrap();
        assert_eq!(seq.steps.len(), 3);
        assert_eq!(seq.steps[0].day_offset, 0);
        for step in &seq.steps {
            lib.template(&step.template_id).unwrap();
        }
    }
}
