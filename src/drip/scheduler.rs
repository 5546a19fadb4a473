//! Drip scheduler: enrolls subscribers into sequences and drives due steps
//! on each tick.
//!
//! A step only advances after its template is delivered; a failed send
//! leaves the state untouched so the next tick retries it. Every attempt,
//! success or failure, lands in the audit log.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::EmailTransport;
use crate::config::DripConfig;
use crate::error::{Error, SchedulerError, StoreError};
use crate::models::{SendAttempt, SequenceState, Subscriber};
use crate::store::Store;

use super::sequences::{Sequence, SequenceLibrary};

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Steps that were due this tick.
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    /// Sequences that reached their final step this tick.
    pub completed: usize,
    /// Sequences abandoned because a step hit the retry cap.
    pub abandoned: usize,
}

pub struct DripScheduler {
    store: Arc<dyn Store>,
    email: Arc<dyn EmailTransport>,
    library: SequenceLibrary,
    config: DripConfig,
}

impl DripScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailTransport>,
        library: SequenceLibrary,
        config: DripConfig,
    ) -> Self {
        Self {
            store,
            email,
            library,
            config,
        }
    }

    /// Create or update a subscriber record. The email doubles as the
    /// canonical identifier after normalization.
    pub async fn upsert_subscriber(
        &self,
        email: &str,
        name: Option<&str>,
        tags: &[String],
    ) -> Result<Subscriber, Error> {
        let id = email.trim().to_lowercase();
        let subscriber = self.store.upsert_subscriber(&id, &id, name, tags).await?;
        Ok(subscriber)
    }

    /// Start a named sequence for an existing subscriber. The subscriber
    /// must already exist; re-enrollment into a sequence it already carries
    /// is refused.
    pub async fn start_sequence(
        &self,
        subscriber_id: &str,
        sequence_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, Error> {
        let sequence = self.library.sequence(sequence_name)?;
        let id = subscriber_id.trim().to_lowercase();

        let subscriber = self
            .store
            .get_subscriber(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "subscriber".into(),
                id: id.clone(),
            })?;
        if subscriber.sequences.contains_key(sequence_name) {
            return Err(SchedulerError::AlreadyEnrolled {
                subscriber: id,
                sequence: sequence_name.to_string(),
            }
            .into());
        }

        let state = SequenceState {
            sequence: sequence_name.to_string(),
            current_step: 0,
            started_at: now,
            next_send_at: now + Duration::days(i64::from(sequence.steps[0].day_offset)),
            completed: false,
        };
        self.store.set_sequence_state(&id, state).await?;

        info!(subscriber = %id, sequence = %sequence_name, "Sequence started");
        self.store
            .get_subscriber(&id)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound {
                    entity: "subscriber".into(),
                    id,
                }
                .into()
            })
    }

    /// Process every due step across all subscribers.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, Error> {
        let mut summary = TickSummary::default();

        for subscriber in self.store.subscribers_with_due_steps(now).await? {
            let due: Vec<SequenceState> = subscriber
                .sequences
                .values()
                .filter(|s| !s.completed && s.next_send_at <= now)
                .cloned()
                .collect();
            for state in due {
                summary.due += 1;
                self.process_step(&subscriber, &state, now, &mut summary)
                    .await?;
            }
        }

        if summary.due > 0 {
            info!(
                due = summary.due,
                sent = summary.sent,
                failed = summary.failed,
                completed = summary.completed,
                "Drip tick finished"
            );
        }
        Ok(summary)
    }

    async fn process_step(
        &self,
        subscriber: &Subscriber,
        state: &SequenceState,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> Result<(), Error> {
        let sequence = match self.library.sequence(&state.sequence) {
            Ok(s) => s,
            Err(e) => {
                // Definition removed after enrollment; abandon rather than
                // fail the whole tick.
                warn!(subscriber = %subscriber.id, sequence = %state.sequence, error = %e,
                    "Sequence no longer defined, abandoning");
                self.abandon(subscriber, state, now).await?;
                summary.abandoned += 1;
                return Ok(());
            }
        };
        let Some(step) = sequence.steps.get(state.current_step) else {
            self.abandon(subscriber, state, now).await?;
            summary.abandoned += 1;
            return Ok(());
        };

        if let Some(cap) = self.config.max_attempts {
            let failures = self
                .store
                .send_attempts(&subscriber.id)
                .await?
                .iter()
                .filter(|a| a.sequence == state.sequence && a.step == state.current_step && !a.success)
                .count();
            if failures >= cap as usize {
                warn!(
                    subscriber = %subscriber.id,
                    sequence = %state.sequence,
                    step = state.current_step,
                    failures,
                    "Retry cap reached, abandoning sequence"
                );
                self.abandon(subscriber, state, now).await?;
                summary.abandoned += 1;
                return Ok(());
            }
        }

        let template = self.library.template(&step.template_id)?;
        let (subject, body) = template.render(subscriber.name.as_deref());
        let send_result = self.email.send(&subscriber.email, &subject, &body).await;
        let success = send_result.is_ok();

        self.store
            .record_send_attempt(SendAttempt {
                id: Uuid::new_v4(),
                subscriber_id: subscriber.id.clone(),
                sequence: state.sequence.clone(),
                step: state.current_step,
                template_id: step.template_id.clone(),
                success,
                detail: send_result.as_ref().err().map(|e| e.to_string()),
                at: now,
            })
            .await?;

        match send_result {
            Ok(()) => {
                summary.sent += 1;
                let next = Self::next_state(sequence, state);
                let advanced = self
                    .store
                    .advance_sequence(&subscriber.id, &state.sequence, state.current_step, next.clone())
                    .await?;
                if !advanced {
                    // Another tick got there first; the send was duplicated
                    // but the state stays consistent.
                    warn!(
                        subscriber = %subscriber.id,
                        sequence = %state.sequence,
                        step = state.current_step,
                        "Concurrent advancement detected"
                    );
                } else if next.completed {
                    summary.completed += 1;
                    info!(subscriber = %subscriber.id, sequence = %state.sequence, "Sequence completed");
                }
            }
            Err(e) => {
                summary.failed += 1;
                // State untouched: the same step is retried next tick.
                warn!(
                    subscriber = %subscriber.id,
                    sequence = %state.sequence,
                    step = state.current_step,
                    error = %e,
                    "Drip send failed"
                );
            }
        }
        Ok(())
    }

    /// The state after the current step delivers: either the next step's
    /// schedule or a terminal completed state.
    fn next_state(sequence: &Sequence, state: &SequenceState) -> SequenceState {
        let next_step = state.current_step + 1;
        match sequence.steps.get(next_step) {
            Some(step) => SequenceState {
                sequence: state.sequence.clone(),
                current_step: next_step,
                started_at: state.started_at,
                next_send_at: state.started_at + Duration::days(i64::from(step.day_offset)),
                completed: false,
            },
            None => SequenceState {
                sequence: state.sequence.clone(),
                current_step: next_step,
                started_at: state.started_at,
                next_send_at: state.next_send_at,
                completed: true,
            },
        }
    }

    async fn abandon(
        &self,
        subscriber: &Subscriber,
        state: &SequenceState,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.store
            .set_sequence_state(
                &subscriber.id,
                SequenceState {
                    sequence: state.sequence.clone(),
                    current_step: state.current_step,
                    started_at: state.started_at,
                    next_send_at: now,
                    completed: true,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::test_support::RecordingTransport;
    use crate::store::MemoryStore;

    fn scheduler(
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        max_attempts: Option<u32>,
    ) -> DripScheduler {
        DripScheduler::new(
            store,
            transport,
            SequenceLibrary::with_defaults(),
            DripConfig {
                max_attempts,
                ..DripConfig::default()
            },
        )
    }

    async fn enroll(sched: &DripScheduler, email: &str, name: Option<&str>, now: DateTime<Utc>) {
        sched.upsert_subscriber(email, name, &[]).await.unwrap();
        sched.start_sequence(email, "welcome", now).await.unwrap();
    }

    #[tokio::test]
    async fn starting_a_sequence_schedules_step_zero_immediately() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport, None);
        let now = Utc::now();

        sched
            .upsert_subscriber("Ada@Example.com", Some("Ada"), &["trial".into()])
            .await
            .unwrap();
        let sub = sched
            .start_sequence("Ada@Example.com", "welcome", now)
            .await
            .unwrap();
        assert_eq!(sub.id, "ada@example.com");
        let state = &sub.sequences["welcome"];
        assert_eq!(state.current_step, 0);
        assert_eq!(state.next_send_at, now);
    }

    #[tokio::test]
    async fn starting_for_unknown_subscriber_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport, None);

        let err = sched
            .start_sequence("nobody@b.com", "welcome", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn re_enrollment_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport, None);
        let now = Utc::now();

        enroll(&sched, "a@b.com", None, now).await;
        let err = sched.start_sequence("a@b.com", "welcome", now).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Scheduler(SchedulerError::AlreadyEnrolled { .. })
        ));
    }

    #[tokio::test]
    async fn tick_sends_due_step_and_advances() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport.clone(), None);
        let now = Utc::now();
        enroll(&sched, "a@b.com", Some("Ada"), now).await;

        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Ada"));

        let sub = store.get_subscriber("a@b.com").await.unwrap().unwrap();
        let state = &sub.sequences["welcome"];
        assert_eq!(state.current_step, 1);
        assert_eq!(state.next_send_at, now + Duration::days(2));
        assert!(!state.completed);

        // Step 1 is two days out; an immediate second tick does nothing.
        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn failed_send_does_not_advance_and_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport.clone(), None);
        let now = Utc::now();
        enroll(&sched, "a@b.com", None, now).await;

        transport.set_failing(true);
        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 0);

        let sub = store.get_subscriber("a@b.com").await.unwrap().unwrap();
        assert_eq!(sub.sequences["welcome"].current_step, 0);

        // Both the failure and the retry's success are audited.
        transport.set_failing(false);
        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.sent, 1);

        let attempts = store.send_attempts("a@b.com").await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].success);
        assert!(attempts[1].success);
        assert_eq!(attempts[0].step, 0);
        assert_eq!(attempts[1].step, 0);
    }

    #[tokio::test]
    async fn retry_cap_abandons_after_configured_failures() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport.clone(), Some(2));
        let now = Utc::now();
        enroll(&sched, "a@b.com", None, now).await;

        transport.set_failing(true);
        sched.tick(now).await.unwrap();
        sched.tick(now).await.unwrap();
        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.abandoned, 1);

        let sub = store.get_subscriber("a@b.com").await.unwrap().unwrap();
        assert!(sub.sequences["welcome"].completed);

        // No further sends once abandoned.
        transport.set_failing(false);
        let summary = sched.tick(now).await.unwrap();
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn full_sequence_runs_to_completion_on_schedule() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let sched = scheduler(store.clone(), transport.clone(), None);
        let start = Utc::now();
        enroll(&sched, "a@b.com", None, start).await;

        sched.tick(start).await.unwrap();
        // Day 1: step 1 not yet due.
        assert_eq!(sched.tick(start + Duration::days(1)).await.unwrap().due, 0);
        // Day 2: getting-started.
        assert_eq!(sched.tick(start + Duration::days(2)).await.unwrap().sent, 1);
        // Day 7: check-in completes the sequence.
        let summary = sched.tick(start + Duration::days(7)).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(transport.sent_count(), 3);

        let sub = store.get_subscriber("a@b.com").await.unwrap().unwrap();
        assert!(sub.sequences["welcome"].completed);
    }
}
