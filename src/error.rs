//! Error types for Inbox Pilot.

use uuid::Uuid;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Document-store errors.
///
/// The store is a pluggable collaborator behind the `store::Store` trait;
/// backends map their native failures into these variants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Completion/embedding service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Service {service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Vector-index errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Upsert failed: {0}")]
    Upsert(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Outbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("Channel {channel} is not configured")]
    NotConfigured { channel: String },
}

/// Inbound-pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid sender identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Response generation failed: {0}")]
    Generation(String),
}

/// Approval-workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Approval item {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: Uuid,
        status: String,
        action: String,
    },
}

/// Drip-scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Subscriber {subscriber} is already enrolled in sequence {sequence}")]
    AlreadyEnrolled {
        subscriber: String,
        sequence: String,
    },

    #[error("Invalid sequence definition: {0}")]
    InvalidSequence(String),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
