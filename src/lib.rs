//! Inbox Pilot — conversation intelligence pipeline.
//!
//! Inbound email/SMS traffic is resolved to leads, answered with
//! retrieval-augmented generation, and routed through a delivery policy
//! (escalate, auto-send, or queue for approval). A drip scheduler runs
//! timed follow-up sequences alongside.

pub mod approval;
pub mod channels;
pub mod config;
pub mod delivery;
pub mod drip;
pub mod error;
pub mod identity;
pub mod index;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod responder;
pub mod server;
pub mod store;
