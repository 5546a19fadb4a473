//! Drip campaigns: sequence definitions and the tick-driven scheduler.

mod scheduler;
mod sequences;

pub use scheduler::{DripScheduler, TickSummary};
pub use sequences::{MessageTemplate, Sequence, SequenceLibrary, SequenceStep};
