//! Persistence layer — the `Store` trait and the in-memory reference backend.
//!
//! The durable document store is an external collaborator; components only
//! ever see the trait. `MemoryStore` backs tests and local runs.

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{LeadDefaults, Store};
