//! Arena-State: persistence for the agent arena
//!
//! This crate is the engine's storage collaborator. It owns agent profiles,
//! the one-outcome-per-day ledger, the failure log and the content-addressed
//! interface code. The engine itself never caches agent state.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Data integrity and the "has run today" guarantee.
//!
//! ## Key Components
//!
//! - `AgentStore` / `InterfaceStore`: backend-agnostic async traits
//! - `fakes`: in-memory implementations with failure injection
//! - `SurrealArenaStore`: SurrealDB implementation (mem, surrealkv, cloud)

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::CloudConfig;
pub use storage_traits::{
    AgentId, AgentOutcome, AgentProfile, AgentStore, ArenaType, ContentDigest, FailureRecord,
    InterfaceRef, InterfaceStore, OutcomeStatus, StorageResult, Tier, TierScore,
};
pub use surreal_store::SurrealArenaStore;

/// Result type for arena-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
