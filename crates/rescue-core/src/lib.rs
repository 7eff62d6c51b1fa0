//! rescue-core library.
//!
//! Sighting deduplication and case aggregation for animal rescue: decide
//! whether a new report belongs to an existing nearby case, and merge
//! independent contributions into one case record.
//!
//! # Conventions
//!
//! - **Errors**: engine operations return [`error::EngineError`], which carries
//!   a stable [`error::ErrorCode`]; setup paths use `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod access;
pub mod aggregate;
pub mod blob;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod lock;
pub mod matcher;
pub mod model;
pub mod store;

pub use access::{Action, Caller, Role};
pub use aggregate::Contribution;
pub use engine::Engine;
pub use error::{EngineError, ErrorCode};
pub use matcher::Candidate;
