//! PoliKG Common Library
//!
//! Shared code for the PoliKG reasoning services including:
//! - Graph schema vocabulary and query escaping
//! - Graph store client abstraction
//! - Multi-hop reasoning engine
//! - LLM collaborators
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod reasoning;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use reasoning::{Classifier, Pattern, Reasoner, StepType, TurnOutcome};
pub use schema::{EdgeType, Entity, EntityType};
pub use store::{GraphStore, Neo4jStore, Row};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
