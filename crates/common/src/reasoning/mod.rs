//! Multi-hop reasoning over the politician knowledge graph
//!
//! This module provides:
//! - Pattern classification of questions
//! - Cypher synthesis per plan step
//! - Hop iteration with result absorption
//! - Stop decision, hop summary and report collaborators

pub mod classifier;
pub mod collaborators;
pub mod cypher;
pub mod engine;
pub mod state;

pub use classifier::{Classification, Classifier, ClassifierConfig, Pattern, StepType};
pub use collaborators::{
    ConservativeStopDecider, HeuristicSummarizer, HopSummarizer, ReportComposer, StepListComposer,
    StopDecider, StopDecision,
};
pub use cypher::{QuerySynthesizer, ResultShape, SynthesizedQuery, SynthesizerConfig};
pub use engine::{Reasoner, StopReason, TurnOutcome};
pub use state::{HopRecord, HopStatus, ReasoningState};
