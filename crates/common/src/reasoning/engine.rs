//! Multi-hop Reasoner - Hop-iteration state machine
//!
//! `Init -> {GenerateQuery -> Execute -> Analyze} -> Finalize`
//!
//! Hops run strictly in sequence; each hop's query depends on the
//! previous hop's discoveries. Store and collaborator calls are the only
//! suspension points and each runs under its own deadline. A turn never
//! fails: every error degrades and the loop ends through the stop rule.

use super::classifier::{Classification, Classifier, Pattern, StepType};
use super::collaborators::{
    ConservativeStopDecider, HeuristicSummarizer, HopSummarizer, ReportComposer, StepListComposer,
    StopDecider, StopDecision,
};
use super::cypher::{QuerySynthesizer, SynthesisInput, SynthesizerConfig};
use super::state::{Absorption, HopRecord, HopStatus, ReasoningState};
use crate::config::ReasoningConfig;
use crate::metrics;
use crate::schema::{EdgeType, Entity};
use crate::store::{GraphStore, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

/// Why a turn stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `hop_count` reached `max_hops`
    HopCeiling,
    /// Last hop returned no rows (or had no query)
    DeadEnd,
    /// Path and comparison answer in one hop
    SingleShot,
    /// Last hop found no new entity or relation type
    NoProgress,
    /// Stop decider judged the evidence sufficient
    Sufficient,
}

/// Result of one reasoning turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub pattern: Pattern,
    pub steps: Vec<StepType>,
    pub max_hops: usize,
    pub hop_count: usize,
    pub stop_reason: StopReason,
    pub report: String,
    pub hops: Vec<HopRecord>,
    pub discovered_entities: Vec<String>,
    pub explored_relations: Vec<String>,
    pub accumulated_context: String,
}

/// Multi-hop reasoner over a graph store
pub struct Reasoner {
    store: Arc<dyn GraphStore>,
    classifier: Arc<Classifier>,
    synthesizer: QuerySynthesizer,
    decider: Arc<dyn StopDecider>,
    summarizer: Arc<dyn HopSummarizer>,
    composer: Arc<dyn ReportComposer>,
    config: ReasoningConfig,
}

impl Reasoner {
    /// Create a reasoner with heuristic collaborators
    pub fn new(store: Arc<dyn GraphStore>, config: ReasoningConfig) -> Self {
        let synthesizer = QuerySynthesizer::new(SynthesizerConfig {
            explore_limit: config.explore_limit,
            exclude_explored_relations: config.exclude_explored_relations,
            ..SynthesizerConfig::default()
        });

        Self {
            store,
            classifier: Arc::new(Classifier::default()),
            synthesizer,
            decider: Arc::new(ConservativeStopDecider),
            summarizer: Arc::new(HeuristicSummarizer),
            composer: Arc::new(StepListComposer),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn StopDecider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn HopSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_composer(mut self, composer: Arc<dyn ReportComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Classify without touching the store
    pub fn classify(
        &self,
        question: &str,
        entities: &[Entity],
        best_relation: Option<&str>,
    ) -> Classification {
        self.classifier.classify(question, entities, best_relation)
    }

    /// Run one question-answering turn
    pub async fn run_turn(
        &self,
        question: &str,
        entities: Vec<Entity>,
        best_relation: Option<&str>,
    ) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("turn", %turn_id);
        self.run_turn_inner(turn_id, question, entities, best_relation)
            .instrument(span)
            .await
    }

    async fn run_turn_inner(
        &self,
        turn_id: Uuid,
        question: &str,
        entities: Vec<Entity>,
        best_relation: Option<&str>,
    ) -> TurnOutcome {
        let started = Instant::now();

        // Init
        let classification = self.classify(question, &entities, best_relation);
        let relation = best_relation.and_then(EdgeType::parse);
        let mut state = ReasoningState::new(
            question,
            entities,
            relation,
            &classification,
            self.config.max_discovered_entities,
        );

        tracing::info!(
            pattern = %state.pattern,
            max_hops = state.max_hops,
            entities = state.entities.len(),
            "Starting reasoning turn"
        );

        let stop_reason = loop {
            // GenerateQuery
            state.hop_count += 1;
            let hop = state.hop_count;
            let Some(step) = state.step_for(hop) else {
                state.hop_count -= 1;
                break StopReason::HopCeiling;
            };

            let query = self.synthesizer.synthesize(&SynthesisInput {
                step,
                pattern: state.pattern,
                entities: &state.entities,
                best_relation: state.best_relation,
                discovered: &state.discovered_entities,
                previous_rows: &state.last_rows,
                explored_relations: &state.explored_relations,
                hop,
            });

            // Execute
            let (rows, status) = match &query {
                Some(q) => self.execute(&q.cypher, step).await,
                None => {
                    tracing::info!(hop, step = %step, "No query could be synthesized");
                    (Vec::new(), HopStatus::NoQuery)
                }
            };

            // Analyze
            let sample: Vec<Row> = rows
                .iter()
                .take(self.config.summary_sample_rows)
                .cloned()
                .collect();
            let summary = if rows.is_empty() {
                None
            } else {
                self.summarize(hop, &sample).await
            };
            if let Some(text) = &summary {
                state.append_summary(hop, text);
            }

            let absorption = state.absorb(&rows, query.as_ref().map(|q| q.shape));

            tracing::info!(
                hop,
                step = %step,
                rows = rows.len(),
                new_entities = absorption.new_entities.len(),
                new_relations = absorption.new_relations.len(),
                "Hop analyzed"
            );

            state.hops.push(HopRecord {
                hop,
                step,
                query: query.as_ref().map(|q| q.cypher.clone()),
                shape: query.as_ref().map(|q| q.shape),
                degraded: query.as_ref().map_or(false, |q| q.degraded),
                status,
                rows: rows.len(),
                sample,
                summary,
                new_entities: absorption.new_entities.clone(),
                new_relations: absorption.new_relations.clone(),
            });
            let row_count = rows.len();
            state.last_rows = rows;

            let reason = self.should_stop(&state, row_count, &absorption).await;
            state.needs_more_hops = reason.is_none();
            if let Some(reason) = reason {
                state.reasoning_complete = true;
                break reason;
            }
        };

        // Finalize
        let report = self.finalize(&state).await;
        let elapsed = started.elapsed();

        metrics::record_turn(state.pattern.as_str(), state.hop_count, elapsed.as_secs_f64());
        tracing::info!(
            hops = state.hop_count,
            stop_reason = ?stop_reason,
            discovered = state.discovered_entities.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Reasoning turn complete"
        );

        TurnOutcome {
            turn_id,
            pattern: state.pattern,
            steps: state.plan_steps,
            max_hops: state.max_hops,
            hop_count: state.hop_count,
            stop_reason,
            report,
            hops: state.hops,
            discovered_entities: state.discovered_entities,
            explored_relations: state.explored_relations,
            accumulated_context: state.accumulated_context,
        }
    }

    /// Store errors and timeouts both read as zero rows
    async fn execute(&self, cypher: &str, step: StepType) -> (Vec<Row>, HopStatus) {
        let started = Instant::now();

        match timeout(self.config.store_timeout(), self.store.execute(cypher)).await {
            Ok(Ok(rows)) => {
                metrics::record_graph_query(started.elapsed().as_secs_f64(), step.as_str(), rows.len());
                (rows, HopStatus::Completed)
            }
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!(
                    backend = self.store.backend(),
                    error = %e,
                    "Graph store timed out, treating as empty"
                );
                metrics::record_graph_failure("timeout");
                (Vec::new(), HopStatus::StoreTimeout)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    backend = self.store.backend(),
                    error = %e,
                    "Graph query failed, treating as empty"
                );
                metrics::record_graph_failure("error");
                (Vec::new(), HopStatus::StoreError)
            }
            Err(_) => {
                tracing::warn!(
                    backend = self.store.backend(),
                    timeout_ms = self.config.store_timeout_ms,
                    "Graph query timed out, treating as empty"
                );
                metrics::record_graph_failure("timeout");
                (Vec::new(), HopStatus::StoreTimeout)
            }
        }
    }

    /// Advisory; failures contribute no text
    async fn summarize(&self, hop: usize, rows: &[Row]) -> Option<String> {
        let outcome = timeout(
            self.config.summarizer_timeout(),
            self.summarizer.summarize(hop, rows),
        )
        .await;

        match outcome {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(hop, summarizer = self.summarizer.name(), error = %e, "Hop summary failed");
                metrics::record_collaborator_fallback("summarizer");
                None
            }
            Err(_) => {
                tracing::warn!(hop, summarizer = self.summarizer.name(), "Hop summary timed out");
                metrics::record_collaborator_fallback("summarizer");
                None
            }
        }
    }

    /// Stop rule, evaluated on post-absorption state
    async fn should_stop(
        &self,
        state: &ReasoningState,
        row_count: usize,
        absorption: &Absorption,
    ) -> Option<StopReason> {
        if state.hop_count >= state.max_hops {
            return Some(StopReason::HopCeiling);
        }
        if row_count == 0 {
            return Some(StopReason::DeadEnd);
        }
        if state.pattern.is_single_shot() {
            return Some(StopReason::SingleShot);
        }
        if !absorption.made_progress() {
            return Some(StopReason::NoProgress);
        }

        match self.decide(state).await {
            StopDecision::Sufficient => Some(StopReason::Sufficient),
            StopDecision::Insufficient => None,
        }
    }

    /// Failures and timeouts mean insufficient
    async fn decide(&self, state: &ReasoningState) -> StopDecision {
        let context = state.context_prefix(self.config.decider_context_chars);
        let outcome = timeout(
            self.config.decider_timeout(),
            self.decider.decide(&state.question, state.hop_count, &context, state.max_hops),
        )
        .await;

        match outcome {
            Ok(Ok(decision)) => {
                tracing::debug!(hop = state.hop_count, decision = ?decision, "Stop decision");
                decision
            }
            Ok(Err(e)) => {
                tracing::warn!(decider = self.decider.name(), error = %e, "Stop decision failed");
                metrics::record_collaborator_fallback("stop_decider");
                StopDecision::Insufficient
            }
            Err(_) => {
                tracing::warn!(decider = self.decider.name(), "Stop decision timed out");
                metrics::record_collaborator_fallback("stop_decider");
                StopDecision::Insufficient
            }
        }
    }

    /// No graph access; composer failure falls back to the numbered steps
    async fn finalize(&self, state: &ReasoningState) -> String {
        let steps = state.numbered_steps();
        let context = state.context_prefix(self.config.report_context_chars);

        let outcome = timeout(
            self.config.composer_timeout(),
            self.composer.compose(&state.question, &steps, &context),
        )
        .await;

        match outcome {
            Ok(Ok(report)) if !report.trim().is_empty() => report.trim().to_string(),
            Ok(Ok(_)) => StepListComposer::render(&steps),
            Ok(Err(e)) => {
                tracing::warn!(composer = self.composer.name(), error = %e, "Report composition failed");
                metrics::record_collaborator_fallback("composer");
                StepListComposer::render(&steps)
            }
            Err(_) => {
                tracing::warn!(composer = self.composer.name(), "Report composition timed out");
                metrics::record_collaborator_fallback("composer");
                StepListComposer::render(&steps)
            }
        }
    }
}
