//! Collaborators consulted by the hop loop
//!
//! Three narrow async seams: a stop decider, a per-hop summarizer and a
//! final report composer. Every call is wrapped in a deadline by the
//! engine, and any failure degrades to a conservative default there.
//! The heuristic implementations here are deterministic and need no
//! network access.

use crate::errors::Result;
use crate::store::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stop decider verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopDecision {
    Sufficient,
    Insufficient,
}

impl StopDecision {
    /// Only an exact recognised token means sufficient. `ĐỦ` and
    /// `sufficient` are recognised, case-insensitively, after trimming
    /// whitespace, quotes and a trailing full stop.
    pub fn from_token(raw: &str) -> Self {
        let token = raw
            .trim()
            .trim_end_matches('.')
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .trim_end_matches('.')
            .trim()
            .to_uppercase();

        match token.as_str() {
            "ĐỦ" | "SUFFICIENT" => StopDecision::Sufficient,
            _ => StopDecision::Insufficient,
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, StopDecision::Sufficient)
    }
}

/// Judges whether the evidence gathered so far answers the question
#[async_trait]
pub trait StopDecider: Send + Sync {
    async fn decide(
        &self,
        question: &str,
        hop_count: usize,
        context: &str,
        max_hops: usize,
    ) -> Result<StopDecision>;

    /// Name used in logs and metrics
    fn name(&self) -> &str;
}

/// Turns a hop's top rows into a short sentence
#[async_trait]
pub trait HopSummarizer: Send + Sync {
    async fn summarize(&self, hop: usize, rows: &[Row]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Writes the final report over all hop summaries
#[async_trait]
pub trait ReportComposer: Send + Sync {
    async fn compose(&self, question: &str, steps: &[String], context: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Never claims sufficiency; the structural stop rules end the turn
#[derive(Debug, Clone, Default)]
pub struct ConservativeStopDecider;

#[async_trait]
impl StopDecider for ConservativeStopDecider {
    async fn decide(
        &self,
        _question: &str,
        _hop_count: usize,
        _context: &str,
        _max_hops: usize,
    ) -> Result<StopDecision> {
        Ok(StopDecision::Insufficient)
    }

    fn name(&self) -> &str {
        "conservative"
    }
}

/// Renders rows as `column: value` pairs
#[derive(Debug, Clone, Default)]
pub struct HeuristicSummarizer;

impl HeuristicSummarizer {
    pub fn render(rows: &[Row]) -> String {
        if rows.is_empty() {
            return "Không tìm thấy kết quả.".to_string();
        }

        let rendered: Vec<String> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|(column, value)| {
                        render_value(value).map(|v| format!("{}: {}", column, v))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|line| !line.is_empty())
            .collect();

        format!("Tìm thấy {} kết quả: {}", rows.len(), rendered.join("; "))
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(render_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" -> "))
            }
        }
        // Node and relation maps: prefer the display name, then the type
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("type"))
            .and_then(render_value),
    }
}

#[async_trait]
impl HopSummarizer for HeuristicSummarizer {
    async fn summarize(&self, _hop: usize, rows: &[Row]) -> Result<String> {
        Ok(Self::render(rows))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Returns the numbered steps verbatim
#[derive(Debug, Clone, Default)]
pub struct StepListComposer;

impl StepListComposer {
    pub fn render(steps: &[String]) -> String {
        if steps.is_empty() {
            "Không tìm thấy thông tin phù hợp trong đồ thị tri thức.".to_string()
        } else {
            steps.join("\n")
        }
    }
}

#[async_trait]
impl ReportComposer for StepListComposer {
    async fn compose(&self, _question: &str, steps: &[String], _context: &str) -> Result<String> {
        Ok(Self::render(steps))
    }

    fn name(&self) -> &str {
        "step_list"
    }
}
