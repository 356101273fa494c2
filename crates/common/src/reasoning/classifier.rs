//! Pattern Classifier - Decides what kind of traversal a question needs
//!
//! Provides:
//! - Weighted multi-signal scoring over six traversal patterns
//! - Low-confidence fallback to exploration
//! - Fixed step plans and hop budgets per pattern

use crate::schema::{EdgeType, Entity};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Traversal shape of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Simple,
    Chain,
    Path,
    Comparison,
    Aggregation,
    Explore,
}

impl Pattern {
    pub const ALL: [Pattern; 6] = [
        Pattern::Simple,
        Pattern::Chain,
        Pattern::Path,
        Pattern::Comparison,
        Pattern::Aggregation,
        Pattern::Explore,
    ];

    /// Tie-break order, most specific first
    pub const PRIORITY: [Pattern; 6] = [
        Pattern::Chain,
        Pattern::Comparison,
        Pattern::Path,
        Pattern::Aggregation,
        Pattern::Simple,
        Pattern::Explore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Simple => "simple",
            Pattern::Chain => "chain",
            Pattern::Path => "path",
            Pattern::Comparison => "comparison",
            Pattern::Aggregation => "aggregation",
            Pattern::Explore => "explore",
        }
    }

    /// Single-shot patterns stop after their first hop
    pub fn is_single_shot(&self) -> bool {
        matches!(self, Pattern::Path | Pattern::Comparison)
    }

    fn index(&self) -> usize {
        match self {
            Pattern::Simple => 0,
            Pattern::Chain => 1,
            Pattern::Path => 2,
            Pattern::Comparison => 3,
            Pattern::Aggregation => 4,
            Pattern::Explore => 5,
        }
    }

    /// Hop ceiling of the longest plan
    pub fn longest_plan() -> usize {
        Self::ALL.iter().map(|p| p.plan().len()).max().unwrap_or(0)
    }

    /// Fixed step plan for this pattern
    pub fn plan(&self) -> Vec<StepType> {
        match self {
            Pattern::Path => vec![StepType::Path],
            Pattern::Comparison => vec![StepType::Comparison],
            Pattern::Chain => vec![StepType::Intent, StepType::Explore],
            Pattern::Aggregation => vec![StepType::Intent],
            Pattern::Simple | Pattern::Explore => {
                vec![StepType::Intent, StepType::Explore, StepType::Explore]
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of query a plan step synthesizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Relation-specific builder keyed by the best relation guess
    Intent,
    /// Bounded shortest path between two anchors
    Path,
    /// Per-anchor counts over one relation
    Comparison,
    /// Count/collect grouped by one anchor
    Aggregation,
    /// Least selective neighbourhood expansion
    Explore,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Intent => "intent",
            StepType::Path => "path",
            StepType::Comparison => "comparison",
            StepType::Aggregation => "aggregation",
            StepType::Explore => "explore",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pattern score accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternScores([f32; 6]);

impl PatternScores {
    pub fn get(&self, pattern: Pattern) -> f32 {
        self.0[pattern.index()]
    }

    fn add(&mut self, pattern: Pattern, amount: f32) {
        self.0[pattern.index()] += amount;
    }

    pub fn max(&self) -> f32 {
        self.0.iter().copied().fold(0.0, f32::max)
    }

    /// Highest score, ties broken by `Pattern::PRIORITY`
    pub fn best(&self) -> Pattern {
        let max = self.max();
        Pattern::PRIORITY
            .into_iter()
            .find(|p| self.get(*p) >= max)
            .unwrap_or(Pattern::Explore)
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub pattern: Pattern,
    pub steps: Vec<StepType>,
    pub max_hops: usize,
    pub scores: PatternScores,
}

/// Signal weights and fallback threshold
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub keyword_weight: f32,
    pub entity_count_weight: f32,
    pub relation_weight: f32,
    pub structure_weight: f32,
    /// Below this best score the question is treated as exploration
    pub min_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.3,
            entity_count_weight: 0.2,
            relation_weight: 0.3,
            structure_weight: 0.2,
            min_confidence: 0.3,
        }
    }
}

const CHAIN_KEYWORDS: &[&str] = &[
    r"tiền nhiệm",
    r"kế nhiệm",
    r"trước.*sau",
    r"thay thế",
    r"người kế",
    r"người trước",
    r"sau.*ai",
    r"trước.*ai",
    r"predecessor",
    r"successor",
    r"succeeded",
    r"preceded",
];

const PATH_KEYWORDS: &[&str] = &[
    r"mối quan hệ",
    r"liên quan",
    r"kết nối",
    r"từ.*đến",
    r"giữa.*và",
    r"có.*quan.*hệ",
    r"có.*liên.*kết",
    r"between.*and",
    r"relationship",
    r"connected",
];

const COMPARISON_KEYWORDS: &[&str] = &[
    r"so sánh",
    r"nhiều hơn",
    r"ít hơn",
    r"cao hơn",
    r"thấp hơn",
    r"già hơn",
    r"trẻ hơn",
    r"giống",
    r"khác",
    r"ai.*nhiều",
    r"ai.*ít",
    r"compare",
    r"more than",
    r"fewer than",
    r"older than",
    r"younger than",
];

const AGGREGATION_KEYWORDS: &[&str] = &[
    r"tất cả",
    r"danh sách",
    r"có bao nhiêu",
    r"đếm",
    r"tổng số",
    r"mấy người",
    r"những ai",
    r"how many",
    r"\blist\b",
    r"count",
];

const VERIFICATION_PHRASES: &[&str] = &[
    "đúng hay sai",
    "đúng không",
    "có phải",
    "có đúng",
    "is that true",
    "true or false",
];

const RELATIONSHIP_PHRASES: &[&str] = &["giữa", "mối quan hệ", "liên kết", "between", "relationship"];

const CONJUNCTIONS: &[&str] = &[" và ", ", ", " and "];

const DISJUNCTIONS: &[&str] = &[" hay ", " hoặc ", " or "];

/// Pattern classifier
pub struct Classifier {
    config: ClassifierConfig,

    /// Keyword regex families, one list per pattern
    keywords: Vec<(Pattern, Vec<Regex>)>,

    /// `A. ... B. ...` style options
    multiple_choice: Regex,
}

impl Classifier {
    /// Create a classifier with compiled keyword families
    pub fn new(config: ClassifierConfig) -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "Skipping invalid keyword regex");
                        None
                    }
                })
                .collect()
        };

        let keywords = vec![
            (Pattern::Path, compile(PATH_KEYWORDS)),
            (Pattern::Chain, compile(CHAIN_KEYWORDS)),
            (Pattern::Comparison, compile(COMPARISON_KEYWORDS)),
            (Pattern::Aggregation, compile(AGGREGATION_KEYWORDS)),
        ];

        let multiple_choice = Regex::new(r"[A-D][\.\)]\s+").expect("static regex");

        Self {
            config,
            keywords,
            multiple_choice,
        }
    }

    /// Classify a question into a pattern, step plan and hop budget
    pub fn classify(
        &self,
        question: &str,
        entities: &[Entity],
        best_relation: Option<&str>,
    ) -> Classification {
        let scores = self.score(question, entities, best_relation);

        let pattern = if scores.max() < self.config.min_confidence {
            Pattern::Explore
        } else {
            scores.best()
        };

        let steps = pattern.plan();
        let max_hops = steps.len();

        tracing::info!(
            pattern = %pattern,
            max_hops,
            entities = entities.len(),
            relation = best_relation.unwrap_or("UNKNOWN"),
            scores = ?scores,
            "Classified question"
        );

        Classification {
            pattern,
            steps,
            max_hops,
            scores,
        }
    }

    /// Accumulate all four signals
    pub fn score(
        &self,
        question: &str,
        entities: &[Entity],
        best_relation: Option<&str>,
    ) -> PatternScores {
        let lower = question.to_lowercase();
        let mut scores = PatternScores::default();

        let keyword_hit = self.keyword_signal(&lower, &mut scores);
        self.entity_count_signal(entities.len(), &mut scores);
        self.relation_signal(best_relation, &mut scores);
        self.structure_signal(question, &lower, keyword_hit, &mut scores);

        scores
    }

    /// First matching regex per family wins that family's full weight
    fn keyword_signal(&self, lower: &str, scores: &mut PatternScores) -> bool {
        let mut any = false;
        for (pattern, family) in &self.keywords {
            if family.iter().any(|re| re.is_match(lower)) {
                scores.add(*pattern, self.config.keyword_weight);
                any = true;
            }
        }
        any
    }

    fn entity_count_signal(&self, count: usize, scores: &mut PatternScores) {
        let w = self.config.entity_count_weight;
        match count {
            0 => {}
            1 => scores.add(Pattern::Simple, w),
            2 => {
                scores.add(Pattern::Path, w * 0.5);
                scores.add(Pattern::Comparison, w * 0.5);
            }
            _ => scores.add(Pattern::Explore, w),
        }
    }

    fn relation_signal(&self, best_relation: Option<&str>, scores: &mut PatternScores) {
        let Some(edge) = best_relation.and_then(EdgeType::parse) else {
            return;
        };
        let suggested = if edge.is_succession() {
            Pattern::Chain
        } else {
            Pattern::Simple
        };
        scores.add(suggested, self.config.relation_weight);
    }

    /// Conjunctions only vote for exploration when no keyword family
    /// matched; otherwise they are listing the anchors of that pattern.
    fn structure_signal(
        &self,
        original: &str,
        lower: &str,
        keyword_hit: bool,
        scores: &mut PatternScores,
    ) {
        let w = self.config.structure_weight;

        if !keyword_hit && CONJUNCTIONS.iter().any(|c| lower.contains(c)) {
            scores.add(Pattern::Explore, w * 0.6);
        }

        if DISJUNCTIONS.iter().any(|d| lower.contains(d)) {
            scores.add(Pattern::Comparison, w * 0.6);
        }

        if VERIFICATION_PHRASES.iter().any(|p| lower.contains(p)) {
            scores.add(Pattern::Explore, w * 0.8);
        }

        if self.multiple_choice.is_match(original) {
            scores.add(Pattern::Explore, w * 0.8);
        }

        if RELATIONSHIP_PHRASES.iter().any(|p| lower.contains(p)) {
            scores.add(Pattern::Path, w * 0.7);
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
