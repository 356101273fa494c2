//! Per-turn reasoning state
//!
//! Owned by exactly one turn. Discoveries only ever grow; the visible
//! entity window keeps the most recent names while the dedup history
//! remembers everything seen this turn.

use super::classifier::{Classification, Pattern, StepType};
use super::cypher::{ResultShape, ENTITY_COLUMNS};
use crate::schema::{EdgeType, Entity};
use crate::store::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// How a hop's execution went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopStatus {
    Completed,
    /// Nothing could be synthesized, not even exploration
    NoQuery,
    StoreError,
    StoreTimeout,
}

/// One hop of the reasoning trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopRecord {
    pub hop: usize,
    pub step: StepType,
    pub query: Option<String>,
    pub shape: Option<ResultShape>,
    /// Structured builder missed and exploration ran instead
    pub degraded: bool,
    pub status: HopStatus,
    /// Rows returned
    pub rows: usize,
    /// First rows, as shown to the summarizer
    pub sample: Vec<Row>,
    pub summary: Option<String>,
    pub new_entities: Vec<String>,
    pub new_relations: Vec<String>,
}

/// What one hop added to the state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Absorption {
    pub new_entities: Vec<String>,
    pub new_relations: Vec<String>,
}

impl Absorption {
    pub fn made_progress(&self) -> bool {
        !self.new_entities.is_empty() || !self.new_relations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningState {
    pub question: String,
    pub entities: Vec<Entity>,
    pub best_relation: Option<EdgeType>,
    pub pattern: Pattern,
    pub plan_steps: Vec<StepType>,
    pub max_hops: usize,
    pub hop_count: usize,
    /// Most recent discoveries, oldest first
    pub discovered_entities: Vec<String>,
    pub explored_relations: Vec<String>,
    pub accumulated_context: String,
    pub needs_more_hops: bool,
    pub reasoning_complete: bool,
    /// Rows of the last executed hop
    pub last_rows: Vec<Row>,
    pub hops: Vec<HopRecord>,
    seen_entities: HashSet<String>,
    max_discovered: usize,
}

impl ReasoningState {
    /// Fresh state for one turn; discoveries start from the entity texts
    pub fn new(
        question: impl Into<String>,
        entities: Vec<Entity>,
        best_relation: Option<EdgeType>,
        classification: &Classification,
        max_discovered: usize,
    ) -> Self {
        let mut state = Self {
            question: question.into(),
            entities,
            best_relation,
            pattern: classification.pattern,
            plan_steps: classification.steps.clone(),
            max_hops: classification.max_hops,
            hop_count: 0,
            discovered_entities: Vec::new(),
            explored_relations: Vec::new(),
            accumulated_context: String::new(),
            needs_more_hops: true,
            reasoning_complete: false,
            last_rows: Vec::new(),
            hops: Vec::new(),
            seen_entities: HashSet::new(),
            max_discovered: max_discovered.max(1),
        };

        let texts: Vec<String> = state.entities.iter().map(|e| e.text.clone()).collect();
        for text in texts {
            if !text.trim().is_empty() {
                state.add_entity(text);
            }
        }
        state
    }

    /// Step for the given 1-based hop, if the plan has one
    pub fn step_for(&self, hop: usize) -> Option<StepType> {
        hop.checked_sub(1).and_then(|i| self.plan_steps.get(i)).copied()
    }

    fn add_entity(&mut self, name: String) -> bool {
        if !self.seen_entities.insert(name.clone()) {
            return false;
        }
        self.discovered_entities.push(name);
        if self.discovered_entities.len() > self.max_discovered {
            let overflow = self.discovered_entities.len() - self.max_discovered;
            self.discovered_entities.drain(..overflow);
        }
        true
    }

    fn add_relation(&mut self, relation: EdgeType) -> bool {
        let name = relation.as_str();
        if self.explored_relations.iter().any(|r| r == name) {
            return false;
        }
        self.explored_relations.push(name.to_string());
        true
    }

    /// Fold a hop's rows into the discoveries. A relation lookup that
    /// returned rows counts as having observed its edge type.
    pub fn absorb(&mut self, rows: &[Row], shape: Option<ResultShape>) -> Absorption {
        let mut absorption = Absorption::default();

        for name in rows.iter().flat_map(harvest_names) {
            if self.add_entity(name.clone()) {
                absorption.new_entities.push(name);
            }
        }

        let queried = match shape {
            Some(ResultShape::Relation(edge)) | Some(ResultShape::Succession(edge))
                if !rows.is_empty() =>
            {
                Some(edge)
            }
            _ => None,
        };
        for relation in queried
            .into_iter()
            .chain(rows.iter().flat_map(harvest_relations))
        {
            if self.add_relation(relation) {
                absorption.new_relations.push(relation.as_str().to_string());
            }
        }

        absorption
    }

    /// Append one hop summary to the accumulated context
    pub fn append_summary(&mut self, hop: usize, summary: &str) {
        self.accumulated_context
            .push_str(&format!("\n[Bước {}] {}", hop, summary.trim()));
    }

    /// First `chars` characters of the accumulated context
    pub fn context_prefix(&self, chars: usize) -> String {
        self.accumulated_context.chars().take(chars).collect()
    }

    /// Hop summaries labelled with their hop number, as in the context
    pub fn numbered_steps(&self) -> Vec<String> {
        self.hops
            .iter()
            .filter_map(|h| h.summary.as_deref().map(|s| format!("Bước {}: {}", h.hop, s)))
            .collect()
    }
}

fn harvest_names(row: &Row) -> Vec<String> {
    let mut names = Vec::new();
    for (column, value) in row {
        let is_name_column =
            ENTITY_COLUMNS.contains(&column.as_str()) || is_indexed(column, "node_");
        if is_name_column {
            if let Some(name) = value.as_str() {
                names.push(name);
            }
        } else if column == "path_nodes" {
            if let Some(nodes) = value.as_array() {
                names.extend(
                    nodes
                        .iter()
                        .filter_map(|n| n.get("name").and_then(Value::as_str)),
                );
            }
        }
    }
    names
        .into_iter()
        .map(str::trim)
        .filter(|n| n.chars().count() > 2 && *n != "Unknown")
        .map(str::to_string)
        .collect()
}

/// Relation types from `relation_types` lists and `rel_<n>` columns.
/// Names outside the vocabulary are ignored.
fn harvest_relations(row: &Row) -> Vec<EdgeType> {
    let mut relations = Vec::new();
    for (column, value) in row {
        if column == "relation_types" {
            if let Some(list) = value.as_array() {
                relations.extend(list.iter().filter_map(Value::as_str).filter_map(EdgeType::parse));
            }
        } else if column.starts_with("rel_") {
            if let Some(edge) = value.as_str().and_then(EdgeType::parse) {
                relations.push(edge);
            }
        }
    }
    relations
}

fn is_indexed(column: &str, prefix: &str) -> bool {
    column
        .strip_prefix(prefix)
        .map_or(false, |rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn classification(pattern: Pattern) -> Classification {
        let steps = pattern.plan();
        Classification {
            pattern,
            max_hops: steps.len(),
            steps,
            scores: Default::default(),
        }
    }

    fn state(max_discovered: usize) -> ReasoningState {
        ReasoningState::new(
            "Ông A là ai?",
            vec![Entity::new("Nguyễn Văn A", EntityType::Politician)],
            None,
            &classification(Pattern::Simple),
            max_discovered,
        )
    }

    #[test]
    fn test_initial_state() {
        let s = state(10);
        assert_eq!(s.hop_count, 0);
        assert_eq!(s.max_hops, 3);
        assert_eq!(s.discovered_entities, vec!["Nguyễn Văn A".to_string()]);
        assert_eq!(s.step_for(1), Some(StepType::Intent));
        assert_eq!(s.step_for(3), Some(StepType::Explore));
        assert_eq!(s.step_for(0), None);
        assert_eq!(s.step_for(4), None);
    }

    #[test]
    fn test_absorb_harvests_name_columns() {
        let mut s = state(10);
        let rows = vec![
            row(json!({"name": "Nguyễn Văn A", "birth_place": "Hà Nội"})),
            row(json!({"successor": "Trần Văn B", "position_id": "pos_1"})),
            row(json!({"predecessor": "Lê C"})),
            row(json!({"name": "Tố Hữu"})),
            row(json!({"name": "Võ"})),
        ];

        let added = s.absorb(&rows, None);
        assert_eq!(added.new_entities, vec!["Trần Văn B", "Lê C", "Tố Hữu"]);
        assert!(!s.discovered_entities.contains(&"Võ".to_string()));
        assert!(!s.discovered_entities.contains(&"Hà Nội".to_string()));
    }

    #[test]
    fn test_absorb_explore_rows() {
        let mut s = state(10);
        let rows = vec![row(json!({
            "source_entity": "Nguyễn Văn A",
            "relation_types": ["BORN_AT", "NOT_A_RELATION"],
            "path_nodes": [
                {"type": "Politician", "name": "Nguyễn Văn A"},
                {"type": "Location", "name": "Nam Định"}
            ]
        }))];

        let added = s.absorb(&rows, Some(ResultShape::Explore));
        assert_eq!(added.new_entities, vec!["Nam Định"]);
        assert_eq!(added.new_relations, vec!["BORN_AT"]);
        assert!(added.made_progress());

        let again = s.absorb(&rows, Some(ResultShape::Explore));
        assert!(!again.made_progress());
    }

    #[test]
    fn test_absorb_chain_columns() {
        let mut s = state(10);
        let rows = vec![row(json!({
            "node_0": "Trần Văn B",
            "node_1": "Phạm Văn D",
            "rel_0": "SUCCEEDED"
        }))];
        let added = s.absorb(&rows, Some(ResultShape::Chain));
        assert_eq!(added.new_entities.len(), 2);
        assert_eq!(added.new_relations, vec!["SUCCEEDED"]);
    }

    #[test]
    fn test_relation_lookup_counts_its_edge() {
        let mut s = state(10);
        let rows = vec![row(json!({"name": "Nguyễn Văn A", "birth_place": "Hà Nội"}))];

        let added = s.absorb(&rows, Some(ResultShape::Relation(EdgeType::BornAt)));
        assert!(added.new_entities.is_empty());
        assert_eq!(added.new_relations, vec!["BORN_AT"]);

        let empty = s.absorb(&[], Some(ResultShape::Relation(EdgeType::DiedAt)));
        assert!(!empty.made_progress());
    }

    #[test]
    fn test_discovered_window_never_shrinks() {
        let mut s = state(3);
        let mut last_len = s.discovered_entities.len();
        for i in 0..6 {
            let rows = vec![row(json!({"name": format!("Người số {}", i)}))];
            s.absorb(&rows, None);
            assert!(s.discovered_entities.len() >= last_len);
            last_len = s.discovered_entities.len();
        }
        assert_eq!(s.discovered_entities.len(), 3);
        assert_eq!(s.discovered_entities.last().unwrap(), "Người số 5");

        // Evicted names are still known
        let again = s.absorb(&[row(json!({"name": "Người số 0"}))], None);
        assert!(again.new_entities.is_empty());
    }

    #[test]
    fn test_context_and_numbered_steps() {
        let mut s = state(10);
        s.append_summary(1, "Ông A sinh ở Hà Nội. ");
        assert_eq!(s.accumulated_context, "\n[Bước 1] Ông A sinh ở Hà Nội.");
        assert_eq!(s.context_prefix(5).chars().count(), 5);

        for (hop, summary) in [(1, Some("Một")), (2, None), (3, Some("Ba"))] {
            s.hops.push(HopRecord {
                hop,
                step: StepType::Explore,
                query: None,
                shape: None,
                degraded: false,
                status: HopStatus::Completed,
                rows: 0,
                sample: Vec::new(),
                summary: summary.map(str::to_string),
                new_entities: Vec::new(),
                new_relations: Vec::new(),
            });
        }
        assert_eq!(s.numbered_steps(), vec!["Bước 1: Một", "Bước 3: Ba"]);
    }
}
