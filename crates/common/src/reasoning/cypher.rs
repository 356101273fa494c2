//! Query Synthesizer - Builds one Cypher query per plan step
//!
//! Provides:
//! - One relation builder per edge type, in a static table
//! - Path, comparison, aggregation and chain builders
//! - Context-aware exploration as the unconditional fallback
//!
//! Everything here is pure string construction. Display strings only enter
//! a query through `schema::escape`.

use super::classifier::{Pattern, StepType};
use crate::schema::{self, EdgeType, Entity, EntityType, EXPLORE_LABELS, PATH_END_LABELS};
use crate::store::{row_str, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Columns whose string values name entities
pub const ENTITY_COLUMNS: &[&str] = &["name", "politician", "source_entity", "predecessor", "successor"];

/// What the rows of a synthesized query look like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "relation", rename_all = "snake_case")]
pub enum ResultShape {
    /// One row per matched edge of this type
    Relation(EdgeType),
    /// Predecessor/successor names scoped to one position
    Succession(EdgeType),
    /// `node_i` / `rel_i` columns along a fixed relation chain
    Chain,
    /// `path_nodes`, `path_relations`, `path_length`
    Path,
    /// Per-anchor attribute and optional relation totals
    Comparison,
    /// Count or collected list grouped by one anchor
    Aggregation,
    /// `source_entity`, `relation_types`, `path_nodes`
    Explore,
}

/// Query plus the metadata the state machine records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedQuery {
    pub step: StepType,
    pub cypher: String,
    pub shape: ResultShape,
    /// True when the step's own builder missed and exploration was used
    pub degraded: bool,
}

/// Everything a step may draw on
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub step: StepType,
    pub pattern: Pattern,
    /// Entities extracted from the question
    pub entities: &'a [Entity],
    pub best_relation: Option<EdgeType>,
    /// Discovered entity names, oldest first
    pub discovered: &'a [String],
    /// Rows returned by the previous hop
    pub previous_rows: &'a [Row],
    pub explored_relations: &'a [String],
    /// 1-based hop being planned
    pub hop: usize,
}

/// Inputs a relation builder sees
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub entities: &'a [Entity],
    /// `position_id` already resolved by an earlier `SERVED_AS` lookup
    pub resolved_position_id: Option<&'a str>,
}

/// Relation-specific builder
pub type RelationBuilder = fn(&BuildContext<'_>) -> Option<String>;

/// Aggregation flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Count,
    List,
}

/// Synthesizer limits
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Row cap of exploration queries
    pub explore_limit: usize,
    /// Recent discoveries used as exploration anchors
    pub explore_anchors: usize,
    /// Names harvested from the previous hop used as anchors
    pub context_anchors: usize,
    /// Shortest-path depth cap
    pub path_max_depth: usize,
    /// Anchors compared at most
    pub comparison_anchors: usize,
    /// Politician property compared when no relation applies
    pub comparison_attribute: String,
    /// Skip relation types seen in earlier hops while exploring
    pub exclude_explored_relations: bool,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            explore_limit: 15,
            explore_anchors: 3,
            context_anchors: 5,
            path_max_depth: 4,
            comparison_anchors: 3,
            comparison_attribute: "birth_date".to_string(),
            exclude_explored_relations: false,
        }
    }
}

/// Query synthesizer
#[derive(Debug, Clone, Default)]
pub struct QuerySynthesizer {
    config: SynthesizerConfig,
}

impl QuerySynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self { config }
    }

    /// Build the query for one step. Structured builders degrade to
    /// exploration; `None` means not even exploration has an anchor.
    pub fn synthesize(&self, input: &SynthesisInput<'_>) -> Option<SynthesizedQuery> {
        let structured = match input.step {
            StepType::Intent => self.intent(input),
            StepType::Path => self.path(input),
            StepType::Comparison => self.comparison(input),
            StepType::Aggregation => self.aggregation(input),
            StepType::Explore => self.chain_continuation(input),
        };

        if let Some((cypher, shape)) = structured {
            tracing::debug!(hop = input.hop, step = %input.step, "Structured query built");
            return Some(SynthesizedQuery {
                step: input.step,
                cypher,
                shape,
                degraded: false,
            });
        }

        let degraded = input.step != StepType::Explore;
        if degraded {
            tracing::info!(
                hop = input.hop,
                step = %input.step,
                relation = ?input.best_relation,
                "Structured synthesis missed, falling back to exploration"
            );
        }

        self.explore(input).map(|cypher| SynthesizedQuery {
            step: input.step,
            cypher,
            shape: ResultShape::Explore,
            degraded,
        })
    }

    fn intent(&self, input: &SynthesisInput<'_>) -> Option<(String, ResultShape)> {
        let edge = input.best_relation?;
        let ctx = BuildContext {
            entities: input.entities,
            resolved_position_id: resolved_position_id(input.previous_rows),
        };
        let cypher = builder_for(edge)(&ctx)?;
        let shape = if edge.is_succession() {
            ResultShape::Succession(edge)
        } else {
            ResultShape::Relation(edge)
        };
        Some((cypher, shape))
    }

    fn path(&self, input: &SynthesisInput<'_>) -> Option<(String, ResultShape)> {
        let anchors = anchor_names(input.entities, input.discovered);
        let start = input
            .entities
            .iter()
            .find(|e| e.entity_type == EntityType::Politician)
            .map(|e| e.text.as_str())
            .or_else(|| anchors.first().copied())?;
        let end = anchors.iter().copied().find(|a| *a != start)?;

        Some((
            build_path_query(start, end, self.config.path_max_depth),
            ResultShape::Path,
        ))
    }

    fn comparison(&self, input: &SynthesisInput<'_>) -> Option<(String, ResultShape)> {
        let anchors: Vec<&str> = anchor_names(input.entities, input.discovered)
            .into_iter()
            .take(self.config.comparison_anchors)
            .collect();

        build_comparison_query(
            &anchors,
            &self.config.comparison_attribute,
            input.best_relation,
        )
        .map(|q| (q, ResultShape::Comparison))
    }

    fn aggregation(&self, input: &SynthesisInput<'_>) -> Option<(String, ResultShape)> {
        let edge = input.best_relation?;
        let anchor = input
            .entities
            .iter()
            .find(|e| e.entity_type == EntityType::Politician)
            .map(|e| e.text.as_str())?;

        Some((
            build_aggregation_query(anchor, edge, AggregationMode::Count),
            ResultShape::Aggregation,
        ))
    }

    /// In a chain turn, keep walking the succession edge from the last
    /// resolved predecessor/successor within the same position.
    fn chain_continuation(&self, input: &SynthesisInput<'_>) -> Option<(String, ResultShape)> {
        if input.pattern != Pattern::Chain {
            return None;
        }
        let edge = input.best_relation.filter(EdgeType::is_succession)?;
        let position_id = resolved_position_id(input.previous_rows)?;
        let column = if edge == EdgeType::Preceded {
            "predecessor"
        } else {
            "successor"
        };
        let start = input.previous_rows.iter().find_map(|r| row_str(r, column))?;

        let link = ChainLink {
            edge,
            reverse: edge == EdgeType::Succeeded,
        };
        build_chain_query(start, &[link], Some(position_id), input.hop)
            .map(|q| (q, ResultShape::Chain))
    }

    fn explore(&self, input: &SynthesisInput<'_>) -> Option<String> {
        let mut anchors = harvest_entity_names(input.previous_rows);
        anchors.truncate(self.config.context_anchors);

        if anchors.is_empty() {
            anchors = input
                .discovered
                .iter()
                .rev()
                .take(self.config.explore_anchors)
                .cloned()
                .collect();
        }

        let excluded: &[String] = if self.config.exclude_explored_relations {
            input.explored_relations
        } else {
            &[]
        };

        tracing::debug!(
            hop = input.hop,
            anchors = anchors.len(),
            explored_relations = input.explored_relations.len(),
            "Building exploration query"
        );

        build_explore_query(&anchors, excluded, self.config.explore_limit)
    }
}

/// Names from the previous hop, deduplicated in first-seen order
fn harvest_entity_names(rows: &[Row]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .flat_map(|row| ENTITY_COLUMNS.iter().filter_map(move |c| row_str(row, c)))
        .filter(|name| name.chars().count() > 2)
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

fn resolved_position_id(rows: &[Row]) -> Option<&str> {
    rows.iter().find_map(|r| row_str(r, schema::POSITION_ID))
}

/// Entity texts first, then discoveries, without repeats
fn anchor_names<'a>(entities: &'a [Entity], discovered: &'a [String]) -> Vec<&'a str> {
    let mut names: Vec<&str> = Vec::new();
    for name in entities
        .iter()
        .map(|e| e.text.as_str())
        .chain(discovered.iter().map(String::as_str))
    {
        if !name.trim().is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn find_entity(entities: &[Entity], entity_type: EntityType) -> Option<&str> {
    entities
        .iter()
        .find(|e| e.entity_type == entity_type && !e.text.trim().is_empty())
        .map(|e| e.text.as_str())
}

fn find_nth_entity(entities: &[Entity], entity_type: EntityType, n: usize) -> Option<&str> {
    entities
        .iter()
        .filter(|e| e.entity_type == entity_type && !e.text.trim().is_empty())
        .nth(n)
        .map(|e| e.text.as_str())
}

// ------------------------ relation builders ------------------------

/// Static builder table keyed by edge type
pub fn builder_for(edge: EdgeType) -> RelationBuilder {
    match edge {
        EdgeType::BornAt => build_born_at,
        EdgeType::DiedAt => build_died_at,
        EdgeType::ServedAs => build_served_as,
        EdgeType::Succeeded => build_succeeded,
        EdgeType::Preceded => build_preceded,
        EdgeType::AlumnusOf => build_alumnus_of,
        EdgeType::Awarded => build_awarded,
        EdgeType::ServedIn => build_served_in,
        EdgeType::HasRank => build_has_rank,
        EdgeType::FoughtIn => build_fought_in,
        EdgeType::HasAcademicTitle => build_academic_title,
    }
}

/// Politician -> target lookup description
struct RelationSpec {
    edge: EdgeType,
    /// Alias of the target name column
    target_column: &'static str,
    /// Extra `r.<prop>` columns from the edge
    edge_props: &'static [&'static str],
    order_by: Option<&'static str>,
    limit_source: usize,
    limit_both: usize,
    limit_target: usize,
}

const BORN_AT: RelationSpec = RelationSpec {
    edge: EdgeType::BornAt,
    target_column: "birth_place",
    edge_props: &[],
    order_by: None,
    limit_source: 5,
    limit_both: 5,
    limit_target: 20,
};

const DIED_AT: RelationSpec = RelationSpec {
    edge: EdgeType::DiedAt,
    target_column: "death_place",
    edge_props: &[],
    order_by: None,
    limit_source: 5,
    limit_both: 20,
    limit_target: 20,
};

const SERVED_AS: RelationSpec = RelationSpec {
    edge: EdgeType::ServedAs,
    target_column: "position",
    edge_props: &["term_start", "term_end", "status", "reason"],
    order_by: Some("r.term_start ASC"),
    limit_source: 50,
    limit_both: 20,
    limit_target: 50,
};

const ALUMNUS_OF: RelationSpec = RelationSpec {
    edge: EdgeType::AlumnusOf,
    target_column: "school_name",
    edge_props: &[],
    order_by: None,
    limit_source: 20,
    limit_both: 20,
    limit_target: 50,
};

const AWARDED: RelationSpec = RelationSpec {
    edge: EdgeType::Awarded,
    target_column: "award_name",
    edge_props: &[],
    order_by: None,
    limit_source: 50,
    limit_both: 20,
    limit_target: 50,
};

const SERVED_IN: RelationSpec = RelationSpec {
    edge: EdgeType::ServedIn,
    target_column: "military_career",
    edge_props: &["year_start", "year_end"],
    order_by: None,
    limit_source: 20,
    limit_both: 20,
    limit_target: 50,
};

const HAS_RANK: RelationSpec = RelationSpec {
    edge: EdgeType::HasRank,
    target_column: "rank",
    edge_props: &[],
    order_by: None,
    limit_source: 20,
    limit_both: 20,
    limit_target: 50,
};

const FOUGHT_IN: RelationSpec = RelationSpec {
    edge: EdgeType::FoughtIn,
    target_column: "campaign_name",
    edge_props: &[],
    order_by: None,
    limit_source: 20,
    limit_both: 20,
    limit_target: 50,
};

const HAS_ACADEMIC_TITLE: RelationSpec = RelationSpec {
    edge: EdgeType::HasAcademicTitle,
    target_column: "academic_title",
    edge_props: &[],
    order_by: None,
    limit_source: 20,
    limit_both: 20,
    limit_target: 50,
};

fn build_born_at(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&BORN_AT, ctx.entities)
}

fn build_died_at(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&DIED_AT, ctx.entities)
}

fn build_served_as(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&SERVED_AS, ctx.entities)
}

fn build_alumnus_of(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&ALUMNUS_OF, ctx.entities)
}

fn build_awarded(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&AWARDED, ctx.entities)
}

fn build_served_in(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&SERVED_IN, ctx.entities)
}

fn build_has_rank(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&HAS_RANK, ctx.entities)
}

fn build_fought_in(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&FOUGHT_IN, ctx.entities)
}

fn build_academic_title(ctx: &BuildContext<'_>) -> Option<String> {
    relation_query(&HAS_ACADEMIC_TITLE, ctx.entities)
}

fn build_preceded(ctx: &BuildContext<'_>) -> Option<String> {
    succession_query(EdgeType::Preceded, ctx)
}

fn build_succeeded(ctx: &BuildContext<'_>) -> Option<String> {
    succession_query(EdgeType::Succeeded, ctx)
}

/// Three shapes: both endpoints bound, source only, target only
fn relation_query(spec: &RelationSpec, entities: &[Entity]) -> Option<String> {
    let target_label = spec.edge.target_label();
    let source = find_entity(entities, spec.edge.source_label());
    let target = find_entity(entities, target_label);

    let (conditions, limit) = match (source, target) {
        (Some(s), Some(t)) => (
            vec![schema::name_contains("p", s), schema::name_contains("t", t)],
            spec.limit_both,
        ),
        (Some(s), None) => (vec![schema::name_contains("p", s)], spec.limit_source),
        (None, Some(t)) => (vec![schema::name_contains("t", t)], spec.limit_target),
        (None, None) => return None,
    };

    let mut columns = vec![
        "p.name AS name".to_string(),
        format!("t.name AS {}", spec.target_column),
    ];
    columns.extend(spec.edge_props.iter().map(|prop| format!("r.{} AS {}", prop, prop)));

    let mut query = format!(
        "MATCH (p:Politician)-[r:{}]->(t:{})\nWHERE {}\nRETURN {}",
        spec.edge,
        target_label,
        conditions.join("\n  AND "),
        columns.join(", "),
    );
    if let Some(order) = spec.order_by {
        query.push_str(&format!("\nORDER BY {}", order));
    }
    query.push_str(&format!("\nLIMIT {}", limit));
    Some(query)
}

/// Succession lookups always carry a position scope: either resolved
/// through the politician's `SERVED_AS` edge to a named position, or an
/// already-known `position_id`. Without one there is no query.
fn succession_query(edge: EdgeType, ctx: &BuildContext<'_>) -> Option<String> {
    let politician = find_entity(ctx.entities, EntityType::Politician)?;
    let other = find_nth_entity(ctx.entities, EntityType::Politician, 1);
    let position = find_entity(ctx.entities, EntityType::Position);

    let (head, scope, position_column) = match (position, ctx.resolved_position_id) {
        (Some(pos), _) => (
            format!(
                "MATCH (p:Politician)-[:SERVED_AS]->(pos:Position)\nWHERE {}\n  AND {}",
                schema::name_contains("p", politician),
                schema::name_contains("pos", pos),
            ),
            "{position_id: pos.id}".to_string(),
            "pos.id AS position_id, pos.name AS position",
        ),
        (None, Some(id)) => (
            format!(
                "MATCH (p:Politician)\nWHERE {}",
                schema::name_contains("p", politician)
            ),
            format!("{{position_id: \"{}\"}}", schema::escape(id)),
            "r.position_id AS position_id",
        ),
        (None, None) => return None,
    };

    let (column, pattern) = match edge {
        EdgeType::Preceded => (
            "predecessor",
            format!("(p)-[r:PRECEDED {}]->(o:Politician)", scope),
        ),
        _ => (
            "successor",
            format!("(o:Politician)-[r:SUCCEEDED {}]->(p)", scope),
        ),
    };

    let mut query = format!("{}\nMATCH {}", head, pattern);
    if let Some(o) = other {
        query.push_str(&format!("\nWHERE {}", schema::name_contains("o", o)));
    }
    query.push_str(&format!(
        "\nRETURN DISTINCT p.name AS name, o.name AS {}, {}\nLIMIT 20",
        column, position_column
    ));
    Some(query)
}

// ------------------------ multi-hop builders ------------------------

/// Bounded shortest path between two anchors
pub fn build_path_query(start: &str, end: &str, max_depth: usize) -> String {
    format!(
        "MATCH (start:Politician)
WHERE {start}
MATCH (end)
WHERE ({labels})
  AND toLower(coalesce(end.name, '')) CONTAINS toLower(\"{end}\")
  AND end <> start
MATCH path = shortestPath((start)-[*1..{depth}]-(end))
RETURN
  [node IN nodes(path) | {{type: labels(node)[0], name: coalesce(node.name, 'Unknown')}}] AS path_nodes,
  [rel IN relationships(path) | {{type: type(rel), properties: properties(rel)}}] AS path_relations,
  [rel IN relationships(path) | type(rel)] AS relation_types,
  length(path) AS path_length
ORDER BY path_length ASC
LIMIT 5",
        start = schema::name_contains("start", start),
        labels = schema::label_predicate("end", &PATH_END_LABELS),
        end = schema::escape(end),
        depth = max_depth,
    )
}

/// Compare 2-3 politicians on an attribute and, optionally, a relation
pub fn build_comparison_query(
    anchors: &[&str],
    attribute: &str,
    relation: Option<EdgeType>,
) -> Option<String> {
    if anchors.len() < 2 {
        return None;
    }
    let matches = anchors
        .iter()
        .map(|a| schema::name_contains("p", a))
        .collect::<Vec<_>>()
        .join(" OR ");

    let query = match relation {
        Some(edge) => {
            let rel = edge.as_str().to_lowercase();
            format!(
                "MATCH (p:Politician)
WHERE {matches}
OPTIONAL MATCH (p)-[r:{edge}]->(target)
WITH p, count(target) AS total, collect(target.name) AS items
RETURN
  p.name AS politician,
  p.{attr} AS {attr},
  total AS total_{rel},
  items AS {rel}_list
ORDER BY total_{rel} DESC",
                matches = matches,
                edge = edge,
                attr = attribute,
                rel = rel,
            )
        }
        None => format!(
            "MATCH (p:Politician)
WHERE {matches}
RETURN
  p.name AS politician,
  p.{attr} AS {attr}
ORDER BY p.{attr}",
            matches = matches,
            attr = attribute,
        ),
    };
    Some(query)
}

/// Count or list one politician's targets of a relation
pub fn build_aggregation_query(anchor: &str, edge: EdgeType, mode: AggregationMode) -> String {
    let rel = edge.as_str().to_lowercase();
    let head = format!(
        "MATCH (p:Politician)-[r:{}]->(target)\nWHERE {}",
        edge,
        schema::name_contains("p", anchor)
    );

    match mode {
        AggregationMode::Count => format!(
            "{head}
RETURN
  p.name AS politician,
  count(target) AS total_{rel},
  collect(target.name) AS items
ORDER BY total_{rel} DESC
LIMIT 10"
        ),
        AggregationMode::List => format!(
            "{head}
RETURN
  p.name AS politician,
  collect({{name: target.name, properties: properties(r)}}) AS {rel}_list
LIMIT 10"
        ),
    }
}

/// One link of a fixed relation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub edge: EdgeType,
    /// Traverse against the stored direction
    pub reverse: bool,
}

/// Walk a fixed chain of relations from one politician. Succession links
/// require a position scope; without one there is no query.
pub fn build_chain_query(
    start: &str,
    links: &[ChainLink],
    position_id: Option<&str>,
    hop: usize,
) -> Option<String> {
    if links.is_empty() {
        return None;
    }
    let scope = match position_id {
        Some(id) => format!(" {{position_id: \"{}\"}}", schema::escape(id)),
        None if links.iter().any(|l| l.edge.is_succession()) => return None,
        None => String::new(),
    };

    let mut path = String::from("(n0)");
    for (i, link) in links.iter().enumerate() {
        let props = if link.edge.is_succession() { scope.as_str() } else { "" };
        let rel = format!("[r{}:{}{}]", i, link.edge, props);
        if link.reverse {
            path.push_str(&format!("<-{}-(n{})", rel, i + 1));
        } else {
            path.push_str(&format!("-{}->(n{})", rel, i + 1));
        }
    }

    let nodes = (0..=links.len())
        .map(|i| format!("n{}.name AS node_{}", i, i))
        .collect::<Vec<_>>();
    let rels = (0..links.len())
        .map(|i| format!("type(r{}) AS rel_{}", i, i))
        .collect::<Vec<_>>();

    tracing::debug!(hop, links = links.len(), "Built chain query");

    Some(format!(
        "MATCH (n0:Politician)\nWHERE {}\nMATCH {}\nRETURN {}, {}\nLIMIT 20",
        schema::name_contains("n0", start),
        path,
        nodes.join(", "),
        rels.join(", ")
    ))
}

/// Undirected 1..2 hop neighbourhood of the anchors. Empty anchors give
/// no query.
pub fn build_explore_query(anchors: &[String], excluded: &[String], limit: usize) -> Option<String> {
    if anchors.is_empty() {
        return None;
    }

    let matches = anchors
        .iter()
        .map(|a| schema::name_contains("p", a))
        .collect::<Vec<_>>()
        .join(" OR ");

    // Only vocabulary names may reach the query text.
    let excluded: Vec<String> = excluded
        .iter()
        .filter_map(|r| EdgeType::parse(r))
        .map(|e| format!("'{}'", e))
        .collect();
    let exclusion = if excluded.is_empty() {
        String::new()
    } else {
        format!(
            "\n  AND none(rel IN relationships(path) WHERE type(rel) IN [{}])",
            excluded.join(", ")
        )
    };

    Some(format!(
        "MATCH (p)
WHERE ({source_labels})
  AND ({matches})
MATCH path = (p)-[*1..2]-(connected)
WHERE ({target_labels}){exclusion}
WITH p, path
LIMIT {limit}
RETURN
  p.name AS source_entity,
  [rel IN relationships(path) | type(rel)] AS relation_types,
  [node IN nodes(path) | {{type: labels(node)[0], name: coalesce(node.name, 'Unknown')}}] AS path_nodes",
        source_labels = schema::label_predicate("p", &EXPLORE_LABELS),
        matches = matches,
        target_labels = schema::label_predicate("connected", &EXPLORE_LABELS),
        exclusion = exclusion,
        limit = limit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn politician(name: &str) -> Entity {
        Entity::new(name, EntityType::Politician)
    }

    fn input<'a>(
        step: StepType,
        pattern: Pattern,
        entities: &'a [Entity],
        relation: Option<EdgeType>,
        discovered: &'a [String],
        rows: &'a [Row],
    ) -> SynthesisInput<'a> {
        SynthesisInput {
            step,
            pattern,
            entities,
            best_relation: relation,
            discovered,
            previous_rows: rows,
            explored_relations: &[],
            hop: 1,
        }
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_born_at_binds_only_politician() {
        let entities = vec![politician("Nguyễn Văn A")];
        let discovered = vec!["Nguyễn Văn A".to_string()];
        let synth = QuerySynthesizer::default();

        let q = synth
            .synthesize(&input(
                StepType::Intent,
                Pattern::Simple,
                &entities,
                Some(EdgeType::BornAt),
                &discovered,
                &[],
            ))
            .unwrap();

        assert!(!q.degraded);
        assert_eq!(q.shape, ResultShape::Relation(EdgeType::BornAt));
        assert!(q.cypher.contains("MATCH (p:Politician)-[r:BORN_AT]->(t:Location)"));
        assert!(q.cypher.contains(r#"toLower(p.name) CONTAINS toLower("Nguyễn Văn A")"#));
        assert!(!q.cypher.contains("toLower(t.name)"));
        assert!(q.cypher.contains("t.name AS birth_place"));
        assert!(q.cypher.ends_with("LIMIT 5"));
    }

    #[test]
    fn test_relation_shapes() {
        let both = vec![politician("A"), Entity::new("Huân chương Sao Vàng", EntityType::Award)];
        let q = builder_for(EdgeType::Awarded)(&BuildContext {
            entities: &both,
            resolved_position_id: None,
        })
        .unwrap();
        assert!(q.contains("toLower(p.name)"));
        assert!(q.contains("toLower(t.name)"));
        assert!(q.ends_with("LIMIT 20"));

        let target_only = vec![Entity::new("Đại học Bách khoa", EntityType::AlmaMater)];
        let q = builder_for(EdgeType::AlumnusOf)(&BuildContext {
            entities: &target_only,
            resolved_position_id: None,
        })
        .unwrap();
        assert!(!q.contains("toLower(p.name)"));
        assert!(q.contains("t.name AS school_name"));
        assert!(q.ends_with("LIMIT 50"));

        let unrelated = vec![Entity::new("Hà Nội", EntityType::Location)];
        assert!(builder_for(EdgeType::HasRank)(&BuildContext {
            entities: &unrelated,
            resolved_position_id: None,
        })
        .is_none());
    }

    #[test]
    fn test_served_as_returns_term_columns() {
        let entities = vec![politician("A")];
        let q = builder_for(EdgeType::ServedAs)(&BuildContext {
            entities: &entities,
            resolved_position_id: None,
        })
        .unwrap();
        for column in ["term_start", "term_end", "status", "reason"] {
            assert!(q.contains(&format!("r.{} AS {}", column, column)));
        }
        assert!(q.contains("ORDER BY r.term_start ASC"));
    }

    #[test]
    fn test_succession_scoped_through_served_as() {
        let entities = vec![politician("A"), Entity::new("Chủ tịch", EntityType::Position)];
        let q = builder_for(EdgeType::Succeeded)(&BuildContext {
            entities: &entities,
            resolved_position_id: None,
        })
        .unwrap();

        assert!(q.contains("MATCH (p:Politician)-[:SERVED_AS]->(pos:Position)"));
        assert!(q.contains(r#"toLower(pos.name) CONTAINS toLower("Chủ tịch")"#));
        assert!(q.contains("(o:Politician)-[r:SUCCEEDED {position_id: pos.id}]->(p)"));
        assert!(q.contains("o.name AS successor"));
    }

    #[test]
    fn test_succession_with_resolved_position_id() {
        let entities = vec![politician("A")];
        let q = builder_for(EdgeType::Preceded)(&BuildContext {
            entities: &entities,
            resolved_position_id: Some("pos_7"),
        })
        .unwrap();

        assert!(q.contains(r#"(p)-[r:PRECEDED {position_id: "pos_7"}]->(o:Politician)"#));
        assert!(q.contains("o.name AS predecessor"));
    }

    #[test]
    fn test_unscoped_succession_falls_through_to_explore() {
        let entities = vec![politician("A")];
        let discovered = vec!["A".to_string()];
        let synth = QuerySynthesizer::default();

        for edge in [EdgeType::Succeeded, EdgeType::Preceded] {
            assert!(builder_for(edge)(&BuildContext {
                entities: &entities,
                resolved_position_id: None,
            })
            .is_none());

            let q = synth
                .synthesize(&input(
                    StepType::Intent,
                    Pattern::Chain,
                    &entities,
                    Some(edge),
                    &discovered,
                    &[],
                ))
                .unwrap();
            assert!(q.degraded);
            assert_eq!(q.shape, ResultShape::Explore);
            assert!(!q.cypher.contains(edge.as_str()));
        }
    }

    #[test]
    fn test_path_query_between_two_politicians() {
        let entities = vec![politician("A"), politician("B")];
        let discovered = vec!["A".to_string(), "B".to_string()];
        let q = QuerySynthesizer::default()
            .synthesize(&input(StepType::Path, Pattern::Path, &entities, None, &discovered, &[]))
            .unwrap();

        assert_eq!(q.shape, ResultShape::Path);
        assert!(q.cypher.contains("shortestPath((start)-[*1..4]-(end))"));
        assert!(q.cypher.contains(r#"toLower(start.name) CONTAINS toLower("A")"#));
        assert!(q.cypher.contains(r#"CONTAINS toLower("B")"#));
        assert!(q.cypher.contains("end:Politician OR end:Position OR end:Location OR end:AlmaMater"));
    }

    #[test]
    fn test_comparison_includes_all_anchors() {
        let entities = vec![politician("A"), politician("B"), politician("C")];
        let discovered: Vec<String> = vec![];
        let q = QuerySynthesizer::default()
            .synthesize(&input(
                StepType::Comparison,
                Pattern::Comparison,
                &entities,
                Some(EdgeType::Awarded),
                &discovered,
                &[],
            ))
            .unwrap();

        for name in ["A", "B", "C"] {
            assert!(q.cypher.contains(&format!("CONTAINS toLower(\"{}\")", name)));
        }
        assert!(q.cypher.contains("OPTIONAL MATCH (p)-[r:AWARDED]->(target)"));
        assert!(q.cypher.contains("total AS total_awarded"));

        assert!(build_comparison_query(&["A"], "birth_date", None).is_none());
        let plain = build_comparison_query(&["A", "B"], "birth_date", None).unwrap();
        assert!(plain.contains("p.birth_date AS birth_date"));
    }

    #[test]
    fn test_aggregation_modes() {
        let count = build_aggregation_query("A", EdgeType::Awarded, AggregationMode::Count);
        assert!(count.contains("count(target) AS total_awarded"));

        let list = build_aggregation_query("A", EdgeType::FoughtIn, AggregationMode::List);
        assert!(list.contains("AS fought_in_list"));
        assert!(list.contains("properties(r)"));
    }

    #[test]
    fn test_explore_uses_recent_discoveries() {
        let discovered: Vec<String> = ["E1", "E2", "E3", "E4"].iter().map(|s| s.to_string()).collect();
        let q = QuerySynthesizer::default()
            .synthesize(&input(StepType::Explore, Pattern::Explore, &[], None, &discovered, &[]))
            .unwrap();

        assert!(!q.degraded);
        assert!(!q.cypher.contains(r#"toLower("E1")"#));
        for name in ["E2", "E3", "E4"] {
            assert!(q.cypher.contains(&format!("toLower(\"{}\")", name)));
        }
        assert!(q.cypher.contains("MATCH path = (p)-[*1..2]-(connected)"));
        assert!(q.cypher.contains("LIMIT 15"));
    }

    #[test]
    fn test_explore_prefers_previous_hop_names() {
        let rows = vec![
            row(json!({"name": "Nguyễn Văn B", "birth_place": "Huế"})),
            row(json!({"source_entity": "Trần Văn C", "relation_types": ["AWARDED"]})),
            row(json!({"name": "Nguyễn Văn B"})),
        ];
        let discovered = vec!["Old".to_string()];
        let q = QuerySynthesizer::default()
            .synthesize(&input(StepType::Explore, Pattern::Simple, &[], None, &discovered, &rows))
            .unwrap();

        assert!(q.cypher.contains(r#"toLower("Nguyễn Văn B")"#));
        assert!(q.cypher.contains(r#"toLower("Trần Văn C")"#));
        assert!(!q.cypher.contains(r#"toLower("Old")"#));
    }

    #[test]
    fn test_nothing_to_anchor_yields_no_query() {
        let synth = QuerySynthesizer::default();
        assert!(synth
            .synthesize(&input(StepType::Explore, Pattern::Explore, &[], None, &[], &[]))
            .is_none());
        assert!(synth
            .synthesize(&input(StepType::Intent, Pattern::Simple, &[], Some(EdgeType::BornAt), &[], &[]))
            .is_none());
    }

    #[test]
    fn test_chain_continues_with_position_scope() {
        let entities = vec![politician("A"), Entity::new("Chủ tịch", EntityType::Position)];
        let rows = vec![row(json!({
            "name": "A",
            "successor": "B",
            "position_id": "pos_1",
            "position": "Chủ tịch"
        }))];
        let q = QuerySynthesizer::default()
            .synthesize(&SynthesisInput {
                hop: 2,
                ..input(
                    StepType::Explore,
                    Pattern::Chain,
                    &entities,
                    Some(EdgeType::Succeeded),
                    &[],
                    &rows,
                )
            })
            .unwrap();

        assert_eq!(q.shape, ResultShape::Chain);
        assert!(q.cypher.contains(r#"(n0)<-[r0:SUCCEEDED {position_id: "pos_1"}]-(n1)"#));
        assert!(q.cypher.contains(r#"toLower(n0.name) CONTAINS toLower("B")"#));
    }

    #[test]
    fn test_chain_query_requires_scope_for_succession() {
        let link = ChainLink {
            edge: EdgeType::Preceded,
            reverse: false,
        };
        assert!(build_chain_query("A", &[link], None, 2).is_none());
        assert!(build_chain_query("A", &[], Some("p"), 2).is_none());

        let served = ChainLink {
            edge: EdgeType::ServedAs,
            reverse: false,
        };
        let q = build_chain_query("A", &[link, served], Some("pos_9"), 2).unwrap();
        assert!(q.contains(r#"-[r0:PRECEDED {position_id: "pos_9"}]->(n1)-[r1:SERVED_AS]->(n2)"#));
        assert!(q.contains("n2.name AS node_2"));
        assert!(q.contains("type(r1) AS rel_1"));
    }

    #[test]
    fn test_explore_exclusion_only_accepts_vocabulary() {
        let anchors = vec!["A".to_string()];
        let excluded = vec!["AWARDED".to_string(), "x] DETACH DELETE n //".to_string()];
        let q = build_explore_query(&anchors, &excluded, 15).unwrap();
        assert!(q.contains("type(rel) IN ['AWARDED']"));
        assert!(!q.contains("DELETE"));
    }

    #[test]
    fn test_injection_is_escaped() {
        let entities = vec![politician(r#"A") DETACH DELETE p //"#)];
        let q = builder_for(EdgeType::BornAt)(&BuildContext {
            entities: &entities,
            resolved_position_id: None,
        })
        .unwrap();
        assert!(q.contains(r#"toLower("A\") DETACH DELETE p //")"#));
    }
}
