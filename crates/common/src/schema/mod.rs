//! Graph schema - closed node/edge vocabulary of the politician graph
//!
//! Label, relationship and property names here are the literal names used
//! by the populated store and must not change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property key scoping a succession edge to one office
pub const POSITION_ID: &str = "position_id";

/// Entity / node label vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Politician,
    Position,
    Location,
    Award,
    AlmaMater,
    MilitaryRank,
    MilitaryCareer,
    Campaigns,
    AcademicTitle,
}

/// Node labels in the store are exactly the entity types
pub type NodeLabel = EntityType;

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Politician,
        EntityType::Position,
        EntityType::Location,
        EntityType::Award,
        EntityType::AlmaMater,
        EntityType::MilitaryRank,
        EntityType::MilitaryCareer,
        EntityType::Campaigns,
        EntityType::AcademicTitle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Politician => "Politician",
            EntityType::Position => "Position",
            EntityType::Location => "Location",
            EntityType::Award => "Award",
            EntityType::AlmaMater => "AlmaMater",
            EntityType::MilitaryRank => "MilitaryRank",
            EntityType::MilitaryCareer => "MilitaryCareer",
            EntityType::Campaigns => "Campaigns",
            EntityType::AcademicTitle => "AcademicTitle",
        }
    }

    /// Parse a label name. Anything outside the vocabulary is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship type vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    BornAt,
    DiedAt,
    ServedAs,
    Succeeded,
    Preceded,
    AlumnusOf,
    Awarded,
    ServedIn,
    HasRank,
    FoughtIn,
    HasAcademicTitle,
}

impl EdgeType {
    pub const ALL: [EdgeType; 11] = [
        EdgeType::BornAt,
        EdgeType::DiedAt,
        EdgeType::ServedAs,
        EdgeType::Succeeded,
        EdgeType::Preceded,
        EdgeType::AlumnusOf,
        EdgeType::Awarded,
        EdgeType::ServedIn,
        EdgeType::HasRank,
        EdgeType::FoughtIn,
        EdgeType::HasAcademicTitle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::BornAt => "BORN_AT",
            EdgeType::DiedAt => "DIED_AT",
            EdgeType::ServedAs => "SERVED_AS",
            EdgeType::Succeeded => "SUCCEEDED",
            EdgeType::Preceded => "PRECEDED",
            EdgeType::AlumnusOf => "ALUMNUS_OF",
            EdgeType::Awarded => "AWARDED",
            EdgeType::ServedIn => "SERVED_IN",
            EdgeType::HasRank => "HAS_RANK",
            EdgeType::FoughtIn => "FOUGHT_IN",
            EdgeType::HasAcademicTitle => "HAS_ACADEMIC_TITLE",
        }
    }

    /// Parse a relationship name, case-insensitively. `UNKNOWN` and any
    /// other name outside the vocabulary yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    /// Label at the tail of the edge
    pub fn source_label(&self) -> NodeLabel {
        EntityType::Politician
    }

    /// Label at the head of the edge
    pub fn target_label(&self) -> NodeLabel {
        match self {
            EdgeType::BornAt | EdgeType::DiedAt => EntityType::Location,
            EdgeType::ServedAs => EntityType::Position,
            EdgeType::Succeeded | EdgeType::Preceded => EntityType::Politician,
            EdgeType::AlumnusOf => EntityType::AlmaMater,
            EdgeType::Awarded => EntityType::Award,
            EdgeType::ServedIn => EntityType::MilitaryCareer,
            EdgeType::HasRank => EntityType::MilitaryRank,
            EdgeType::FoughtIn => EntityType::Campaigns,
            EdgeType::HasAcademicTitle => EntityType::AcademicTitle,
        }
    }

    /// Succession edges are only meaningful relative to one position
    pub fn is_succession(&self) -> bool {
        matches!(self, EdgeType::Succeeded | EdgeType::Preceded)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity extracted upstream from the user's question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl Entity {
    pub fn new(text: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            text: text.into(),
            entity_type,
        }
    }
}

/// Node as stored in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: NodeLabel,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl GraphNode {
    /// Fuzzy name match used by every generated query
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Relationship as stored in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl GraphEdge {
    pub fn position_id(&self) -> Option<&str> {
        self.properties.get(POSITION_ID).and_then(|v| v.as_str())
    }

    /// Succession edges without a position scope are not traversable
    pub fn is_valid_for_chain(&self) -> bool {
        !self.edge_type.is_succession() || self.position_id().is_some()
    }
}

/// Labels an exploration may land on
pub const EXPLORE_LABELS: [NodeLabel; 5] = [
    EntityType::Politician,
    EntityType::Position,
    EntityType::Location,
    EntityType::AlmaMater,
    EntityType::Award,
];

/// Labels a shortest-path query may end on
pub const PATH_END_LABELS: [NodeLabel; 4] = [
    EntityType::Politician,
    EntityType::Position,
    EntityType::Location,
    EntityType::AlmaMater,
];

/// Escape a display string for a double-quoted Cypher literal
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

/// `toLower(<var>.<prop>) CONTAINS toLower("<value>")`
pub fn name_contains(var: &str, value: &str) -> String {
    format!(
        "toLower({}.name) CONTAINS toLower(\"{}\")",
        var,
        escape(value)
    )
}

/// `<var>:A OR <var>:B ...`
pub fn label_predicate(var: &str, labels: &[NodeLabel]) -> String {
    labels
        .iter()
        .map(|l| format!("{}:{}", var, l))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_parse() {
        assert_eq!(EdgeType::parse("born_at"), Some(EdgeType::BornAt));
        assert_eq!(EdgeType::parse(" SUCCEEDED "), Some(EdgeType::Succeeded));
        assert_eq!(EdgeType::parse("UNKNOWN"), None);
        assert_eq!(EdgeType::parse("MARRIED_TO"), None);
    }

    #[test]
    fn test_entity_type_roundtrip_names() {
        for t in EntityType::ALL {
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntityType::parse("Spaceship"), None);
    }

    #[test]
    fn test_entity_json_shape() {
        let e: Entity =
            serde_json::from_str(r#"{"text":"Hà Nội","type":"Location"}"#).unwrap();
        assert_eq!(e.entity_type, EntityType::Location);
        assert!(serde_json::from_str::<Entity>(r#"{"text":"x","type":"Ship"}"#).is_err());
    }

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape(r#"Lê "Văn" A"#), r#"Lê \"Văn\" A"#);
        assert_eq!(escape(r"a\b"), r"a\\b");
        assert_eq!(escape("a\nb"), "a\\nb");
    }

    #[test]
    fn test_name_contains_predicate() {
        assert_eq!(
            name_contains("p", "Tô Lâm"),
            r#"toLower(p.name) CONTAINS toLower("Tô Lâm")"#
        );
    }

    #[test]
    fn test_succession_edge_requires_position_scope() {
        let mut edge = GraphEdge {
            from: "p1".into(),
            to: "p2".into(),
            edge_type: EdgeType::Succeeded,
            properties: BTreeMap::new(),
        };
        assert!(!edge.is_valid_for_chain());

        edge.properties
            .insert(POSITION_ID.into(), serde_json::json!("pos_42"));
        assert_eq!(edge.position_id(), Some("pos_42"));
        assert!(edge.is_valid_for_chain());

        let born = GraphEdge {
            edge_type: EdgeType::BornAt,
            properties: BTreeMap::new(),
            ..edge
        };
        assert!(born.is_valid_for_chain());
    }

    #[test]
    fn test_node_fuzzy_match() {
        let node = GraphNode {
            id: "n1".into(),
            label: EntityType::Politician,
            name: "Nguyễn Văn A".into(),
            properties: BTreeMap::new(),
        };
        assert!(node.name_contains("văn a"));
        assert!(!node.name_contains("Trần"));
    }
}
