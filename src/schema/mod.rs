//! # Schema Registry
//!
//! The closed vehicle-auction graph schema: node kinds with the single
//! property each exposes for read-back, and relationship kinds with their
//! fixed direction. This is the source of truth for the prompt compiler
//! and for query validation.

use std::sync::LazyLock;

/// A node label and the one property a query may read back from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKind {
    pub label: &'static str,
    pub property: &'static str,
    /// Price-bearing kinds expose `amount` only.
    pub is_price: bool,
    /// Human description used in the prompt.
    pub description: &'static str,
}

/// A relationship type with its fixed source and target labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipKind {
    pub rel_type: &'static str,
    pub source: &'static str,
    pub target: &'static str,
}

impl RelationshipKind {
    /// `(:Source)-[:TYPE]->(:Target)`
    pub fn path(&self) -> String {
        format!("(:{})-[:{}]->(:{})", self.source, self.rel_type, self.target)
    }
}

/// Read-only view over the node and relationship kinds.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    nodes: Vec<NodeKind>,
    relationships: Vec<RelationshipKind>,
}

const fn node(label: &'static str, property: &'static str, description: &'static str) -> NodeKind {
    NodeKind { label, property, is_price: false, description }
}

const fn price(label: &'static str, description: &'static str) -> NodeKind {
    NodeKind { label, property: "amount", is_price: true, description }
}

const fn rel(source: &'static str, rel_type: &'static str, target: &'static str) -> RelationshipKind {
    RelationshipKind { rel_type, source, target }
}

const AUCTION_NODES: &[NodeKind] = &[
    node("Name", "name", "vehicle model"),
    node("Make", "name", "manufacturer"),
    node("CC", "value", "engine displacement"),
    node("Year", "value", "model year"),
    node("Kilometers", "value", "odometer reading"),
    node("LotNumber", "lot_number", "auction lot"),
    node("Place", "name", "auction location"),
    price("StartPrice", "starting price"),
    price("MinPrice", "predicted minimum bid"),
    price("MaxPrice", "predicted maximum bid"),
];

// Same edges, same directions, as the creation template writes them.
const AUCTION_RELATIONSHIPS: &[RelationshipKind] = &[
    rel("Name", "HAS_CC", "CC"),
    rel("CC", "BELONGS_TO", "Name"),
    rel("Make", "MANUFACTURES", "Name"),
    rel("Name", "HAS_YEAR", "Year"),
    rel("Year", "YEAR_OF", "Name"),
    rel("Name", "HAS_KM", "Kilometers"),
    rel("Kilometers", "KILOMETERS_OF", "Name"),
    rel("LotNumber", "HAS_PLACE", "Place"),
    rel("Place", "LOCATION_OF", "LotNumber"),
    rel("LotNumber", "ASSIGNED_TO", "Name"),
    rel("Name", "HAS_LOT", "LotNumber"),
    rel("LotNumber", "HAS_START_PRICE", "StartPrice"),
    rel("StartPrice", "START_PRICE_OF", "LotNumber"),
    rel("MinPrice", "BID_MIN", "LotNumber"),
    rel("MinPrice", "BELONGS_TO_LOT", "LotNumber"),
    rel("MaxPrice", "BID_MAX", "LotNumber"),
    rel("MaxPrice", "BELONGS_TO_LOT", "LotNumber"),
];

static AUTO_AUCTION: LazyLock<SchemaRegistry> = LazyLock::new(|| SchemaRegistry {
    nodes: AUCTION_NODES.to_vec(),
    relationships: AUCTION_RELATIONSHIPS.to_vec(),
});

impl SchemaRegistry {
    /// The built-in vehicle auction schema.
    pub fn auto_auction() -> &'static SchemaRegistry {
        &AUTO_AUCTION
    }

    pub fn nodes(&self) -> &[NodeKind] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[RelationshipKind] {
        &self.relationships
    }

    pub fn node(&self, label: &str) -> Option<&NodeKind> {
        self.nodes.iter().find(|n| n.label == label)
    }

    /// The property a query may read back from `label`.
    pub fn return_property(&self, label: &str) -> Option<&'static str> {
        self.node(label).map(|n| n.property)
    }

    /// All kinds sharing a relationship type (`BELONGS_TO_LOT` has two).
    pub fn relationship(&self, rel_type: &str) -> impl Iterator<Item = &RelationshipKind> {
        self.relationships.iter().filter(move |r| r.rel_type == rel_type)
    }

    pub fn has_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship(rel_type).next().is_some()
    }

    /// Whether `(:source)-[:rel_type]->(:target)` is legal. `None` labels
    /// are unknown and match any endpoint.
    pub fn allows(&self, source: Option<&str>, rel_type: &str, target: Option<&str>) -> bool {
        self.relationship(rel_type).any(|r| {
            source.is_none_or(|s| s == r.source) && target.is_none_or(|t| t == r.target)
        })
    }

    /// Every relationship rendered as a path, one per line.
    pub fn paths(&self) -> Vec<String> {
        self.relationships.iter().map(RelationshipKind::path).collect()
    }
}
