//! Canonical graph model: the entity/relation tuples the normalizer emits
//! and the writer persists.
//!
//! Nodes are addressed by `(kind, identity)` — identity strings, never row
//! ids — so a not-yet-indexed target is representable as a `pending`
//! placeholder without special-casing nulls. Typed attribute structs
//! serialize into the store's JSON attrs column.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The three node labels of the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Package,
    Entity,
    Template,
}

impl NodeKind {
    /// Stable label stored in the `kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Entity => "entity",
            Self::Template => "template",
        }
    }

    /// Parse a stored label back into the enum.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package" => Some(Self::Package),
            "entity" => Some(Self::Entity),
            "template" => Some(Self::Template),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed relationship labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Package → Package, from declared dependency lists.
    DependsOn,
    /// Entity → Entity, classic extension (may be multiple, order-preserving).
    Extends,
    /// Entity → Entity, composition-style forwarding.
    Delegates,
    /// Entity/Template → Package ownership.
    OwnedBy,
    /// Template → Entity model binding.
    BoundTo,
    /// Template → Template extension.
    ExtendsTemplate,
}

impl EdgeKind {
    /// Stable label stored in the `kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "DEPENDS_ON",
            Self::Extends => "EXTENDS",
            Self::Delegates => "DELEGATES",
            Self::OwnedBy => "OWNED_BY",
            Self::BoundTo => "BOUND_TO",
            Self::ExtendsTemplate => "EXTENDS_TEMPLATE",
        }
    }

    /// Parse a stored label back into the enum.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPENDS_ON" => Some(Self::DependsOn),
            "EXTENDS" => Some(Self::Extends),
            "DELEGATES" => Some(Self::Delegates),
            "OWNED_BY" => Some(Self::OwnedBy),
            "BOUND_TO" => Some(Self::BoundTo),
            "EXTENDS_TEMPLATE" => Some(Self::ExtendsTemplate),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node references and payloads
// ---------------------------------------------------------------------------

/// Identity-based node address. Two refs are the same node iff kind and
/// identity match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub identity: String,
}

impl NodeRef {
    #[must_use]
    pub fn new(kind: NodeKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
        }
    }

    #[must_use]
    pub fn package(identity: impl Into<String>) -> Self {
        Self::new(NodeKind::Package, identity)
    }

    #[must_use]
    pub fn entity(identity: impl Into<String>) -> Self {
        Self::new(NodeKind::Entity, identity)
    }

    #[must_use]
    pub fn template(identity: impl Into<String>) -> Self {
        Self::new(NodeKind::Template, identity)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identity)
    }
}

/// Best-effort static type of a declared field.
///
/// Completeness of the field set is preferred over type precision: a field
/// whose value cannot be classified is kept with `Unknown`, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "name", rename_all = "snake_case")]
pub enum TypeTag {
    Known(String),
    Unknown,
}

/// A captured field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub type_tag: TypeTag,
}

/// Attributes persisted on a Package node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageAttrs {
    pub version: String,
    /// Declared dependency names in declaration order.
    pub dependencies: Vec<String>,
    pub installable: bool,
    pub source_path: String,
}

/// Attributes persisted on an Entity-Definition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAttrs {
    pub owning_package: String,
    pub source_path: String,
    pub fields: Vec<FieldDef>,
    /// True when the unit both declares a new identity and lists parents.
    pub redefinition: bool,
}

/// Attributes persisted on a Template-Record node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateAttrs {
    pub owning_package: String,
    pub source_path: String,
    pub bound_entity: Option<String>,
    pub record_kind: String,
}

// ---------------------------------------------------------------------------
// Canonical tuples (normalizer output, writer input)
// ---------------------------------------------------------------------------

/// One node to upsert, with fully serialized attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalNode {
    pub node: NodeRef,
    /// JSON attrs blob; shape depends on `node.kind`.
    pub attrs: serde_json::Value,
    /// Content fingerprint of the source unit this node came from.
    pub fingerprint: String,
    /// When true the writer skips this node (ephemeral definitions are
    /// normalized for diagnostics but kept out of the persisted graph).
    pub excluded_from_load: bool,
}

/// One directed edge to upsert, merged on `(src, dst, kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEdge {
    pub src: NodeRef,
    pub dst: NodeRef,
    pub kind: EdgeKind,
    /// Declaration-order tie-break for multi-parent traversal; 0 for edge
    /// kinds where order is meaningless.
    pub ordinal: i64,
    pub excluded_from_load: bool,
}

// ---------------------------------------------------------------------------
// Read-side shapes (two-stage access)
// ---------------------------------------------------------------------------

/// Lightweight node handle returned by list queries. Full attributes are
/// fetched on demand via `GraphStore::find_node`; there is no hidden cache
/// in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub kind: NodeKind,
    pub identity: String,
    /// True for placeholder rows awaiting their real definition.
    pub pending: bool,
}

/// Fully populated node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullNode {
    pub descriptor: NodeDescriptor,
    pub attrs: serde_json::Value,
    pub fingerprint: Option<String>,
    pub last_indexed_us: i64,
}
