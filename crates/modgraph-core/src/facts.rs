//! Raw extraction records handed over by the external per-file parsers.
//!
//! The parsers themselves (manifest, class-like source, UI-template) are
//! collaborators outside this crate; what crosses the boundary is one flat
//! fact record per source unit. Facts arrive as JSON lines — one object per
//! line, tagged by `kind` — and a malformed line yields a per-line error,
//! never an abort of the whole stream.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fact records
// ---------------------------------------------------------------------------

/// Manifest of a package (namespace unit): name, version, declared deps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFact {
    pub unit_path: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Declared dependency names, order-preserving, may be empty.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_true")]
    pub installable: bool,
}

/// A class-like definition extracted from one source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFact {
    pub unit_path: String,
    pub owning_package: String,
    /// Explicit dotted identity, if the unit declares one.
    #[serde(default)]
    pub declared_identity: Option<String>,
    /// Classic extension targets, declaration order preserved.
    #[serde(default)]
    pub parent_refs: Vec<String>,
    /// Composition-style forwarding targets.
    #[serde(default)]
    pub delegate_refs: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldFact>,
    /// True for ephemeral (session-scoped) definitions. These are normalized
    /// but excluded from the persisted graph.
    #[serde(default)]
    pub transient: bool,
}

/// One declared field on an entity definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFact {
    pub name: String,
    /// Best-effort static type tag; absent when the value could not be
    /// classified.
    #[serde(default)]
    pub type_tag: Option<String>,
}

/// A UI-template record extracted from one definition unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFact {
    pub unit_path: String,
    pub owning_package: String,
    /// Declared record identifier; may be unqualified.
    #[serde(default)]
    pub declared_id: Option<String>,
    /// Name of the entity definition the record is bound to, if any.
    #[serde(default)]
    pub bound_entity: Option<String>,
    /// Cross-reference to the template this one extends, as
    /// `<package>.<local-id>` or a bare `<local-id>`.
    #[serde(default)]
    pub extends_ref: Option<String>,
    /// Record kind tag (form, tree, kanban, search, ...).
    pub record_kind: String,
}

/// Tagged union over the three fact kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawFact {
    Manifest(ManifestFact),
    Entity(EntityFact),
    Template(TemplateFact),
}

impl RawFact {
    /// Path of the source unit this fact was extracted from.
    #[must_use]
    pub fn unit_path(&self) -> &str {
        match self {
            Self::Manifest(m) => &m.unit_path,
            Self::Entity(e) => &e.unit_path,
            Self::Template(t) => &t.unit_path,
        }
    }

    /// True for package manifests. The orchestrator prefers processing these
    /// first to keep placeholder counts down.
    #[must_use]
    pub const fn is_manifest(&self) -> bool {
        matches!(self, Self::Manifest(_))
    }
}

const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// JSONL ingestion
// ---------------------------------------------------------------------------

/// Parse a JSONL fact stream.
///
/// Blank lines and `#` comments are skipped. Each remaining line decodes to
/// one [`RawFact`]; lines that fail to decode are returned separately as
/// `(line_number, error_message)` so one bad record never blocks the rest.
#[must_use]
pub fn parse_fact_lines(content: &str) -> (Vec<RawFact>, Vec<(usize, String)>) {
    let mut facts = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<RawFact>(trimmed) {
            Ok(fact) => facts.push(fact),
            Err(e) => errors.push((line_num, e.to_string())),
        }
    }

    (facts, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_fact_decodes_with_defaults() {
        let (facts, errors) = parse_fact_lines(
            r#"{"kind":"manifest","unit_path":"sale/manifest.toml","name":"sale"}"#,
        );
        assert!(errors.is_empty());
        match &facts[0] {
            RawFact::Manifest(m) => {
                assert_eq!(m.name, "sale");
                assert!(m.installable);
                assert!(m.dependencies.is_empty());
            }
            other => panic!("wrong fact kind: {other:?}"),
        }
    }

    #[test]
    fn entity_fact_decodes_fields_and_parents() {
        let line = r#"{"kind":"entity","unit_path":"sale/models/order.py","owning_package":"sale","declared_identity":"sale.order","parent_refs":["mail.thread"],"fields":[{"name":"partner_id","type_tag":"many2one"},{"name":"note"}]}"#;
        let (facts, errors) = parse_fact_lines(line);
        assert!(errors.is_empty());
        match &facts[0] {
            RawFact::Entity(e) => {
                assert_eq!(e.declared_identity.as_deref(), Some("sale.order"));
                assert_eq!(e.parent_refs, vec!["mail.thread"]);
                assert_eq!(e.fields[1].type_tag, None);
                assert!(!e.transient);
            }
            other => panic!("wrong fact kind: {other:?}"),
        }
    }

    #[test]
    fn bad_lines_are_collected_not_fatal() {
        let content = "\n# comment\n{not json}\n{\"kind\":\"template\",\"unit_path\":\"sale/views/order.xml\",\"owning_package\":\"sale\",\"record_kind\":\"form\"}\n";
        let (facts, errors) = parse_fact_lines(content);
        assert_eq!(facts.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 3);
    }

    #[test]
    fn unit_path_dispatches_by_kind() {
        let fact = RawFact::Template(TemplateFact {
            unit_path: "web/views/base.xml".into(),
            owning_package: "web".into(),
            declared_id: Some("layout".into()),
            bound_entity: None,
            extends_ref: None,
            record_kind: "qweb".into(),
        });
        assert_eq!(fact.unit_path(), "web/views/base.xml");
        assert!(!fact.is_manifest());
    }
}
