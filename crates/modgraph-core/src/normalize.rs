//! Fact Normalizer: raw extraction records → canonical entities/relations.
//!
//! One raw fact yields zero or more nodes and edges plus diagnostics. A
//! malformed record produces a diagnostic and zero entities, never an error
//! that aborts the batch.
//!
//! # Identity rules
//!
//! - A package's identity is its manifest name; dotted names are rejected
//!   (package names carry no internal separators).
//! - An entity's identity is its declared identity, or — identity adoption —
//!   the first entry of its declared-parent list when no explicit identity
//!   exists. A unit with neither is rejected with `NoIdentity`.
//! - A template's identity is its declared id, qualified with the owning
//!   package when unqualified.
//!
//! # Resolver context
//!
//! Cross-reference resolution (bare template extension refs, transient
//! binding checks) reads a [`ResolverContext`] that is built per run and
//! passed in explicitly. There is no module-level cache; the context dies
//! with the run.

use std::collections::{HashMap, HashSet};

use crate::error::{Diagnostic, ErrorCode};
use crate::facts::{EntityFact, ManifestFact, RawFact, TemplateFact};
use crate::model::{
    CanonicalEdge, CanonicalNode, EdgeKind, EntityAttrs, FieldDef, NodeRef, PackageAttrs,
    TemplateAttrs, TypeTag,
};

// ---------------------------------------------------------------------------
// Resolver context
// ---------------------------------------------------------------------------

/// Per-run resolution state: which packages declare which template local
/// ids, and which entity identities are transient. Built as facts stream
/// through and discarded at run end.
#[derive(Debug, Default)]
pub struct ResolverContext {
    /// template local id → packages that declare it.
    template_packages: HashMap<String, HashSet<String>>,
    /// Entity identities tagged ephemeral this run.
    transient_entities: HashSet<String>,
}

impl ResolverContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a template declaration for later bare-ref resolution.
    pub fn note_template(&mut self, package: &str, local_id: &str) {
        self.template_packages
            .entry(local_id.to_string())
            .or_default()
            .insert(package.to_string());
    }

    /// Record an entity identity, remembering whether it is transient.
    pub fn note_entity(&mut self, identity: &str, transient: bool) {
        if transient {
            self.transient_entities.insert(identity.to_string());
        }
    }

    /// True when the named entity was seen as transient this run.
    #[must_use]
    pub fn is_transient(&self, identity: &str) -> bool {
        self.transient_entities.contains(identity)
    }

    /// Number of distinct packages declaring `local_id`.
    #[must_use]
    pub fn packages_declaring(&self, local_id: &str) -> usize {
        self.template_packages
            .get(local_id)
            .map_or(0, HashSet::len)
    }

    /// The single declaring package for `local_id`, when unambiguous.
    #[must_use]
    pub fn sole_package_of(&self, local_id: &str) -> Option<&str> {
        let set = self.template_packages.get(local_id)?;
        if set.len() == 1 {
            set.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer output
// ---------------------------------------------------------------------------

/// Canonical output for one unit.
#[derive(Debug, Default)]
pub struct NormalizedUnit {
    pub nodes: Vec<CanonicalNode>,
    pub edges: Vec<CanonicalEdge>,
    pub diagnostics: Vec<Diagnostic>,
    /// One-line extraction summary stored in the change store.
    pub summary: String,
}

impl NormalizedUnit {
    /// True when the unit contributed nothing loadable to the graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    fn rejected(diag: Diagnostic) -> Self {
        Self {
            summary: "rejected".to_string(),
            diagnostics: vec![diag],
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Stateless per-fact transformation plus the per-run [`ResolverContext`].
#[derive(Debug, Default)]
pub struct Normalizer {
    ctx: ResolverContext,
}

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the normalizer at run end, returning its context (useful for
    /// end-of-run reporting).
    #[must_use]
    pub fn into_context(self) -> ResolverContext {
        self.ctx
    }

    /// Seed the resolver context from a fact without producing output.
    ///
    /// The pipeline runs this over every extracted fact before normalizing
    /// any of them, so bare-reference resolution and ephemeral exclusion do
    /// not depend on the order units happen to be processed in.
    pub fn observe(&mut self, fact: &RawFact) {
        match fact {
            RawFact::Entity(e) => {
                if let Some(identity) = e
                    .declared_identity
                    .as_deref()
                    .or_else(|| e.parent_refs.first().map(String::as_str))
                {
                    self.ctx.note_entity(identity, e.transient);
                }
            }
            RawFact::Template(t) => {
                if let Some(declared) = &t.declared_id {
                    // A qualified id lives in its qualifier's namespace even
                    // when declared by another package.
                    match declared.split_once('.') {
                        Some((package, local)) => self.ctx.note_template(package, local),
                        None => self.ctx.note_template(&t.owning_package, declared),
                    }
                }
            }
            RawFact::Manifest(_) => {}
        }
    }

    /// Normalize one raw fact into canonical tuples.
    pub fn normalize(&mut self, fact: &RawFact, fingerprint: &str) -> NormalizedUnit {
        match fact {
            RawFact::Manifest(m) => Self::normalize_manifest(m, fingerprint),
            RawFact::Entity(e) => self.normalize_entity(e, fingerprint),
            RawFact::Template(t) => self.normalize_template(t, fingerprint),
        }
    }

    fn normalize_manifest(fact: &ManifestFact, fingerprint: &str) -> NormalizedUnit {
        if fact.name.is_empty() || fact.name.contains('.') {
            return NormalizedUnit::rejected(Diagnostic::new(
                ErrorCode::ParseError,
                &fact.unit_path,
                format!("invalid package name {:?}", fact.name),
            ));
        }

        let mut unit = NormalizedUnit::default();
        let node = NodeRef::package(&fact.name);

        let attrs = PackageAttrs {
            version: fact.version.clone(),
            dependencies: fact.dependencies.clone(),
            installable: fact.installable,
            source_path: fact.unit_path.clone(),
        };
        unit.nodes.push(CanonicalNode {
            node: node.clone(),
            attrs: attrs_value(&attrs),
            fingerprint: fingerprint.to_string(),
            excluded_from_load: false,
        });

        for (ordinal, dep) in fact.dependencies.iter().enumerate() {
            unit.edges.push(CanonicalEdge {
                src: node.clone(),
                dst: NodeRef::package(dep),
                kind: EdgeKind::DependsOn,
                ordinal: as_ordinal(ordinal),
                excluded_from_load: false,
            });
        }

        unit.summary = format!(
            "package {} ({} deps)",
            fact.name,
            fact.dependencies.len()
        );
        unit
    }

    fn normalize_entity(&mut self, fact: &EntityFact, fingerprint: &str) -> NormalizedUnit {
        // Identity adoption: a unit that only extends an existing identity
        // adopts the first parent reference as its own.
        let Some(identity) = fact
            .declared_identity
            .clone()
            .or_else(|| fact.parent_refs.first().cloned())
        else {
            return NormalizedUnit::rejected(Diagnostic::new(
                ErrorCode::NoIdentity,
                &fact.unit_path,
                "no declared identity and no parent refs",
            ));
        };

        self.ctx.note_entity(&identity, fact.transient);

        let mut unit = NormalizedUnit::default();
        let node = NodeRef::entity(&identity);
        let excluded = fact.transient;
        if excluded {
            tracing::debug!(
                identity,
                unit = fact.unit_path,
                "ephemeral entity excluded from load"
            );
        }

        let redefinition = fact.declared_identity.is_some() && !fact.parent_refs.is_empty();

        let fields: Vec<FieldDef> = fact
            .fields
            .iter()
            .map(|f| FieldDef {
                name: f.name.clone(),
                type_tag: f
                    .type_tag
                    .clone()
                    .map_or(TypeTag::Unknown, TypeTag::Known),
            })
            .collect();

        let attrs = EntityAttrs {
            owning_package: fact.owning_package.clone(),
            source_path: fact.unit_path.clone(),
            fields,
            redefinition,
        };
        unit.nodes.push(CanonicalNode {
            node: node.clone(),
            attrs: attrs_value(&attrs),
            fingerprint: fingerprint.to_string(),
            excluded_from_load: excluded,
        });

        unit.edges.push(CanonicalEdge {
            src: node.clone(),
            dst: NodeRef::package(&fact.owning_package),
            kind: EdgeKind::OwnedBy,
            ordinal: 0,
            excluded_from_load: excluded,
        });

        // Parent refs equal to the unit's own identity (always the first ref
        // under identity adoption) would self-loop; they carry no extension
        // information and are skipped.
        let mut ordinal = 0_i64;
        for parent in &fact.parent_refs {
            if *parent == identity {
                continue;
            }
            unit.edges.push(CanonicalEdge {
                src: node.clone(),
                dst: NodeRef::entity(parent),
                kind: EdgeKind::Extends,
                ordinal,
                excluded_from_load: excluded,
            });
            ordinal += 1;
        }

        for (idx, delegate) in fact.delegate_refs.iter().enumerate() {
            unit.edges.push(CanonicalEdge {
                src: node.clone(),
                dst: NodeRef::entity(delegate),
                kind: EdgeKind::Delegates,
                ordinal: as_ordinal(idx),
                excluded_from_load: excluded,
            });
        }

        unit.summary = format!("entity {} ({} fields)", identity, fact.fields.len());
        unit
    }

    fn normalize_template(&mut self, fact: &TemplateFact, fingerprint: &str) -> NormalizedUnit {
        let Some(declared) = fact.declared_id.clone() else {
            return NormalizedUnit::rejected(Diagnostic::new(
                ErrorCode::NoIdentity,
                &fact.unit_path,
                "template record declares no identifier",
            ));
        };

        // Unqualified record ids live in the owning package's namespace; a
        // qualified id lives in its qualifier's, wherever it was declared.
        let identity = if declared.contains('.') {
            declared.clone()
        } else {
            format!("{}.{declared}", fact.owning_package)
        };
        match declared.split_once('.') {
            Some((package, local)) => self.ctx.note_template(package, local),
            None => self.ctx.note_template(&fact.owning_package, &declared),
        }

        let mut unit = NormalizedUnit::default();
        let node = NodeRef::template(&identity);

        // Records bound to an ephemeral entity stay out of the persisted
        // graph but are still normalized for diagnostics.
        let excluded = fact
            .bound_entity
            .as_deref()
            .is_some_and(|e| self.ctx.is_transient(e));
        if excluded {
            tracing::debug!(
                identity,
                unit = fact.unit_path,
                "template bound to ephemeral entity excluded from load"
            );
        }

        let attrs = TemplateAttrs {
            owning_package: fact.owning_package.clone(),
            source_path: fact.unit_path.clone(),
            bound_entity: fact.bound_entity.clone(),
            record_kind: fact.record_kind.clone(),
        };
        unit.nodes.push(CanonicalNode {
            node: node.clone(),
            attrs: attrs_value(&attrs),
            fingerprint: fingerprint.to_string(),
            excluded_from_load: excluded,
        });

        unit.edges.push(CanonicalEdge {
            src: node.clone(),
            dst: NodeRef::package(&fact.owning_package),
            kind: EdgeKind::OwnedBy,
            ordinal: 0,
            excluded_from_load: excluded,
        });

        if let Some(bound) = &fact.bound_entity {
            // No existence check here; the writer materializes a placeholder
            // when the entity is not in the graph yet.
            unit.edges.push(CanonicalEdge {
                src: node.clone(),
                dst: NodeRef::entity(bound),
                kind: EdgeKind::BoundTo,
                ordinal: 0,
                excluded_from_load: excluded,
            });
        }

        if let Some(ext) = &fact.extends_ref {
            let (target, diag) = self.resolve_extension_ref(fact, ext);
            if let Some(diag) = diag {
                unit.diagnostics.push(diag);
            }
            unit.edges.push(CanonicalEdge {
                src: node.clone(),
                dst: NodeRef::template(target),
                kind: EdgeKind::ExtendsTemplate,
                ordinal: 0,
                excluded_from_load: excluded,
            });
        }

        unit.summary = format!("template {identity} ({})", fact.record_kind);
        unit
    }

    /// Resolve a template extension reference to a qualified identity.
    ///
    /// `<package>.<local-id>` is taken as-is. A bare `<local-id>` resolves
    /// within the record's own package first, then globally when exactly one
    /// package declares it; a multi-package match is flagged
    /// `ambiguous-local` and the own package stands as first guess.
    fn resolve_extension_ref(
        &self,
        fact: &TemplateFact,
        ext: &str,
    ) -> (String, Option<Diagnostic>) {
        if let Some((package, local)) = ext.split_once('.') {
            return (format!("{package}.{local}"), None);
        }

        let own = format!("{}.{ext}", fact.owning_package);
        match self.ctx.packages_declaring(ext) {
            0 | 1 if self.ctx.sole_package_of(ext).is_some_and(|p| p != fact.owning_package) => {
                // Unique elsewhere: resolve globally by identifier uniqueness.
                let package = self.ctx.sole_package_of(ext).unwrap_or(&fact.owning_package);
                (format!("{package}.{ext}"), None)
            }
            0 | 1 => (own, None),
            _ => (
                own.clone(),
                Some(Diagnostic::new(
                    ErrorCode::AmbiguousLocalRef,
                    &fact.unit_path,
                    format!(
                        "bare reference {ext:?} matches templates in multiple packages; \
                         assuming {own}"
                    ),
                )),
            ),
        }
    }
}

fn attrs_value<T: serde::Serialize>(attrs: &T) -> serde_json::Value {
    // Attr structs contain only maps/strings/bools; serialization is total.
    serde_json::to_value(attrs).unwrap_or(serde_json::Value::Null)
}

fn as_ordinal(idx: usize) -> i64 {
    i64::try_from(idx).unwrap_or(i64::MAX)
}
