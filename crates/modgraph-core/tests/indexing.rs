//! End-to-end pipeline tests: fact stream in, queryable graph out.
//!
//! Covers the invariants the engine is built around: idempotent re-runs,
//! fingerprint-driven skipping, forward-reference reconciliation across
//! batch boundaries, ephemeral exclusion, and the query surface over a
//! realistic multi-package scenario.

use std::sync::Arc;

use modgraph_core::config::IndexConfig;
use modgraph_core::graph::RelationGraph;
use modgraph_core::graph::cycles::find_all_cycles;
use modgraph_core::model::NodeKind;
use modgraph_core::query::{dependency_closure, inheritance_chain};
use modgraph_core::{ChangeStore, ErrorCode, GraphStore, IndexPipeline, JsonlFactSource, RunReport};

const SALE_FACTS: &str = r#"
# manifests
{"kind":"manifest","unit_path":"sale/manifest.toml","name":"sale","version":"1.2","dependencies":["product","account"]}
{"kind":"manifest","unit_path":"product/manifest.toml","name":"product","version":"1.0","dependencies":["uom"]}
{"kind":"manifest","unit_path":"account/manifest.toml","name":"account","version":"1.0","dependencies":["uom"]}
{"kind":"manifest","unit_path":"uom/manifest.toml","name":"uom","version":"1.0","dependencies":[]}
{"kind":"manifest","unit_path":"mail/manifest.toml","name":"mail","version":"1.0","dependencies":[]}
# entities
{"kind":"entity","unit_path":"sale/models/order.py","owning_package":"sale","declared_identity":"sale.order","parent_refs":["mail.thread"],"delegate_refs":[],"fields":[{"name":"partner_id","type_tag":"many2one"},{"name":"note"}],"transient":false}
{"kind":"entity","unit_path":"mail/models/thread.py","owning_package":"mail","declared_identity":"mail.thread","parent_refs":[],"delegate_refs":[],"fields":[],"transient":false}
# templates
{"kind":"template","unit_path":"sale/views/order_views.xml","owning_package":"sale","declared_id":"view_order_form","bound_entity":"sale.order","record_kind":"form"}
"#;

fn run(
    graph: &mut GraphStore,
    changes: &ChangeStore,
    config: &IndexConfig,
    content: &str,
    force_full: bool,
) -> RunReport {
    let source = Arc::new(JsonlFactSource::parse("facts.jsonl", content));
    IndexPipeline::new(graph, changes, config)
        .force_full(force_full)
        .run(&source)
        .expect("pipeline run")
}

fn node_edge_counts(graph: &GraphStore) -> (i64, i64) {
    let nodes = graph
        .conn()
        .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
        .expect("count nodes");
    let edges = graph
        .conn()
        .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
        .expect("count edges");
    (nodes, edges)
}

#[test]
fn sale_scenario_builds_expected_graph() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let report = run(&mut graph, &changes, &IndexConfig::default(), SALE_FACTS, false);

    assert_eq!(report.units_failed, 0);
    assert_eq!(report.dangling, 0);

    let closure = dependency_closure(&graph, "sale", None)
        .expect("closure")
        .expect("sale exists");
    let names: Vec<&str> = closure.iter().map(|e| e.identity.as_str()).collect();
    assert_eq!(names, ["product", "account", "uom"]);

    let chain = inheritance_chain(&graph, "sale.order")
        .expect("chain")
        .expect("entity exists");
    assert_eq!(chain, ["sale.order", "mail.thread"]);

    let sale = graph
        .find_node(NodeKind::Package, "sale")
        .expect("query")
        .expect("node");
    assert_eq!(sale.attrs["version"], "1.2");
    assert_eq!(sale.attrs["installable"], true);

    let order = graph
        .find_node(NodeKind::Entity, "sale.order")
        .expect("query")
        .expect("node");
    assert_eq!(order.attrs["owning_package"], "sale");
    assert_eq!(order.attrs["redefinition"], true);
    // Untagged field keeps an explicit unknown marker.
    assert_eq!(order.attrs["fields"][1]["type_tag"]["tag"], "unknown");

    let view = graph
        .find_node(NodeKind::Template, "sale.view_order_form")
        .expect("query")
        .expect("node");
    assert_eq!(view.attrs["record_kind"], "form");
}

#[test]
fn rerun_is_idempotent_at_the_row_level() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let config = IndexConfig::default();

    run(&mut graph, &changes, &config, SALE_FACTS, false);
    let first = node_edge_counts(&graph);

    // Forced rewrite of identical content merges onto the same rows.
    run(&mut graph, &changes, &config, SALE_FACTS, true);
    assert_eq!(node_edge_counts(&graph), first);

    // Fingerprint-driven run touches nothing at all.
    let report = run(&mut graph, &changes, &config, SALE_FACTS, false);
    assert_eq!(report.units_indexed, 0);
    assert_eq!(report.nodes_written, 0);
    assert_eq!(node_edge_counts(&graph), first);
}

#[test]
fn forward_references_reconcile_across_single_item_batches() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    // One item per transaction: every cross-unit edge lands before at least
    // one of its endpoints' real definitions.
    let config = IndexConfig {
        batch_size: 1,
        ..IndexConfig::default()
    };

    let report = run(&mut graph, &changes, &config, SALE_FACTS, false);
    assert_eq!(report.units_failed, 0);
    assert_eq!(report.dangling, 0);
    assert!(graph.pending_nodes().expect("pending").is_empty());

    // Same graph as the default batch size would produce.
    let mut reference = GraphStore::open_in_memory().expect("graph");
    let reference_changes = ChangeStore::open_in_memory().expect("changes");
    run(
        &mut reference,
        &reference_changes,
        &IndexConfig::default(),
        SALE_FACTS,
        false,
    );
    assert_eq!(node_edge_counts(&graph), node_edge_counts(&reference));
}

#[test]
fn ephemeral_definitions_stay_out_of_the_graph() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let facts = r#"
{"kind":"manifest","unit_path":"sale/manifest.toml","name":"sale","version":"1.0","dependencies":[]}
{"kind":"entity","unit_path":"sale/wizard/make_invoice.py","owning_package":"sale","declared_identity":"sale.advance.payment.inv","parent_refs":[],"delegate_refs":[],"fields":[],"transient":true}
{"kind":"template","unit_path":"sale/wizard/make_invoice_views.xml","owning_package":"sale","declared_id":"view_make_invoice","bound_entity":"sale.advance.payment.inv","record_kind":"form"}
"#;
    let report = run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    assert_eq!(report.units_failed, 0);
    assert!(
        graph
            .find_node(NodeKind::Entity, "sale.advance.payment.inv")
            .expect("query")
            .is_none()
    );
    assert!(
        graph
            .find_node(NodeKind::Template, "sale.view_make_invoice")
            .expect("query")
            .is_none()
    );
    // The excluded definitions leave no placeholders behind either.
    assert_eq!(report.dangling, 0);
    // But their units are tracked: the next run skips them.
    let second = run(&mut graph, &changes, &IndexConfig::default(), facts, false);
    assert_eq!(second.units_skipped, 3);
}

#[test]
fn delegation_joins_the_inheritance_chain_and_cycle_scan() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let facts = r#"
{"kind":"manifest","unit_path":"base/manifest.toml","name":"base","version":"1.0","dependencies":[]}
{"kind":"entity","unit_path":"base/models/users.py","owning_package":"base","declared_identity":"res.users","parent_refs":[],"delegate_refs":["res.partner"],"fields":[],"transient":false}
{"kind":"entity","unit_path":"base/models/partner.py","owning_package":"base","declared_identity":"res.partner","parent_refs":[],"delegate_refs":[],"fields":[],"transient":false}
"#;
    run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    let chain = inheritance_chain(&graph, "res.users")
        .expect("chain")
        .expect("entity exists");
    assert_eq!(chain, ["res.users", "res.partner"]);

    let inheritance = RelationGraph::inheritance(&graph).expect("snapshot");
    assert!(find_all_cycles(&inheritance).is_empty());
}

#[test]
fn inheritance_cycle_is_found_exactly_once() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let facts = r#"
{"kind":"manifest","unit_path":"m/manifest.toml","name":"m","version":"1.0","dependencies":[]}
{"kind":"entity","unit_path":"m/models/a.py","owning_package":"m","declared_identity":"m.a","parent_refs":["m.b"],"delegate_refs":[],"fields":[],"transient":false}
{"kind":"entity","unit_path":"m/models/b.py","owning_package":"m","declared_identity":"m.b","parent_refs":["m.c"],"delegate_refs":[],"fields":[],"transient":false}
{"kind":"entity","unit_path":"m/models/c.py","owning_package":"m","declared_identity":"m.c","parent_refs":["m.a"],"delegate_refs":[],"fields":[],"transient":false}
"#;
    run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    let inheritance = RelationGraph::inheritance(&graph).expect("snapshot");
    let findings = find_all_cycles(&inheritance);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].path, ["m.a", "m.b", "m.c", "m.a"]);
}

#[test]
fn identity_is_adopted_from_extension_target() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    // sale_stock extends sale.order without declaring its own identity.
    let facts = r#"
{"kind":"manifest","unit_path":"sale/manifest.toml","name":"sale","version":"1.0","dependencies":[]}
{"kind":"manifest","unit_path":"sale_stock/manifest.toml","name":"sale_stock","version":"1.0","dependencies":["sale"]}
{"kind":"entity","unit_path":"sale/models/order.py","owning_package":"sale","declared_identity":"sale.order","parent_refs":[],"delegate_refs":[],"fields":[],"transient":false}
{"kind":"entity","unit_path":"sale_stock/models/order.py","owning_package":"sale_stock","parent_refs":["sale.order"],"delegate_refs":[],"fields":[{"name":"warehouse_id","type_tag":"many2one"}],"transient":false}
"#;
    let report = run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    assert_eq!(report.units_failed, 0);
    assert!(
        !report
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::NoIdentity.code())
    );
    // Both units merged into one node; the entity node count is 1.
    let entities: i64 = graph
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM nodes WHERE kind = 'entity' AND pending = 0",
            [],
            |row| row.get(0),
        )
        .expect("count entities");
    assert_eq!(entities, 1);
}

#[test]
fn missing_identity_is_rejected_with_diagnostic() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let facts = r#"
{"kind":"manifest","unit_path":"broken/manifest.toml","name":"broken","version":"1.0","dependencies":[]}
{"kind":"entity","unit_path":"broken/models/orphan.py","owning_package":"broken","parent_refs":[],"delegate_refs":[],"fields":[],"transient":false}
"#;
    let report = run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::NoIdentity.code())
    );
    let entities: i64 = graph
        .conn()
        .query_row("SELECT COUNT(*) FROM nodes WHERE kind = 'entity'", [], |row| {
            row.get(0)
        })
        .expect("count entities");
    assert_eq!(entities, 0);
}

#[test]
fn dangling_template_extension_warns_and_leaves_placeholder() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    let facts = r#"
{"kind":"manifest","unit_path":"sale/manifest.toml","name":"sale","version":"1.0","dependencies":[]}
{"kind":"template","unit_path":"sale/views/order_ext.xml","owning_package":"sale","declared_id":"view_order_ext","extends_ref":"unknownpkg.unknown_view","record_kind":"form"}
"#;
    let report = run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    // Not a failure: the edge lands against a placeholder target.
    assert_eq!(report.units_failed, 0);
    assert_eq!(report.dangling, 1);
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.detail.contains("unknownpkg.unknown_view"))
    );

    let target = graph
        .find_node(NodeKind::Template, "unknownpkg.unknown_view")
        .expect("query")
        .expect("placeholder exists");
    assert!(target.descriptor.pending);

    let edges: i64 = graph
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM edges
             WHERE kind = 'EXTENDS_TEMPLATE' AND dst_identity = 'unknownpkg.unknown_view'",
            [],
            |row| row.get(0),
        )
        .expect("count extension edges");
    assert_eq!(edges, 1);
}

#[test]
fn ambiguous_bare_template_reference_is_flagged() {
    let mut graph = GraphStore::open_in_memory().expect("graph");
    let changes = ChangeStore::open_in_memory().expect("changes");
    // Two packages declare `view_form`; a third extends the bare name.
    let facts = r#"
{"kind":"manifest","unit_path":"a/manifest.toml","name":"a","version":"1.0","dependencies":[]}
{"kind":"manifest","unit_path":"b/manifest.toml","name":"b","version":"1.0","dependencies":[]}
{"kind":"manifest","unit_path":"c/manifest.toml","name":"c","version":"1.0","dependencies":["a","b"]}
{"kind":"template","unit_path":"a/views/form.xml","owning_package":"a","declared_id":"view_form","record_kind":"form"}
{"kind":"template","unit_path":"b/views/form.xml","owning_package":"b","declared_id":"view_form","record_kind":"form"}
{"kind":"template","unit_path":"c/views/form.xml","owning_package":"c","declared_id":"view_form_ext","extends_ref":"view_form","record_kind":"form"}
"#;
    let report = run(&mut graph, &changes, &IndexConfig::default(), facts, false);

    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.code == ErrorCode::AmbiguousLocalRef.code()
                && d.unit == "c/views/form.xml")
    );
}

#[test]
fn state_survives_store_reopen() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let graph_path = dir.path().join("graph.db");
    let state_path = dir.path().join("state.db");
    let config = IndexConfig::default();

    {
        let mut graph = GraphStore::open(&graph_path).expect("graph");
        let changes = ChangeStore::open(&state_path).expect("changes");
        run(&mut graph, &changes, &config, SALE_FACTS, false);
    }

    let mut graph = GraphStore::open(&graph_path).expect("reopen graph");
    let changes = ChangeStore::open(&state_path).expect("reopen changes");

    let chain = inheritance_chain(&graph, "sale.order")
        .expect("chain")
        .expect("entity exists");
    assert_eq!(chain, ["sale.order", "mail.thread"]);

    let report = run(&mut graph, &changes, &config, SALE_FACTS, false);
    assert_eq!(report.units_indexed, 0);
    assert_eq!(report.units_skipped, report.units_seen);
}
