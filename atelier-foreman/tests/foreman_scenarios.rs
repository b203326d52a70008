//! End-to-end foreman behavior against an in-memory knowledge base.

use std::sync::Arc;

use atelier_core::{
    Action, CatalogBook, CatalogId, Commission, CommissionId, Formula, Input, KnowledgeBase,
    MemoryKnowledgeBase, Output, Sku,
};
use atelier_foreman::{DryRunExecutor, EvokeOutcome, Foreman, ProcessExecutor};
use rstest::rstest;

fn commission(id: &str, inputs: &[&str], outputs: &[&str]) -> Commission {
    let mut formula = Formula {
        action: Action {
            exec: vec!["build".into(), id.to_lowercase()],
            ..Action::default()
        },
        ..Formula::default()
    };
    for input in inputs {
        formula.inputs.insert(CatalogId::from(*input), Input::default());
    }
    for output in outputs {
        formula.outputs.insert(
            (*output).to_string(),
            Output {
                path: format!("/out/{output}"),
                packing: "tar".into(),
                sku: None,
            },
        );
    }
    Commission {
        id: CommissionId::from(id),
        formula,
    }
}

fn publish(kb: &MemoryKnowledgeBase, id: &str, hash: &str) {
    let book = kb
        .catalog(&CatalogId::from(id))
        .unwrap_or_else(|| CatalogBook::new(id));
    kb.publish_catalog(book.release("", Sku::new("tar", hash)))
        .expect("publish");
}

fn history(kb: &MemoryKnowledgeBase, id: &str) -> usize {
    kb.catalog(&CatalogId::from(id))
        .map(|book| book.all().len())
        .unwrap_or(0)
}

fn dry_run_foreman(kb: &Arc<MemoryKnowledgeBase>) -> Foreman {
    let mut foreman = Foreman::new(kb.clone(), Arc::new(DryRunExecutor));
    foreman.register();
    foreman
}

#[tokio::test]
async fn missing_dependency_stays_quiet_until_published() {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("D", &["A", "C"], &["x"]))
        .expect("D");
    publish(&kb, "A", "a1");

    let mut foreman = dry_run_foreman(&kb);
    let summary = foreman.drain().await.expect("drain");
    assert_eq!(summary.executed, 0);
    assert!(foreman.queue().is_empty());
    assert!(kb.catalog(&CatalogId::from("D::x")).is_none());

    kb.publish_catalog(CatalogBook::new("C")).expect("empty C");
    let summary = foreman.drain().await.expect("drain");
    assert_eq!(summary.notices, 1);
    assert_eq!(summary.executed, 0);

    publish(&kb, "C", "c1");
    let summary = foreman.drain().await.expect("drain");
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.released, vec![CatalogId::from("D::x")]);
}

#[tokio::test]
async fn newer_release_replaces_pending_plan() {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("B", &["A"], &["x"]))
        .expect("B");
    let mut foreman = dry_run_foreman(&kb);

    for hash in ["a1", "a2", "a3"] {
        publish(&kb, "A", hash);
    }
    while foreman.try_pump().expect("pump").is_some() {}

    assert_eq!(foreman.queue().len(), 1);
    let plan = foreman
        .queue()
        .pending_for(&CommissionId::from("B"))
        .expect("pending plan");
    assert_eq!(
        plan.formula.inputs[&CatalogId::from("A")].sku,
        Some(Sku::new("tar", "a3"))
    );
}

#[tokio::test]
async fn leased_plan_survives_newer_release() {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("D", &["A", "C"], &["x"]))
        .expect("D");
    let mut foreman = dry_run_foreman(&kb);
    publish(&kb, "A", "a1");
    publish(&kb, "C", "c1");
    while foreman.try_pump().expect("pump").is_some() {}
    assert_eq!(foreman.queue().len(), 1);

    let lease = foreman.queue_mut().lease_next().expect("lease");
    publish(&kb, "A", "a2");
    assert!(foreman.try_pump().expect("pump").is_some());

    assert_eq!(foreman.queue().len(), 2);
    assert_eq!(foreman.queue().leased(), 1);
    assert_eq!(foreman.queue().ready(), 1);
    let leased = foreman
        .queue()
        .iter()
        .find(|plan| plan.is_leased())
        .expect("leased plan");
    assert_eq!(leased.id, lease.plan.id);
    assert_eq!(
        leased.formula.inputs[&CatalogId::from("A")].sku,
        Some(Sku::new("tar", "a1"))
    );

    assert!(foreman.queue_mut().finish(lease.token));
    let pending = foreman
        .queue()
        .pending_for(&CommissionId::from("D"))
        .expect("pending");
    assert_eq!(
        pending.formula.inputs[&CatalogId::from("A")].sku,
        Some(Sku::new("tar", "a2"))
    );
}

#[tokio::test]
async fn releases_propagate_one_step_at_a_time() {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("B", &["A"], &["x"]))
        .expect("B");
    kb.publish_commission(commission("D", &["A", "C"], &["x", "y"]))
        .expect("D");
    kb.publish_commission(commission("E", &["B::x"], &["x"]))
        .expect("E");
    let mut foreman = dry_run_foreman(&kb);

    publish(&kb, "A", "a1");
    foreman.pump().await.expect("pump");
    assert_eq!(foreman.queue().len(), 1);
    assert!(foreman.queue().pending_for(&CommissionId::from("B")).is_some());
    foreman.evoke().await.expect("evoke B");
    assert_eq!(history(&kb, "B::x"), 1);

    foreman.pump().await.expect("pump");
    assert_eq!(foreman.queue().len(), 1);
    assert!(foreman.queue().pending_for(&CommissionId::from("E")).is_some());
    foreman.evoke().await.expect("evoke E");
    assert_eq!(history(&kb, "E::x"), 1);
    foreman.pump().await.expect("pump E::x");
    assert!(foreman.queue().is_empty());

    publish(&kb, "C", "c1");
    foreman.pump().await.expect("pump");
    assert_eq!(foreman.queue().len(), 1);
    assert!(foreman.queue().pending_for(&CommissionId::from("D")).is_some());
    match foreman.evoke().await.expect("evoke D") {
        EvokeOutcome::Released { catalogs, .. } => assert_eq!(
            catalogs,
            vec![CatalogId::from("D::x"), CatalogId::from("D::y")]
        ),
        other => panic!("expected release, got {other:?}"),
    }
    while foreman.try_pump().expect("pump").is_some() {}
    assert!(foreman.queue().is_empty());

    publish(&kb, "A", "a2");
    foreman.pump().await.expect("pump");
    assert_eq!(foreman.queue().ready(), 2);
}

#[tokio::test]
async fn fan_out_and_fan_in_follow_the_dependency_graph() {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("B", &["A"], &["x"]))
        .expect("B");
    kb.publish_commission(commission("D", &["A", "C"], &["x", "y"]))
        .expect("D");
    kb.publish_commission(commission("E", &["B::x"], &["x"]))
        .expect("E");
    publish(&kb, "A", "a1");
    publish(&kb, "C", "c1");

    let mut foreman = dry_run_foreman(&kb);
    let summary = foreman.drain().await.expect("first drain");
    assert_eq!(summary.failed, 0);
    for catalog in ["B::x", "D::x", "D::y", "E::x"] {
        assert_eq!(history(&kb, catalog), 1, "{catalog} released once");
    }

    publish(&kb, "A", "a2");
    assert!(foreman.try_pump().expect("pump").is_some());
    let ready: Vec<_> = foreman
        .queue()
        .iter()
        .map(|plan| plan.commission.0.clone())
        .collect();
    assert_eq!(ready, vec!["B", "D"]);

    foreman.drain().await.expect("second drain");
    for catalog in ["B::x", "D::x", "D::y", "E::x"] {
        assert_eq!(history(&kb, catalog), 2, "{catalog} released twice");
    }
    assert!(foreman.queue().is_empty());
}

#[rstest]
#[case::same_edition_republished(&["a1", "a1"])]
#[case::single_edition(&["a1"])]
#[tokio::test]
async fn identical_inputs_yield_identical_outputs(#[case] editions: &'static [&'static str]) {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    kb.publish_commission(commission("B", &["A"], &["x"]))
        .expect("B");
    let mut foreman = dry_run_foreman(&kb);

    for hash in editions {
        publish(&kb, "A", hash);
        foreman.drain().await.expect("drain");
    }

    let book = kb.catalog(&CatalogId::from("B::x")).expect("B::x");
    assert_eq!(book.all().len(), editions.len());
    assert!(book.all().windows(2).all(|pair| pair[0] == pair[1]));
}

#[cfg(unix)]
#[tokio::test]
async fn process_executor_releases_hashed_outputs() {
    let workspace = tempfile::TempDir::new().expect("workspace");
    let kb = Arc::new(MemoryKnowledgeBase::new());
    let mut formula = Formula {
        action: Action {
            exec: vec![
                "sh".into(),
                "-c".into(),
                "mkdir -p out && printf '%s' \"$ATELIER_INPUT_A\" > out/x.txt".into(),
            ],
            ..Action::default()
        },
        ..Formula::default()
    };
    formula.inputs.insert(CatalogId::from("A"), Input::default());
    formula.outputs.insert(
        "x".into(),
        Output {
            path: "/out/x.txt".into(),
            packing: "file".into(),
            sku: None,
        },
    );
    kb.publish_commission(Commission {
        id: CommissionId::from("B"),
        formula,
    })
    .expect("B");
    publish(&kb, "A", "a1");

    let mut foreman = Foreman::new(
        kb.clone(),
        Arc::new(ProcessExecutor::new(workspace.path())),
    );
    foreman.register();
    while foreman.try_pump().expect("pump").is_some() {}

    match foreman.evoke().await.expect("evoke") {
        EvokeOutcome::Released { catalogs, .. } => {
            assert_eq!(catalogs, vec![CatalogId::from("B::x")]);
        }
        other => panic!("expected release, got {other:?}"),
    }
    let released = kb.catalog(&CatalogId::from("B::x")).expect("B::x").latest();
    assert_eq!(released.packing, "file");
    assert!(released.hash.starts_with("sha256:"));
}

#[cfg(unix)]
#[tokio::test]
async fn process_failure_releases_nothing() {
    let workspace = tempfile::TempDir::new().expect("workspace");
    let kb = Arc::new(MemoryKnowledgeBase::new());
    let mut b = commission("B", &["A"], &["x"]);
    b.formula.action.exec = vec!["sh".into(), "-c".into(), "exit 3".into()];
    kb.publish_commission(b).expect("B");
    publish(&kb, "A", "a1");

    let mut foreman = Foreman::new(
        kb.clone(),
        Arc::new(ProcessExecutor::new(workspace.path())),
    );
    foreman.register();
    let summary = foreman.drain().await.expect("drain");
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.failed, 1);
    assert!(kb.catalog(&CatalogId::from("B::x")).is_none());
}
