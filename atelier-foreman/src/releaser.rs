//! Turns a completed execution into new catalog book editions.
//!
//! Every declared output of the executed plan releases into the catalog
//! `<commission>::<output>` on the default track, appending to whatever
//! history that catalog already has. The returned books are *not* published;
//! the caller decides when to publish them.

use atelier_core::{CatalogBook, CatalogId, Formula, KnowledgeBase, Sku, TrackName};

use crate::queue::Plan;

/// Build the next edition of every output catalog of `plan`.
///
/// `completed` is the completed-result view of `plan.formula`. Outputs
/// without a reported SKU are skipped.
pub fn release(kb: &dyn KnowledgeBase, plan: &Plan, completed: &Formula) -> Vec<CatalogBook> {
    let mut editions = Vec::with_capacity(completed.outputs.len());
    for (slot, output) in &completed.outputs {
        let Some(reported) = output.sku.as_ref().filter(|sku| !sku.is_zero()) else {
            tracing::warn!(
                commission = %plan.commission,
                output = %slot,
                "no hash reported for declared output; not released",
            );
            continue;
        };

        let target = CatalogId::for_output(&plan.commission, slot);
        let book = kb
            .catalog(&target)
            .unwrap_or_else(|| CatalogBook::new(target.clone()));
        let sku = Sku::new(output.packing.clone(), reported.hash.clone());
        editions.push(book.release(TrackName::default_track(), sku));
    }
    editions
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use atelier_core::{CommissionId, MemoryKnowledgeBase, Output};

    use super::*;

    fn plan_with_outputs(slots: &[&str]) -> Plan {
        let mut formula = Formula::default();
        for slot in slots {
            formula.outputs.insert(
                (*slot).to_string(),
                Output {
                    path: format!("/out/{slot}"),
                    packing: "tar".into(),
                    sku: None,
                },
            );
        }
        Plan::new(CommissionId::from("D"), formula)
    }

    fn results(pairs: &[(&str, &str)]) -> BTreeMap<String, Sku> {
        pairs
            .iter()
            .map(|(slot, hash)| ((*slot).to_string(), Sku::new("ignored", *hash)))
            .collect()
    }

    #[test]
    fn releases_every_output_into_fresh_catalogs() {
        let kb = MemoryKnowledgeBase::new();
        let plan = plan_with_outputs(&["x", "y"]);
        let completed = plan.formula.with_results(&results(&[("x", "hx"), ("y", "hy")]));

        let books = release(&kb, &plan, &completed);
        let ids: Vec<_> = books.iter().map(|b| b.id.0.clone()).collect();
        assert_eq!(ids, vec!["D::x", "D::y"]);
        assert_eq!(books[0].all(), &[Sku::new("tar", "hx")]);
        assert_eq!(books[1].latest(), Sku::new("tar", "hy"));
    }

    #[test]
    fn appends_to_existing_history_without_publishing() {
        let kb = MemoryKnowledgeBase::new();
        let prior = CatalogBook::new("D::x").release("", Sku::new("tar", "old"));
        kb.publish_catalog(prior).expect("publish");

        let plan = plan_with_outputs(&["x"]);
        let completed = plan.formula.with_results(&results(&[("x", "new")]));
        let books = release(&kb, &plan, &completed);

        assert_eq!(books[0].all().len(), 2);
        assert_eq!(books[0].latest(), Sku::new("tar", "new"));
        let stored = kb.catalog(&CatalogId::from("D::x")).expect("stored");
        assert_eq!(stored.all().len(), 1, "releaser must not publish");
    }

    #[test]
    fn skips_outputs_without_reported_hash() {
        let kb = MemoryKnowledgeBase::new();
        let plan = plan_with_outputs(&["x", "y"]);
        let completed = plan.formula.with_results(&results(&[("y", "hy")]));
        let books = release(&kb, &plan, &completed);
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, CatalogId::from("D::y"));
    }
}
