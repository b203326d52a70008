//! Formulas and commissions.
//!
//! A [`Commission`] carries a formula *template*: its inputs are keyed by the
//! catalog they bind to but carry no SKU. Filling a template binds every
//! input to that catalog's latest release, producing a formula that can be
//! handed to an executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{CatalogId, CommissionId, Sku};

/// One formula input, keyed in [`Formula::inputs`] by the catalog it binds to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Where the executor should place the input.
    #[serde(default)]
    pub path: String,
    /// Bound release. Absent in commission templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
}

/// The step to execute once all inputs are bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub exec: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// A declared output slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Path the executor collects the output from.
    pub path: String,
    /// Packing type recorded on the released SKU.
    #[serde(default = "default_packing")]
    pub packing: String,
    /// Reported result. Only set in a completed-result view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
}

fn default_packing() -> String {
    "tar".to_string()
}

/// Inputs, action and declared outputs of one build step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    #[serde(default)]
    pub inputs: BTreeMap<CatalogId, Input>,
    pub action: Action,
    #[serde(default)]
    pub outputs: BTreeMap<String, Output>,
}

impl Formula {
    /// True when every input carries a non-zero SKU.
    pub fn is_bound(&self) -> bool {
        self.inputs
            .values()
            .all(|input| input.sku.as_ref().is_some_and(|sku| !sku.is_zero()))
    }

    /// SHA-256 hex digest of the bound inputs, action and declared outputs.
    ///
    /// Reported output SKUs are ignored, so a formula and its completed-result
    /// view hash the same.
    pub fn setup_hash(&self) -> String {
        let mut setup = self.clone();
        for output in setup.outputs.values_mut() {
            output.sku = None;
        }
        // BTreeMap keys give a stable field order. Every map is keyed by a
        // string newtype, which serde_json always accepts.
        let canonical = serde_json::to_vec(&setup).expect("formula serializes to JSON");
        hex::encode(Sha256::digest(&canonical))
    }

    /// Completed-result view: this formula with each reported output SKU attached.
    ///
    /// Reported slots that the formula never declared are ignored.
    #[must_use]
    pub fn with_results(&self, results: &BTreeMap<String, Sku>) -> Formula {
        let mut completed = self.clone();
        for (name, output) in completed.outputs.iter_mut() {
            output.sku = results.get(name).cloned();
        }
        completed
    }
}

/// A standing request to rebuild a formula template whenever its inputs change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub formula: Formula,
}

impl Commission {
    /// Catalogs this commission declares as inputs.
    pub fn input_catalogs(&self) -> impl Iterator<Item = &CatalogId> {
        self.formula.inputs.keys()
    }

    /// True when one of the inputs is named exactly `catalog`.
    pub fn depends_on(&self, catalog: &CatalogId) -> bool {
        self.formula.inputs.contains_key(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Formula {
        let mut formula = Formula {
            action: Action {
                exec: vec!["make".into()],
                ..Action::default()
            },
            ..Formula::default()
        };
        formula.inputs.insert(
            CatalogId::from("apollo"),
            Input {
                path: "/src".into(),
                sku: None,
            },
        );
        formula.outputs.insert(
            "x".into(),
            Output {
                path: "/out".into(),
                packing: "tar".into(),
                sku: None,
            },
        );
        formula
    }

    #[test]
    fn setup_hash_covers_formula_contents() {
        let empty_digest = hex::encode(Sha256::digest(b""));
        assert_ne!(Formula::default().setup_hash(), empty_digest);
        assert_ne!(template().setup_hash(), empty_digest);
        assert_ne!(template().setup_hash(), Formula::default().setup_hash());
    }

    #[test]
    fn template_is_not_bound() {
        assert!(!template().is_bound());
    }

    #[test]
    fn zero_sku_does_not_count_as_bound() {
        let mut formula = template();
        formula.inputs.get_mut(&CatalogId::from("apollo")).unwrap().sku = Some(Sku::default());
        assert!(!formula.is_bound());
    }

    #[test]
    fn setup_hash_ignores_reported_outputs() {
        let formula = template();
        let mut results = BTreeMap::new();
        results.insert("x".to_string(), Sku::new("tar", "out1"));
        let completed = formula.with_results(&results);
        assert_eq!(
            completed.outputs["x"].sku,
            Some(Sku::new("tar", "out1"))
        );
        assert_eq!(formula.setup_hash(), completed.setup_hash());
    }

    #[test]
    fn setup_hash_changes_with_bound_input() {
        let mut a = template();
        let mut b = template();
        a.inputs.get_mut(&CatalogId::from("apollo")).unwrap().sku = Some(Sku::new("tar", "1"));
        b.inputs.get_mut(&CatalogId::from("apollo")).unwrap().sku = Some(Sku::new("tar", "2"));
        assert_ne!(a.setup_hash(), b.setup_hash());
    }

    #[test]
    fn with_results_ignores_undeclared_slots() {
        let mut results = BTreeMap::new();
        results.insert("nope".to_string(), Sku::new("tar", "z"));
        let completed = template().with_results(&results);
        assert_eq!(completed.outputs.len(), 1);
        assert!(completed.outputs["x"].sku.is_none());
    }

    #[test]
    fn commission_yaml_defaults_packing() {
        let yaml = "id: build-b\nformula:\n  inputs:\n    apollo:\n      path: /src\n  action:\n    exec: [make]\n  outputs:\n    x:\n      path: /out\n";
        let commission: Commission = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(commission.formula.outputs["x"].packing, "tar");
        assert!(commission.depends_on(&CatalogId::from("apollo")));
        assert!(!commission.depends_on(&CatalogId::from("apollo::x")));
    }
}
