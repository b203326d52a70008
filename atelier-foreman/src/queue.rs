//! Plan queue: pending and leased work items.
//!
//! Four structures are kept consistent after every operation:
//!
//! 1. `queue`: FIFO of plan ids. Positions reflect arrival or replacement
//!    order and are never resorted.
//! 2. `commission_index`: commission → its single queued, *unleased* plan.
//! 3. `leases_index`: live lease token → the plan it was issued for.
//! 4. At most one unleased queue entry per commission. A leased run and a
//!    newer pending run for the same commission may coexist.
//!
//! The queue is not internally synchronized. It is owned by the single task
//! alternating pump and evoke.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use uuid::Uuid;

use atelier_core::{CommissionId, Formula};

/// Unique identity of one plan, minted at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanId(Uuid);

impl PlanId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Token proving ownership of a leased plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A fully bound formula queued on behalf of a commission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: PlanId,
    pub commission: CommissionId,
    pub formula: Formula,
    lease: Option<LeaseToken>,
}

impl Plan {
    pub fn new(commission: CommissionId, formula: Formula) -> Self {
        Self {
            id: PlanId::new(),
            commission,
            formula,
            lease: None,
        }
    }

    pub fn lease(&self) -> Option<LeaseToken> {
        self.lease
    }

    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }
}

/// A plan handed out by [`PlanQueue::lease_next`].
#[derive(Debug, Clone)]
pub struct Lease {
    pub token: LeaseToken,
    pub plan: Plan,
}

#[derive(Debug, Default)]
pub struct PlanQueue {
    queue: VecDeque<PlanId>,
    plans: HashMap<PlanId, Plan>,
    commission_index: HashMap<CommissionId, PlanId>,
    leases_index: HashMap<LeaseToken, PlanId>,
}

impl PlanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `plan`, replacing the commission's unleased entry in place if
    /// there is one, otherwise appending it.
    pub fn push(&mut self, mut plan: Plan) {
        plan.lease = None;
        let commission = plan.commission.clone();
        let id = plan.id;

        match self.commission_index.get(&commission).copied() {
            Some(replaced) => {
                let pos = self.position(replaced);
                self.queue[pos] = id;
                self.plans.remove(&replaced);
                tracing::debug!(commission = %commission, plan = %id, replaced = %replaced, "plan replaced");
            }
            None => {
                self.queue.push_back(id);
                tracing::debug!(commission = %commission, plan = %id, "plan queued");
            }
        }
        self.commission_index.insert(commission, id);
        self.plans.insert(id, plan);
        self.debug_check();
    }

    /// Lease the oldest unleased plan, if any.
    pub fn lease_next(&mut self) -> Option<Lease> {
        let id = self
            .queue
            .iter()
            .copied()
            .find(|id| self.plans.get(id).is_some_and(|plan| !plan.is_leased()))?;

        let token = LeaseToken::new();
        let plan = self.plans.get_mut(&id)?;
        plan.lease = Some(token);
        let plan = plan.clone();

        self.leases_index.insert(token, id);
        // A push arriving while this lease is live now appends a fresh entry.
        self.commission_index.remove(&plan.commission);
        tracing::debug!(commission = %plan.commission, plan = %id, lease = %token, "plan leased");
        self.debug_check();
        Some(Lease { token, plan })
    }

    /// Return a leased plan to idle at its original position.
    ///
    /// If a newer plan for the same commission arrived while leased, the newer
    /// plan takes over this slot and its own later entry is dropped, the same
    /// way [`PlanQueue::push`] replaces in place. Unknown tokens are a no-op.
    pub fn unlease(&mut self, token: LeaseToken) -> bool {
        let Some(id) = self.leases_index.remove(&token) else {
            return false;
        };
        let Some(plan) = self.plans.get_mut(&id) else {
            invariant_violation("leased plan missing from plan table");
        };
        plan.lease = None;
        let commission = plan.commission.clone();

        match self.commission_index.get(&commission).copied() {
            None => {
                self.commission_index.insert(commission.clone(), id);
            }
            Some(newer) => {
                let newer_pos = self.position(newer);
                self.queue.remove(newer_pos);
                let pos = self.position(id);
                self.queue[pos] = newer;
                self.plans.remove(&id);
            }
        }
        tracing::debug!(commission = %commission, plan = %id, lease = %token, "lease returned");
        self.debug_check();
        true
    }

    /// Remove a leased plan permanently. Unknown tokens are a no-op.
    pub fn finish(&mut self, token: LeaseToken) -> bool {
        let Some(id) = self.leases_index.remove(&token) else {
            return false;
        };
        let pos = self.position(id);
        self.queue.remove(pos);
        let Some(plan) = self.plans.remove(&id) else {
            invariant_violation("finished plan missing from plan table");
        };
        if self.commission_index.get(&plan.commission) == Some(&id) {
            self.commission_index.remove(&plan.commission);
        }
        tracing::debug!(commission = %plan.commission, plan = %id, lease = %token, "plan finished");
        self.debug_check();
        true
    }

    /// Total queue entries, leased or not.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of live leases.
    pub fn leased(&self) -> usize {
        self.leases_index.len()
    }

    /// Number of entries ready to lease.
    pub fn ready(&self) -> usize {
        self.queue.len() - self.leases_index.len()
    }

    /// The commission's queued unleased plan, if any.
    pub fn pending_for(&self, commission: &CommissionId) -> Option<&Plan> {
        self.commission_index
            .get(commission)
            .and_then(|id| self.plans.get(id))
    }

    /// Plans in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.queue.iter().filter_map(|id| self.plans.get(id))
    }

    /// Verify all four queue invariants, describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for id in &self.queue {
            if !seen.insert(*id) {
                return Err(format!("plan {id} queued twice"));
            }
            if !self.plans.contains_key(id) {
                return Err(format!("queued plan {id} missing from plan table"));
            }
        }
        if self.plans.len() != self.queue.len() {
            return Err(format!(
                "{} plans stored but {} queued",
                self.plans.len(),
                self.queue.len()
            ));
        }

        for (commission, id) in &self.commission_index {
            let Some(plan) = self.plans.get(id) else {
                return Err(format!("commission index for {commission} points at missing plan {id}"));
            };
            if &plan.commission != commission {
                return Err(format!("commission index for {commission} points at plan of {}", plan.commission));
            }
            if plan.is_leased() {
                return Err(format!("commission index for {commission} points at leased plan {id}"));
            }
        }

        for (token, id) in &self.leases_index {
            match self.plans.get(id) {
                Some(plan) if plan.lease == Some(*token) => {}
                Some(_) => return Err(format!("lease {token} does not match plan {id}")),
                None => return Err(format!("lease {token} points at missing plan {id}")),
            }
        }

        let mut unleased = HashSet::new();
        for plan in self.plans.values() {
            match plan.lease {
                Some(token) if self.leases_index.get(&token) != Some(&plan.id) => {
                    return Err(format!("plan {} leased under unknown token {token}", plan.id));
                }
                Some(_) => {}
                None => {
                    if !unleased.insert(plan.commission.clone()) {
                        return Err(format!("commission {} has two unleased plans", plan.commission));
                    }
                    if self.commission_index.get(&plan.commission) != Some(&plan.id) {
                        return Err(format!("unleased plan {} is not indexed", plan.id));
                    }
                }
            }
        }
        Ok(())
    }

    fn position(&self, id: PlanId) -> usize {
        match self.queue.iter().position(|queued| *queued == id) {
            Some(pos) => pos,
            None => invariant_violation("indexed plan missing from queue"),
        }
    }

    fn debug_check(&self) {
        #[cfg(debug_assertions)]
        if let Err(violation) = self.check_invariants() {
            invariant_violation(&violation);
        }
    }
}

fn invariant_violation(what: &str) -> ! {
    panic!("plan queue invariant violated: {what}")
}
