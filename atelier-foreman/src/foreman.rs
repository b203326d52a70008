//! The foreman: turns catalog changes into executions and executions into
//! new catalog releases.
//!
//! ```text
//! register ── subscribe to catalog + commission publishes, seed backlog
//!    │
//!    ▼
//! pump ────── take one notice → mark commissions → fill → push plans
//!    │
//!    ▼
//! evoke ───── lease oldest plan → execute → finish → release → publish
//! ```
//!
//! Fill always re-reads each input's current latest release, never a value
//! implied by the notice, so stale or duplicated notices are harmless.

use std::slice;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use atelier_core::{CatalogId, Commission, CommissionId, Formula, KnowledgeBase};

use crate::error::ForemanError;
use crate::executor::{Executor, JobId, RunRecord};
use crate::queue::{LeaseToken, Plan, PlanQueue};
use crate::releaser;

/// One unit of work consumed by [`Foreman::pump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A catalog was published (or existed at registration).
    Catalog(CatalogId),
    /// A commission was published after registration.
    Commission(CommissionId),
}

/// What a single [`Foreman::evoke`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvokeOutcome {
    /// Nothing was ready to lease.
    Idle,
    /// The plan ran. `catalogs` were published; `unpublished` are editions
    /// the knowledge base refused to store.
    Released {
        commission: CommissionId,
        job: JobId,
        catalogs: Vec<CatalogId>,
        unpublished: Vec<CatalogId>,
    },
    /// The plan ran (or failed to start) and produced no release.
    Failed {
        commission: CommissionId,
        job: JobId,
        error: String,
    },
}

/// Totals from [`Foreman::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub notices: usize,
    pub executed: usize,
    pub failed: usize,
    pub released: Vec<CatalogId>,
    pub unpublished: Vec<CatalogId>,
}

struct Sources {
    catalogs: mpsc::UnboundedReceiver<CatalogId>,
    commissions: mpsc::UnboundedReceiver<CommissionId>,
    backlog: mpsc::UnboundedReceiver<CatalogId>,
}

pub struct Foreman {
    kb: Arc<dyn KnowledgeBase>,
    executor: Arc<dyn Executor>,
    queue: PlanQueue,
    sources: Option<Sources>,
}

impl Foreman {
    pub fn new(kb: Arc<dyn KnowledgeBase>, executor: Arc<dyn Executor>) -> Self {
        Self {
            kb,
            executor,
            queue: PlanQueue::new(),
            sources: None,
        }
    }

    /// Subscribe to future publishes and queue every existing catalog as backlog.
    ///
    /// Subscribing happens before listing so a publish racing with
    /// registration is seen at least once. Calling `register` again replaces
    /// the previous subscriptions.
    pub fn register(&mut self) {
        let (catalog_tx, catalogs) = mpsc::unbounded_channel();
        let (commission_tx, commissions) = mpsc::unbounded_channel();
        self.kb.observe_catalogs(catalog_tx);
        self.kb.observe_commissions(commission_tx);

        let (backlog_tx, backlog) = mpsc::unbounded_channel();
        let existing = self.kb.list_catalogs();
        tracing::info!(backlog = existing.len(), "foreman registered");
        for id in existing {
            // The receiver is alive in this scope.
            let _ = backlog_tx.send(id);
        }

        self.sources = Some(Sources {
            catalogs,
            commissions,
            backlog,
        });
    }

    /// Wait for one notice from any source and plan for it.
    ///
    /// Returns `Ok(None)` once every source is closed.
    pub async fn pump(&mut self) -> Result<Option<Notice>, ForemanError> {
        let sources = self.sources.as_mut().ok_or(ForemanError::NotRegistered)?;
        let notice = tokio::select! {
            Some(id) = sources.catalogs.recv() => Notice::Catalog(id),
            Some(id) = sources.backlog.recv() => Notice::Catalog(id),
            Some(id) = sources.commissions.recv() => Notice::Commission(id),
            else => return Ok(None),
        };
        self.handle(&notice);
        Ok(Some(notice))
    }

    /// Plan for one notice if one is already waiting; never blocks.
    pub fn try_pump(&mut self) -> Result<Option<Notice>, ForemanError> {
        let sources = self.sources.as_mut().ok_or(ForemanError::NotRegistered)?;
        let notice = if let Ok(id) = sources.backlog.try_recv() {
            Notice::Catalog(id)
        } else if let Ok(id) = sources.catalogs.try_recv() {
            Notice::Catalog(id)
        } else if let Ok(id) = sources.commissions.try_recv() {
            Notice::Commission(id)
        } else {
            return Ok(None);
        };
        self.handle(&notice);
        Ok(Some(notice))
    }

    /// Lease the oldest ready plan, execute it, and publish its releases.
    ///
    /// The lease is returned to the queue if this future is dropped before
    /// the execution finishes. Editions are published one by one: an edition
    /// the knowledge base rejects is logged and reported in `unpublished`
    /// while the remaining editions are still published.
    pub async fn evoke(&mut self) -> Result<EvokeOutcome, ForemanError> {
        let Some(lease) = self.queue.lease_next() else {
            return Ok(EvokeOutcome::Idle);
        };
        let guard = LeaseGuard::new(&mut self.queue, lease.token);
        let plan = lease.plan;
        let job_id = JobId::generate();
        tracing::info!(
            commission = %plan.commission,
            plan = %plan.id,
            lease = %lease.token,
            job = %job_id,
            "evoking plan",
        );

        let record = match self.executor.start(&plan.formula, &job_id).await {
            Ok(job) => job.wait().await,
            Err(err) => RunRecord::failed(job_id.clone(), -1, err.to_string()),
        };
        guard.finish();

        if let Some(error) = record.error {
            tracing::warn!(
                commission = %plan.commission,
                job = %job_id,
                exit_code = record.exit_code,
                error = %error,
                "execution failed; no release",
            );
            return Ok(EvokeOutcome::Failed {
                commission: plan.commission,
                job: job_id,
                error,
            });
        }

        let completed = plan.formula.with_results(&record.outputs);
        let editions = releaser::release(self.kb.as_ref(), &plan, &completed);
        let mut catalogs = Vec::with_capacity(editions.len());
        let mut unpublished = Vec::new();
        for book in editions {
            let id = book.id.clone();
            tracing::info!(catalog = %id, sku = %book.latest(), "publishing release");
            match self.kb.publish_catalog(book) {
                Ok(()) => catalogs.push(id),
                Err(err) => {
                    tracing::error!(
                        commission = %plan.commission,
                        job = %job_id,
                        catalog = %id,
                        error = %err,
                        "failed to publish release",
                    );
                    unpublished.push(id);
                }
            }
        }

        Ok(EvokeOutcome::Released {
            commission: plan.commission,
            job: job_id,
            catalogs,
            unpublished,
        })
    }

    /// Alternate non-blocking pumps and evokes until nothing is announced
    /// and nothing is ready.
    pub async fn drain(&mut self) -> Result<DrainSummary, ForemanError> {
        let mut summary = DrainSummary::default();
        loop {
            let mut progressed = false;
            while self.try_pump()?.is_some() {
                summary.notices += 1;
                progressed = true;
            }
            match self.evoke().await? {
                EvokeOutcome::Idle if !progressed => break,
                EvokeOutcome::Idle => {}
                EvokeOutcome::Released {
                    catalogs,
                    unpublished,
                    ..
                } => {
                    summary.executed += 1;
                    summary.released.extend(catalogs);
                    summary.unpublished.extend(unpublished);
                }
                EvokeOutcome::Failed { .. } => {
                    summary.executed += 1;
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub fn queue(&self) -> &PlanQueue {
        &self.queue
    }

    /// Direct queue access, for callers that lease outside [`Foreman::evoke`].
    pub fn queue_mut(&mut self) -> &mut PlanQueue {
        &mut self.queue
    }

    pub fn knowledge_base(&self) -> &Arc<dyn KnowledgeBase> {
        &self.kb
    }

    fn handle(&mut self, notice: &Notice) {
        let marked = match notice {
            Notice::Catalog(id) => self.kb.select_commissions_by_input_catalog(slice::from_ref(id)),
            Notice::Commission(id) => self.kb.commission(id).into_iter().collect(),
        };
        tracing::debug!(notice = ?notice, marked = marked.len(), "marked commissions");

        for commission in marked {
            match fill(self.kb.as_ref(), &commission) {
                Some(formula) => self.queue.push(Plan::new(commission.id, formula)),
                None => {
                    tracing::debug!(commission = %commission.id, "inputs not yet published; dropped")
                }
            }
        }
    }
}

/// Bind every input of `commission` to its catalog's latest release.
///
/// Returns `None` if any input catalog is absent or has nothing published
/// on its default track.
pub fn fill(kb: &dyn KnowledgeBase, commission: &Commission) -> Option<Formula> {
    let mut formula = commission.formula.clone();
    for (catalog, input) in formula.inputs.iter_mut() {
        let latest = kb.catalog(catalog)?.latest();
        if latest.is_zero() {
            return None;
        }
        input.sku = Some(latest);
    }
    Some(formula)
}

/// Unleases on drop unless [`LeaseGuard::finish`] ran first.
struct LeaseGuard<'a> {
    queue: &'a mut PlanQueue,
    token: Option<LeaseToken>,
}

impl<'a> LeaseGuard<'a> {
    fn new(queue: &'a mut PlanQueue, token: LeaseToken) -> Self {
        Self {
            queue,
            token: Some(token),
        }
    }

    fn finish(mut self) {
        if let Some(token) = self.token.take() {
            self.queue.finish(token);
        }
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::debug!(lease = %token, "returning unfinished lease");
            self.queue.unlease(token);
        }
    }
}
