//! Invalidation propagation up the BOM / bundle / variation graph.
//!
//! ```text
//!   G  (bundle)           re-runs lift(lift(checks))
//!   └─ A (configurable)   re-runs lift(checks)
//!      └─ C (variation)   re-runs checks
//! ```
//!
//! A walk first collects every affected ancestor with the union of checks it
//! must re-run, then evaluates them children before parents. A product shared
//! by several branches runs once, after all of them. Visited
//! `(product, check_kind)` pairs only guard against cycles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use readiness_catalog::{ProductId, RelationKind};
use readiness_core::{DomainError, TenantId};
use readiness_events::{EventBus, EventEnvelope};

use crate::engine::ReconciliationEngine;
use crate::error::InspectionError;
use crate::events::InspectionEvent;
use crate::rules::{CheckKind, CheckSet, lift_to_ancestors};
use crate::store::InspectionStore;
use crate::tasks::{InspectionTask, TaskQueue};

/// Run re-evaluations now, or hand them to the task queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Inline,
    Deferred,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Inline => "inline",
            ExecutionMode::Deferred => "deferred",
        }
    }
}

impl core::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(ExecutionMode::Inline),
            "deferred" => Ok(ExecutionMode::Deferred),
            other => Err(DomainError::validation(format!(
                "unknown execution mode '{other}' (expected inline or deferred)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// `(product, check)` pairs whose predicate ran inline.
    pub reevaluated: Vec<(ProductId, CheckKind)>,
    pub enqueued: usize,
    pub products_visited: usize,
    pub revisits_pruned: usize,
    /// Products whose `has_missing_required` flipped during the walk.
    pub required_flips: Vec<ProductId>,
}

impl PropagationReport {
    pub fn merge(&mut self, other: PropagationReport) {
        self.reevaluated.extend(other.reevaluated);
        self.enqueued += other.enqueued;
        self.products_visited += other.products_visited;
        self.revisits_pruned += other.revisits_pruned;
        self.required_flips.extend(other.required_flips);
    }

    pub fn touched(&self, product_id: ProductId, check_kind: CheckKind) -> bool {
        self.reevaluated.contains(&(product_id, check_kind))
    }
}

/// Products reached by one walk, in discovery order.
#[derive(Default)]
struct Affected {
    order: Vec<ProductId>,
    checks: HashMap<ProductId, CheckSet>,
    parents: HashMap<ProductId, Vec<ProductId>>,
}

impl Affected {
    fn parents_of(&self, product_id: &ProductId) -> &[ProductId] {
        self.parents.get(product_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Children before parents. Products on a cycle are released in
    /// discovery order once nothing else is ready.
    fn schedule(&self) -> Vec<ProductId> {
        let mut waiting: HashMap<ProductId, usize> = self.order.iter().map(|p| (*p, 0)).collect();
        for child in &self.order {
            for parent in self.parents_of(child) {
                if let Some(n) = waiting.get_mut(parent) {
                    *n += 1;
                }
            }
        }

        let mut ready: VecDeque<ProductId> = self
            .order
            .iter()
            .copied()
            .filter(|p| waiting.get(p) == Some(&0))
            .collect();
        let mut done = HashSet::new();
        let mut sequence = Vec::with_capacity(self.order.len());
        while sequence.len() < self.order.len() {
            let next = match ready.pop_front() {
                Some(p) => p,
                None => match self.order.iter().find(|p| !done.contains(*p)) {
                    Some(p) => *p,
                    None => break,
                },
            };
            if !done.insert(next) {
                continue;
            }
            sequence.push(next);
            for parent in self.parents_of(&next) {
                if let Some(n) = waiting.get_mut(parent) {
                    *n = n.saturating_sub(1);
                    if *n == 0 && !done.contains(parent) {
                        ready.push_back(*parent);
                    }
                }
            }
        }
        sequence
    }
}

pub struct InvalidationPropagator<S, B> {
    engine: Arc<ReconciliationEngine<S, B>>,
    queue: Arc<dyn TaskQueue>,
}

impl<S, B> InvalidationPropagator<S, B>
where
    S: InspectionStore,
    B: EventBus<EventEnvelope<InspectionEvent>>,
{
    pub fn new(engine: Arc<ReconciliationEngine<S, B>>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { engine, queue }
    }

    /// Re-run `checks` on `product_id`, then the lifted checks on every
    /// ancestor, each product after all of its affected components.
    ///
    /// An error stops the walk; units already committed by then stay committed.
    pub fn propagate(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks: &CheckSet,
        mode: ExecutionMode,
    ) -> Result<PropagationReport, InspectionError> {
        let mut report = PropagationReport::default();
        let affected = self.collect(tenant_id, product_id, checks, &mut report)?;
        report.products_visited = affected.order.len();

        for target in affected.schedule() {
            let Some(fresh) = affected.checks.get(&target) else {
                continue;
            };
            match mode {
                ExecutionMode::Inline => {
                    let outcome = self.engine.reevaluate_checks(tenant_id, target, fresh)?;
                    report
                        .reevaluated
                        .extend(outcome.evaluated.iter().map(|k| (target, *k)));
                    if outcome.flipped_required() {
                        report.required_flips.push(target);
                    }
                }
                ExecutionMode::Deferred => {
                    if self.enqueue_present(tenant_id, target, fresh)? {
                        report.enqueued += 1;
                    }
                }
            }
        }

        debug!(
            %tenant_id,
            %product_id,
            %mode,
            products = report.products_visited,
            reevaluated = report.reevaluated.len(),
            enqueued = report.enqueued,
            pruned = report.revisits_pruned,
            "propagation finished"
        );
        Ok(report)
    }

    /// Breadth-first over parents, accumulating the checks each product must
    /// re-run. A pair already collected is not lifted again.
    fn collect(
        &self,
        tenant_id: TenantId,
        origin: ProductId,
        checks: &CheckSet,
        report: &mut PropagationReport,
    ) -> Result<Affected, InspectionError> {
        let mut visited: HashSet<(ProductId, CheckKind)> = HashSet::new();
        let mut affected = Affected::default();
        let mut frontier = VecDeque::from([(origin, checks.clone())]);

        while let Some((product_id, checks)) = frontier.pop_front() {
            let fresh: CheckSet = checks
                .iter()
                .copied()
                .filter(|k| visited.insert((product_id, *k)))
                .collect();
            report.revisits_pruned += checks.len() - fresh.len();
            if fresh.is_empty() {
                continue;
            }
            if !affected.checks.contains_key(&product_id) {
                affected.order.push(product_id);
                affected
                    .parents
                    .insert(product_id, self.parents(tenant_id, product_id)?);
            }
            debug!(%tenant_id, %product_id, checks = fresh.len(), "invalidating");

            let lifted = lift_to_ancestors(&fresh);
            affected.checks.entry(product_id).or_default().extend(fresh);
            for parent in affected.parents_of(&product_id) {
                frontier.push_back((*parent, lifted.clone()));
            }
        }
        Ok(affected)
    }

    fn parents(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<ProductId>, InspectionError> {
        let mut parents = Vec::new();
        for relation in RelationKind::ALL {
            for parent in self.engine.catalog().parents(tenant_id, product_id, relation)? {
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
        Ok(parents)
    }

    /// Queue a re-evaluation of the checks the product has sub-records for.
    /// Products without an inspection are covered by their pending ensure.
    fn enqueue_present(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks: &CheckSet,
    ) -> Result<bool, InspectionError> {
        let Some(inspection) = self.engine.inspection(tenant_id, product_id)? else {
            return Ok(false);
        };
        let present: CheckSet = inspection
            .checks()
            .iter()
            .map(|c| c.check_kind)
            .filter(|k| checks.contains(k))
            .collect();
        if present.is_empty() {
            return Ok(false);
        }
        self.queue.enqueue(InspectionTask::Reevaluate {
            tenant_id,
            product_id,
            checks: present,
        })?;
        Ok(true)
    }
}
