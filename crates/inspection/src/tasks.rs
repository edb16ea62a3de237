//! Deferred work: tasks the engine hands to a queue instead of running inline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use readiness_catalog::ProductId;
use readiness_core::TenantId;

use crate::rules::CheckSet;

/// One unit of deferred engine work. Serializable so queue adapters can
/// persist it as a job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum InspectionTask {
    Ensure {
        tenant_id: TenantId,
        product_id: ProductId,
    },
    Reevaluate {
        tenant_id: TenantId,
        product_id: ProductId,
        checks: CheckSet,
    },
    Resync {
        tenant_id: TenantId,
        product_id: ProductId,
    },
    Propagate {
        tenant_id: TenantId,
        product_id: ProductId,
        checks: CheckSet,
    },
}

impl InspectionTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ensure { .. } => "inspection.ensure",
            Self::Reevaluate { .. } => "inspection.reevaluate",
            Self::Resync { .. } => "inspection.resync",
            Self::Propagate { .. } => "inspection.propagate",
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::Ensure { tenant_id, .. }
            | Self::Reevaluate { tenant_id, .. }
            | Self::Resync { tenant_id, .. }
            | Self::Propagate { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            Self::Ensure { product_id, .. }
            | Self::Reevaluate { product_id, .. }
            | Self::Resync { product_id, .. }
            | Self::Propagate { product_id, .. } => *product_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskQueueError {
    #[error("task rejected: {0}")]
    Rejected(String),

    #[error("task queue unavailable: {0}")]
    Unavailable(String),
}

/// Sink for deferred tasks. Delivery is at-least-once; every task is safe to
/// run more than once.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: InspectionTask) -> Result<(), TaskQueueError>;
}

impl<Q> TaskQueue for Arc<Q>
where
    Q: TaskQueue + ?Sized,
{
    fn enqueue(&self, task: InspectionTask) -> Result<(), TaskQueueError> {
        (**self).enqueue(task)
    }
}

/// FIFO queue held in memory; the caller drains and runs the tasks.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<VecDeque<InspectionTask>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<InspectionTask> {
        self.tasks.lock().ok()?.pop_front()
    }

    pub fn drain(&self) -> Vec<InspectionTask> {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(&self, task: InspectionTask) -> Result<(), TaskQueueError> {
        self.tasks
            .lock()
            .map_err(|_| TaskQueueError::Unavailable("task queue lock poisoned".to_string()))?
            .push_back(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CheckKind;

    #[test]
    fn tasks_round_trip_as_job_payloads() {
        let task = InspectionTask::Reevaluate {
            tenant_id: TenantId::new(),
            product_id: ProductId::new(),
            checks: CheckSet::from([CheckKind::HasImages, CheckKind::InactiveComponents]),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "reevaluate");
        assert_eq!(json["checks"][0], "has_images");
        let back: InspectionTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn in_memory_queue_is_fifo() {
        let queue = InMemoryTaskQueue::new();
        let tenant_id = TenantId::new();
        let first = ProductId::new();
        let second = ProductId::new();
        queue.enqueue(InspectionTask::Ensure { tenant_id, product_id: first }).unwrap();
        queue.enqueue(InspectionTask::Resync { tenant_id, product_id: second }).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().product_id(), first);
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
    }
}
