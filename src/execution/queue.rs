use crate::operations::Operation;
use std::sync::{Mutex, MutexGuard};

/// One operation waiting for the host context, tagged with its 1-based
/// plan step.
pub struct QueuedOperation {
    pub step: usize,
    pub operation: Box<dyn Operation>,
}

impl QueuedOperation {
    pub fn new(step: usize, operation: Box<dyn Operation>) -> Self {
        Self { step, operation }
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }
}

impl std::fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("step", &self.step)
            .field("operation", &self.name())
            .finish()
    }
}

/// Operations accumulated on the caller's thread until the next batch.
#[derive(Debug, Default)]
pub struct OperationQueue {
    pending: Mutex<Vec<QueuedOperation>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedOperation>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, step: usize, operation: Box<dyn Operation>) {
        self.lock().push(QueuedOperation::new(step, operation));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swaps the pending list out in one step. Operations enqueued after
    /// this call belong to the next batch.
    pub fn take_batch(&self) -> Vec<QueuedOperation> {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::BoundParams;
    use crate::operations::actions::GetLevels;
    use crate::operations::queries::CreateGlobalScope;

    #[test]
    fn take_batch_empties_the_queue_in_order() {
        let queue = OperationQueue::new();
        queue.enqueue(1, CreateGlobalScope::create(&BoundParams::default()));
        queue.enqueue(2, GetLevels::create(&BoundParams::default()));
        assert_eq!(queue.len(), 2);

        let batch = queue.take_batch();
        assert!(queue.is_empty());
        let names = batch
            .iter()
            .map(|queued| (queued.step, queued.name()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec![(1, "create_global_scope"), (2, "get_levels")]);
    }
}
