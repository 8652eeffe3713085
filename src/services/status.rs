use std::sync::Arc;

use crate::error::AppError;
use crate::services::queue::{TaskId, TaskQueue, TaskStatus};

/// Read-only view of task progress, answered from the queue alone.
#[derive(Clone)]
pub struct StatusService {
    queue: Arc<dyn TaskQueue>,
}

impl StatusService {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Look up a task by the id string a client was given at submission.
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AppError> {
        let not_found = || AppError::NotFound(format!("Task {task_id}"));
        let id: TaskId = task_id.parse().map_err(|_| not_found())?;

        self.queue.status(id).await?.ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::queue::{
        DeletePayload, EnqueueOptions, MemoryTaskQueue, TaskPayload, TaskState,
    };

    #[tokio::test]
    async fn test_known_task_reports_state() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let handle = queue
            .enqueue(
                TaskPayload::Delete(DeletePayload {
                    asset_id: 7,
                    storage_key: "k".to_string(),
                }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let service = StatusService::new(queue);
        let status = service.task_status(&handle.id.to_string()).await.unwrap();
        assert_eq!(status.state, TaskState::Waiting);
        assert_eq!(status.progress, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_not_found() {
        let service = StatusService::new(Arc::new(MemoryTaskQueue::new()));

        let err = service.task_status("999").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service.task_status("not-a-task").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
