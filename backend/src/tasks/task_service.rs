use std::sync::Arc;

use log::{error, info, warn};
use serde_json::{Map, Value};
use shared::{ImageAction, TaskRequest, TaskResult, TaskSubmission};
use uuid::Uuid;

use crate::fetch::{FetchError, ImageFetcher};
use crate::mq::{PublishError, ResultPublisher};
use crate::operations::{self, OperationContext, OperationError};

/// Business-level failures. They end up in the task's `error` result and
/// never abort the request.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[derive(Clone)]
pub struct TaskService {
    fetcher: ImageFetcher,
    operations: OperationContext,
    publisher: Arc<dyn ResultPublisher>,
}

impl TaskService {
    pub fn new(
        fetcher: ImageFetcher,
        operations: OperationContext,
        publisher: Arc<dyn ResultPublisher>,
    ) -> Self {
        Self {
            fetcher,
            operations,
            publisher,
        }
    }

    /// Entry point for wire submissions, where the action is still a string.
    pub async fn submit(&self, submission: TaskSubmission) -> Result<TaskResult, PublishError> {
        match submission.action.parse::<ImageAction>() {
            Ok(action) => {
                self.process(TaskRequest {
                    task_id: submission.task_id,
                    action,
                    image_url: submission.image_url,
                })
                .await
            }
            Err(_) => {
                let outcome = Err(TaskError::UnknownAction(submission.action));
                self.finish(submission.task_id, outcome).await
            }
        }
    }

    /// Runs one task and publishes its outcome exactly once. The only error
    /// returned is a failed publish; everything else becomes a `status=error`
    /// result.
    pub async fn process(&self, request: TaskRequest) -> Result<TaskResult, PublishError> {
        info!(
            "Processing task {} ({}) for {}",
            request.task_id, request.action, request.image_url
        );
        let outcome = self.execute(&request).await;
        self.finish(request.task_id, outcome).await
    }

    async fn execute(&self, request: &TaskRequest) -> Result<Map<String, Value>, TaskError> {
        let image = self.fetcher.fetch(&request.image_url).await?;
        let output =
            operations::apply_blocking(request.action, image, self.operations.clone()).await?;
        Ok(output.into_payload())
    }

    async fn finish(
        &self,
        task_id: Uuid,
        outcome: Result<Map<String, Value>, TaskError>,
    ) -> Result<TaskResult, PublishError> {
        let result = match outcome {
            Ok(payload) => {
                info!("Task {} succeeded", task_id);
                TaskResult::success(task_id, payload)
            }
            Err(e) => {
                warn!("Task {} failed: {}", task_id, e);
                TaskResult::error(task_id, e.to_string())
            }
        };

        if let Err(e) = self.publisher.publish(&result).await {
            error!("Could not publish result of task {}: {}", task_id, e);
            return Err(e);
        }
        Ok(result)
    }
}
