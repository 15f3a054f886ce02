//! Submit-then-await helper shared by every task-backed operation.

use serde_json::Value;

use crate::error::{VsphereError, VsphereResult};
use crate::session::Session;
use crate::types::{TaskRef, TaskRequest, TaskStatus};

/// Runs one remote task to a terminal state.
pub struct TaskRunner<'a> {
    session: &'a Session,
}

impl<'a> TaskRunner<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Submit `request` and block until vCenter reports the task finished.
    ///
    /// Nothing is submitted once the session is cancelled. Submission
    /// errors are returned as-is; a task that ends `FAILED`
    /// becomes a `TaskError` carrying vCenter's message. On success the
    /// task's result payload (if any) is returned.
    pub async fn run(&self, request: TaskRequest) -> VsphereResult<Option<Value>> {
        let op = request.operation();
        if self.session.cancellation_token().is_cancelled() {
            return Err(VsphereError::cancelled(format!(
                "session cancelled, {op} on {} not submitted",
                request.target()
            )));
        }
        let task = self.session.api().submit_task(&request).await?;
        log::debug!("{op} task {task} submitted for {}", request.target());

        let waiting_for = format!("{op} task {task}");
        self.session
            .until_cancelled(&waiting_for, self.wait(&task, op))
            .await
    }

    async fn wait(&self, task: &TaskRef, op: &str) -> VsphereResult<Option<Value>> {
        let interval = self.session.polling().task_interval();
        let mut last_progress = None;
        loop {
            let info = self.session.api().task_info(task).await?;
            match info.status {
                TaskStatus::Succeeded => {
                    log::debug!("{op} task {task} succeeded");
                    return Ok(info.result);
                }
                TaskStatus::Failed => {
                    return Err(VsphereError::task(format!(
                        "{op} task {task} failed: {}",
                        info.error_message()
                    )));
                }
                TaskStatus::Pending | TaskStatus::Running | TaskStatus::Blocked => {
                    if info.progress.is_some() && info.progress != last_progress {
                        log::debug!("{op} task {task}: {}%", info.progress.unwrap_or_default());
                        last_progress = info.progress;
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}
