//! Cooperative control of a running workflow.

use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use maestro_core::Data;

use crate::workflow::WorkflowStatus;

/// Shared handle used to observe and steer one workflow run.
///
/// Pause, resume and cancel are cooperative: the execution loop checks them
/// between steps, so a step that is already running finishes first.
#[derive(Debug)]
pub struct WorkflowControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    status: watch::Sender<WorkflowStatus>,
    settled: watch::Sender<bool>,
    inputs: Mutex<Vec<(String, Data)>>,
}

impl Default for WorkflowControl {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl WorkflowControl {
    /// Create a control driven by a cancellation token.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            paused: watch::Sender::new(false),
            status: watch::Sender::new(WorkflowStatus::NotStarted),
            settled: watch::Sender::new(false),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Ask the workflow to pause before its next step.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Let a paused workflow continue.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Ask the workflow to stop before its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether a pause has been requested.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait until resumed. Returns `false` if cancelled while waiting.
    pub(crate) async fn wait_resumed(&self) -> bool {
        let mut paused = self.paused.subscribe();
        tokio::select! {
            () = self.cancel.cancelled() => false,
            result = paused.wait_for(|p| !*p) => result.is_ok(),
        }
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        *self.status.borrow()
    }

    pub(crate) fn set_status(&self, status: WorkflowStatus) {
        self.status.send_replace(status);
    }

    /// Queue user input for a step.
    pub fn push_input(&self, step_id: impl Into<String>, input: Data) {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((step_id.into(), input));
    }

    /// Take every queued input.
    pub(crate) fn take_inputs(&self) -> Vec<(String, Data)> {
        std::mem::take(&mut *self.inputs.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn mark_running(&self) {
        self.settled.send_replace(false);
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.send_replace(true);
    }

    /// Whether the current run has finished and been recorded.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Wait until the current run has finished and been recorded.
    pub async fn settled(&self) -> WorkflowStatus {
        let mut settled = self.settled.subscribe();
        let _ = settled.wait_for(|s| *s).await;
        self.status()
    }
}
