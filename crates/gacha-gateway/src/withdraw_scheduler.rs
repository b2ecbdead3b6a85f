use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gateway_contract::{MessageId, MessagingGateway};

/// Deferred message deletion on top of [`MessagingGateway::delete_message`].
///
/// Each scheduled delete is a detached tokio task. Failed deletes are logged and
/// never retried; [`WithdrawScheduler::cancel_all`] aborts whatever is still pending.
pub struct WithdrawScheduler {
    gateway: Arc<dyn MessagingGateway>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WithdrawScheduler {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            gateway,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule_delete(&self, message_id: MessageId, delay: Duration) {
        let gateway = Arc::clone(&self.gateway);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match gateway.delete_message(&message_id).await {
                Ok(()) => debug!(message_id = %message_id, "auto-withdraw delete completed"),
                Err(error) => warn!(
                    message_id = %message_id,
                    error = %error,
                    reason_code = "auto_withdraw_failed",
                    "auto-withdraw delete failed"
                ),
            }
        });
        let mut tasks = self.lock_tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    pub fn pending_count(&self) -> usize {
        let mut tasks = self.lock_tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Aborts every pending delete; returns how many were still outstanding.
    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.lock_tasks();
        let pending = tasks.drain(..).filter(|task| !task.is_finished()).collect::<Vec<_>>();
        for task in &pending {
            task.abort();
        }
        if !pending.is_empty() {
            debug!(cancelled = pending.len(), "pending auto-withdraw deletes cancelled");
        }
        pending.len()
    }
}

impl std::fmt::Debug for WithdrawScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithdrawScheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}
