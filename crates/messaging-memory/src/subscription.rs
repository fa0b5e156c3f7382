use crate::BrokerState;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle to a live in-memory subscription.
///
/// Dropping the handle stops delivery and frees the durable name, like
/// unsubscribing without waiting for in-flight handlers.
#[derive(Debug)]
pub struct MemorySubscription {
    pub(crate) durable_name: String,
    pub(crate) shutdown_token: CancellationToken,
    pub(crate) state: Arc<Mutex<BrokerState>>,
    pub(crate) task_tracker: TaskTracker,
    pub(crate) topic: String,
}

impl MemorySubscription {
    /// The durable name the subscription was opened with.
    #[must_use]
    pub fn durable_name(&self) -> &str {
        &self.durable_name
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        self.task_tracker.close();

        if let Some(durable) = self.state.lock().durables.get_mut(&self.durable_name) {
            durable.live = false;
        }
    }
}
