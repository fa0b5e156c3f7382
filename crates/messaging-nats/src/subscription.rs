use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle to a live durable consumer subscription.
///
/// Dropping the handle stops the reader task. Handlers already running are
/// left to finish.
#[derive(Debug)]
pub struct NatsSubscription {
    pub(crate) durable_name: String,
    pub(crate) shutdown_token: CancellationToken,
    pub(crate) task_tracker: TaskTracker,
    pub(crate) topic: String,
}

impl NatsSubscription {
    /// The durable consumer name.
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

impl Drop for NatsSubscription {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        self.task_tracker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_stops_reader() {
        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        drop(NatsSubscription {
            durable_name: "trigger-1".to_string(),
            shutdown_token: shutdown_token.clone(),
            task_tracker: task_tracker.clone(),
            topic: "orders".to_string(),
        });

        assert!(shutdown_token.is_cancelled());
        assert!(task_tracker.is_closed());
    }
}
