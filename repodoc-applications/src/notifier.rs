//! Per-user notification channel backed by a tokio broadcast channel

use repodoc_core::{AnalysisEvent, NotificationChannel};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct UserEvent {
    user_id: String,
    event: AnalysisEvent,
}

/// Best-effort fan-out of analysis events to subscribed users
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<UserEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive the events published for `user_id`
    pub fn subscribe(&self, user_id: &str) -> Subscription {
        Subscription {
            user_id: user_id.to_string(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl NotificationChannel for BroadcastNotifier {
    fn publish(&self, user_id: &str, event: AnalysisEvent) {
        let analysis_id = event.analysis_id().to_string();
        let message = UserEvent {
            user_id: user_id.to_string(),
            event,
        };
        if self.sender.send(message).is_err() {
            debug!(user_id, analysis_id = %analysis_id, "No subscribers, event dropped");
        }
    }
}

/// One user's view of the notification stream
pub struct Subscription {
    user_id: String,
    receiver: broadcast::Receiver<UserEvent>,
}

impl Subscription {
    /// Next event for this user; `None` once the notifier is dropped.
    /// Events lost to lag are skipped.
    pub async fn recv(&mut self) -> Option<AnalysisEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.user_id == self.user_id => return Some(message.event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = %self.user_id, skipped, "Notification subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
