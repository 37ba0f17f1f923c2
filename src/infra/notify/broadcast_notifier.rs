// In-process notification transport on a tokio broadcast channel.
//
// Observers subscribe and receive every event published after they joined.
// Slow observers lose the oldest events once the channel is full.

use crate::core::queue::{NotificationEvent, Notifier, NotifyError, SubmitterId};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

/// One delivered event, addressed by the submitter it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub uid: SubmitterId,
    pub event: String,
    pub body: NotificationEvent,
}

pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify_new(
        &self,
        uid: SubmitterId,
        event: NotificationEvent,
    ) -> Result<(), NotifyError> {
        let notification = Notification {
            uid,
            event: event.name().to_string(),
            body: event,
        };

        let receivers = self
            .sender
            .send(notification)
            .map_err(|_| NotifyError::NoObservers)?;
        tracing::debug!(uid = %uid, receivers, "Notification sent");
        Ok(())
    }
}
