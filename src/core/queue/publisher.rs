// Publisher adapter - turns an approved submission into live content.
//
// Creation goes to the content subsystem; once that succeeds an event is
// pushed to observers. Delivery of that event is best effort: a transport
// failure is logged and the publish still counts as done.

use super::queue_models::{NotificationEvent, SiteConfig, Submission, SubmissionKind, SubmitterId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Invalid submission: {0}")]
    Invalid(String),

    #[error("Topic {0} does not exist")]
    NoSuchTopic(i64),

    #[error("Content store error: {0}")]
    Store(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No observers are listening")]
    NoObservers,
}

// ============================================================================
// COLLABORATOR TRAITS (PORTS)
// ============================================================================

/// A freshly created thread and its first post.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedThread {
    pub topic: Value,
    pub post: Value,
}

#[async_trait]
pub trait ContentCreator: Send + Sync {
    async fn create_thread(&self, data: &Submission) -> Result<CreatedThread, ContentError>;

    async fn create_reply(&self, data: &Submission) -> Result<Value, ContentError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new(&self, uid: SubmitterId, event: NotificationEvent)
        -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: ContentCreator + ?Sized> ContentCreator for Arc<T> {
    async fn create_thread(&self, data: &Submission) -> Result<CreatedThread, ContentError> {
        (**self).create_thread(data).await
    }

    async fn create_reply(&self, data: &Submission) -> Result<Value, ContentError> {
        (**self).create_reply(data).await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify_new(
        &self,
        uid: SubmitterId,
        event: NotificationEvent,
    ) -> Result<(), NotifyError> {
        (**self).notify_new(uid, event).await
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// What went live.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishResult {
    Topic(CreatedThread),
    Reply(Value),
}

pub struct Publisher<C: ContentCreator, N: Notifier> {
    content: C,
    notifier: N,
}

impl<C: ContentCreator, N: Notifier> Publisher<C, N> {
    pub fn new(content: C, notifier: N) -> Self {
        Self { content, notifier }
    }

    /// Route by kind.
    pub async fn publish(
        &self,
        kind: SubmissionKind,
        data: &Submission,
        config: &SiteConfig,
    ) -> Result<PublishResult, ContentError> {
        match kind {
            SubmissionKind::Topic => self.publish_topic(data).await,
            SubmissionKind::Post => self.publish_reply(data, config).await,
        }
    }

    pub async fn publish_topic(&self, data: &Submission) -> Result<PublishResult, ContentError> {
        let created = self.content.create_thread(data).await?;

        let event = NotificationEvent::NewTopic {
            posts: vec![created.post.clone()],
            topic: created.topic.clone(),
        };
        self.notify(data.submitter(), event).await;

        Ok(PublishResult::Topic(created))
    }

    pub async fn publish_reply(
        &self,
        data: &Submission,
        config: &SiteConfig,
    ) -> Result<PublishResult, ContentError> {
        let post = self.content.create_reply(data).await?;

        let event = NotificationEvent::NewPost {
            posts: vec![post.clone()],
            reputation_disabled: config.reputation_disabled,
            downvote_disabled: config.downvote_disabled,
        };
        self.notify(data.submitter(), event).await;

        Ok(PublishResult::Reply(post))
    }

    async fn notify(&self, uid: SubmitterId, event: NotificationEvent) {
        let name = event.name();
        if let Err(e) = self.notifier.notify_new(uid, event).await {
            tracing::warn!(uid = %uid, event = name, "Dropped notification: {}", e);
        }
    }
}
