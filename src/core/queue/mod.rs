// Core post queue module - admission, queueing and publishing of held posts.

pub mod admission;
pub mod coercion;
pub mod publisher;
pub mod queue_models;
pub mod queue_service;
pub mod queue_store;

pub use admission::{AdmissionPolicy, UserStanding};
pub use publisher::{
    ContentCreator, ContentError, CreatedThread, Notifier, NotifyError, PublishResult, Publisher,
};
pub use queue_models::*;
pub use queue_service::{
    Clock, PostQueueService, QueueError, QueueSettings, SubmitOutcome, SystemClock,
};
pub use queue_store::{ProfileError, ProfileStore, QueueStore, SiteConfigStore, StorageError};
