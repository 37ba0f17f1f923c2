// Post queue service - holds submissions until a moderator decides on them.
//
// This service handles:
// - The admission check (should this submission be held?)
// - Enqueue: id generation, index entry, record write
// - Removal (rejection) and submission (approval) of queued items
// - Listing the queue in admission order
//
// Every step is a single call into a collaborator. Nothing is retried and
// nothing is rolled back; the gaps that leaves are spelled out per operation.

use super::admission::AdmissionPolicy;
use super::publisher::{ContentCreator, ContentError, Notifier, PublishResult, Publisher};
use super::queue_models::{
    record_key, QueueEntry, QueueReceipt, QueuedRecord, QueuedSubmission, SiteConfig, Submission,
    SubmitterId, QUEUE_SET,
};
use super::queue_store::{ProfileError, ProfileStore, QueueStore, StorageError};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ProfileLookup(#[from] ProfileError),

    #[error("Queued record {id} is unreadable: {reason}")]
    Deserialization { id: String, reason: String },

    #[error("Could not publish queued submission: {0}")]
    Materialization(#[from] ContentError),

    #[error("Could not encode submission: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// CLOCK
// ============================================================================

/// Source of admission timestamps (ms since the epoch).
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

// ============================================================================
// SETTINGS AND OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSettings {
    /// Serialize `submit_from_queue` calls per id, so a second concurrent
    /// approval of the same item finds it gone instead of publishing twice.
    pub serialize_submits: bool,
}

/// How a submit call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing was queued under that id (already handled, or never existed)
    NotQueued,
    /// Materialized and removed from the queue
    Published(PublishResult),
}

/// Per-id advisory locks for submit. The entry is dropped when the last
/// holder releases it. A waiter cancelled after the holder let go leaves the
/// entry behind; the next submit of that id reuses it and clears it.
#[derive(Default)]
struct SubmitLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl SubmitLocks {
    async fn acquire(&self, id: &str) -> SubmitLockGuard<'_> {
        let mutex = self
            .inner
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        SubmitLockGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }
}

struct SubmitLockGuard<'a> {
    locks: &'a SubmitLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubmitLockGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own Arc is gone before counting holders.
        self.guard.take();
        self.locks
            .inner
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct PostQueueService<S, P, C, N>
where
    S: QueueStore,
    P: ProfileStore,
    C: ContentCreator,
    N: Notifier,
{
    store: S,
    admission: AdmissionPolicy<P>,
    publisher: Publisher<C, N>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    submit_locks: SubmitLocks,
}

impl<S, P, C, N> PostQueueService<S, P, C, N>
where
    S: QueueStore,
    P: ProfileStore,
    C: ContentCreator,
    N: Notifier,
{
    pub fn new(store: S, profiles: P, content: C, notifier: N) -> Self {
        Self {
            store,
            admission: AdmissionPolicy::new(profiles),
            publisher: Publisher::new(content, notifier),
            clock: Arc::new(SystemClock),
            settings: QueueSettings::default(),
            submit_locks: SubmitLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Should a submission from `submitter` be held for review?
    ///
    /// Only the submitter's standing is consulted; the submission body is
    /// not inspected.
    pub async fn should_queue(
        &self,
        submitter: SubmitterId,
        _data: &Submission,
        config: &SiteConfig,
    ) -> Result<bool, QueueError> {
        Ok(self.admission.should_queue(submitter, config).await?)
    }

    /// Hold a submission for review.
    ///
    /// The id is `<kind>-<ms>`. Two submissions of the same kind admitted in
    /// the same millisecond get the same id and the later one overwrites the
    /// earlier record; that risk is accepted.
    ///
    /// The index entry is written before the record. If the record write
    /// fails the index keeps an entry with nothing behind it, and the error
    /// is returned.
    pub async fn enqueue(&self, data: &Submission) -> Result<QueueReceipt, QueueError> {
        let kind = data.kind();
        let now = self.clock.now_millis();
        let id = format!("{}-{}", kind, now);

        let record = QueuedSubmission {
            id: id.clone(),
            submitter: data.submitter(),
            kind,
            payload: serde_json::to_string(data)?,
        };

        self.store.add_to_ordered_set(QUEUE_SET, now, &id).await?;
        self.store
            .set_record(&record_key(&id), &record.to_fields())
            .await?;

        tracing::info!(
            id = %id,
            kind = %kind,
            uid = %record.submitter,
            "Submission queued for review"
        );

        Ok(QueueReceipt::queued(id))
    }

    /// Reject a queued submission. Removing something that isn't queued is a
    /// no-op.
    ///
    /// Index first, then record: a failure in between leaves a record that no
    /// listing shows, never a listed id that can't be found.
    pub async fn remove_from_queue(&self, id: &str) -> Result<(), QueueError> {
        self.store.remove_from_ordered_set(QUEUE_SET, id).await?;
        self.store.delete_record(&record_key(id)).await?;

        tracing::info!(id = %id, "Submission removed from queue");
        Ok(())
    }

    /// Approve a queued submission: publish it, then drop it from the queue.
    ///
    /// `Queued -> Materializing -> Removed`, or straight to `NotQueued` when
    /// there is no record. The record stays queued when its payload can't be
    /// decoded or the content subsystem refuses it, so a moderator can look
    /// at it or retry.
    ///
    /// Without `serialize_submits`, two concurrent calls for the same id can
    /// both find the record and both publish it. Removal is idempotent,
    /// publishing is not; callers are expected to submit each item once.
    pub async fn submit_from_queue(
        &self,
        id: &str,
        config: &SiteConfig,
    ) -> Result<SubmitOutcome, QueueError> {
        let _lock = if self.settings.serialize_submits {
            Some(self.submit_locks.acquire(id).await)
        } else {
            None
        };

        let Some(fields) = self.store.get_record(&record_key(id)).await? else {
            tracing::debug!(id = %id, "Nothing queued under this id");
            return Ok(SubmitOutcome::NotQueued);
        };

        let record = QueuedSubmission::from_fields(fields).map_err(|e| {
            QueueError::Deserialization {
                id: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        let data = record
            .decode_payload()
            .map_err(|e| QueueError::Deserialization {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let result = self.publisher.publish(record.kind, &data, config).await?;
        self.remove_from_queue(id).await?;

        tracing::info!(
            id = %id,
            kind = %record.kind,
            uid = %record.submitter,
            "Queued submission published"
        );
        Ok(SubmitOutcome::Published(result))
    }

    /// Queued submissions in admission order.
    ///
    /// Index entries whose record is gone (a failed enqueue, or a removal in
    /// progress) are skipped. Records with a broken envelope are listed as
    /// [`QueuedRecord::Unreadable`] alongside the rest.
    pub async fn list_queue(
        &self,
        start: usize,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let members = self
            .store
            .range_ordered_set(QUEUE_SET, start, limit)
            .await?;

        let mut entries = Vec::with_capacity(members.len());
        for (id, admitted_at) in members {
            let Some(fields) = self.store.get_record(&record_key(&id)).await? else {
                tracing::debug!(id = %id, "Skipping index entry without a record");
                continue;
            };

            let record = match QueuedSubmission::from_fields(fields.clone()) {
                Ok(submission) => QueuedRecord::Readable(submission),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Queued record is unreadable");
                    QueuedRecord::Unreadable {
                        fields,
                        reason: e.to_string(),
                    }
                }
            };
            entries.push(QueueEntry {
                id,
                admitted_at,
                record,
            });
        }
        Ok(entries)
    }

    /// A single queued submission, payload still encoded.
    pub async fn get_queued(&self, id: &str) -> Result<Option<QueuedSubmission>, QueueError> {
        let Some(fields) = self.store.get_record(&record_key(id)).await? else {
            return Ok(None);
        };

        QueuedSubmission::from_fields(fields)
            .map(Some)
            .map_err(|e| QueueError::Deserialization {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn queue_len(&self) -> Result<u64, QueueError> {
        Ok(self.store.ordered_set_card(QUEUE_SET).await?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::publisher::{CreatedThread, NotifyError};
    use crate::core::queue::queue_models::{NotificationEvent, RecordFields, SubmissionKind};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    /// In-memory storage engine for testing
    #[derive(Default)]
    struct MockStore {
        sets: DashMap<(String, String), i64>,
        records: DashMap<String, RecordFields>,
        fail_record_writes: AtomicBool,
        fail_reads: AtomicBool,
        fail_deletes: AtomicBool,
    }

    #[async_trait]
    impl QueueStore for MockStore {
        async fn add_to_ordered_set(
            &self,
            set: &str,
            score: i64,
            member: &str,
        ) -> Result<(), StorageError> {
            self.sets.insert((set.to_string(), member.to_string()), score);
            Ok(())
        }

        async fn remove_from_ordered_set(
            &self,
            set: &str,
            member: &str,
        ) -> Result<(), StorageError> {
            self.sets.remove(&(set.to_string(), member.to_string()));
            Ok(())
        }

        async fn range_ordered_set(
            &self,
            set: &str,
            start: usize,
            limit: usize,
        ) -> Result<Vec<(String, i64)>, StorageError> {
            let mut members: Vec<(String, i64)> = self
                .sets
                .iter()
                .filter(|e| e.key().0 == set)
                .map(|e| (e.key().1.clone(), *e.value()))
                .collect();
            members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            Ok(members.into_iter().skip(start).take(limit).collect())
        }

        async fn ordered_set_card(&self, set: &str) -> Result<u64, StorageError> {
            Ok(self.sets.iter().filter(|e| e.key().0 == set).count() as u64)
        }

        async fn set_record(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
            if self.fail_record_writes.load(Ordering::SeqCst) {
                return Err(StorageError("disk full".to_string()));
            }
            self.records
                .entry(key.to_string())
                .or_default()
                .extend(fields.clone());
            Ok(())
        }

        async fn get_record(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError("connection reset".to_string()));
            }
            Ok(self.records.get(key).map(|r| r.clone()))
        }

        async fn delete_record(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(StorageError("database is locked".to_string()));
            }
            self.records.remove(key);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockProfiles {
        users: DashMap<i64, HashMap<String, String>>,
    }

    #[async_trait]
    impl ProfileStore for MockProfiles {
        async fn get_user_fields(
            &self,
            uid: i64,
            _fields: &[&str],
        ) -> Result<HashMap<String, String>, ProfileError> {
            Ok(self.users.get(&uid).map(|u| u.clone()).unwrap_or_default())
        }
    }

    /// Records what was materialized. Yields once per call so concurrent
    /// submits interleave.
    #[derive(Default)]
    struct MockContent {
        threads: std::sync::Mutex<Vec<Value>>,
        replies: std::sync::Mutex<Vec<Value>>,
        reject: AtomicBool,
    }

    #[async_trait]
    impl ContentCreator for MockContent {
        async fn create_thread(&self, data: &Submission) -> Result<CreatedThread, ContentError> {
            tokio::task::yield_now().await;
            if self.reject.load(Ordering::SeqCst) {
                return Err(ContentError::Invalid("content too short".to_string()));
            }
            self.threads.lock().unwrap().push(data.clone().into_value());
            Ok(CreatedThread {
                topic: json!({"tid": 1, "title": data.text("title")}),
                post: json!({"pid": 1, "tid": 1, "content": data.text("content")}),
            })
        }

        async fn create_reply(&self, data: &Submission) -> Result<Value, ContentError> {
            tokio::task::yield_now().await;
            if self.reject.load(Ordering::SeqCst) {
                return Err(ContentError::NoSuchTopic(10));
            }
            self.replies.lock().unwrap().push(data.clone().into_value());
            Ok(json!({"pid": 2, "tid": 10, "content": data.text("content")}))
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        sent: std::sync::Mutex<Vec<(SubmitterId, NotificationEvent)>>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify_new(
            &self,
            uid: SubmitterId,
            event: NotificationEvent,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((uid, event));
            Ok(())
        }
    }

    /// Hands out 1000, 1001, 1002, ...
    struct StepClock(AtomicI64);

    impl Clock for StepClock {
        fn now_millis(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    struct Harness {
        store: Arc<MockStore>,
        content: Arc<MockContent>,
        notifier: Arc<MockNotifier>,
        service: PostQueueService<Arc<MockStore>, MockProfiles, Arc<MockContent>, Arc<MockNotifier>>,
    }

    fn harness(settings: QueueSettings) -> Harness {
        let store = Arc::new(MockStore::default());
        let content = Arc::new(MockContent::default());
        let notifier = Arc::new(MockNotifier::default());
        let service = PostQueueService::new(
            Arc::clone(&store),
            MockProfiles::default(),
            Arc::clone(&content),
            Arc::clone(&notifier),
        )
        .with_clock(Arc::new(StepClock(AtomicI64::new(1000))))
        .with_settings(settings);

        Harness {
            store,
            content,
            notifier,
            service,
        }
    }

    fn submission(value: Value) -> Submission {
        Submission::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_guest_is_queued_even_with_queue_off() {
        let h = harness(QueueSettings::default());
        let data = submission(json!({"content": "hi"}));

        let queued = h
            .service
            .should_queue(SubmitterId::GUEST, &data, &SiteConfig::default())
            .await
            .unwrap();
        assert!(queued);
    }

    #[tokio::test]
    async fn test_enqueue_writes_index_and_record() {
        let h = harness(QueueSettings::default());
        let data = submission(json!({"uid": "5", "tid": 10, "content": "hello"}));

        let receipt = h.service.enqueue(&data).await.unwrap();

        assert!(receipt.queued);
        assert_eq!(receipt.message, "[[success:post-queued]]");
        assert_eq!(receipt.id, "post-1000");
        assert_eq!(
            h.store.sets.get(&(QUEUE_SET.to_string(), "post-1000".to_string())).map(|s| *s),
            Some(1000)
        );

        let stored = h.service.get_queued("post-1000").await.unwrap().unwrap();
        assert_eq!(stored.kind, SubmissionKind::Post);
        assert_eq!(stored.submitter, SubmitterId::new(5));
        assert_eq!(stored.decode_payload().unwrap(), data);
    }

    #[tokio::test]
    async fn test_enqueue_record_failure_leaves_orphan_index_entry() {
        let h = harness(QueueSettings::default());
        h.store.fail_record_writes.store(true, Ordering::SeqCst);

        let err = h
            .service
            .enqueue(&submission(json!({"uid": "5", "content": "x"})))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Storage(_)));
        assert_eq!(h.service.queue_len().await.unwrap(), 1);
        // The listing hides the orphan
        assert!(h.service.list_queue(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_twice_is_fine() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "content": "x"})))
            .await
            .unwrap();

        h.service.remove_from_queue(&receipt.id).await.unwrap();
        h.service.remove_from_queue(&receipt.id).await.unwrap();

        assert_eq!(h.service.queue_len().await.unwrap(), 0);
        assert!(h.store.records.is_empty());
    }

    #[tokio::test]
    async fn test_remove_record_failure_leaves_unlisted_record() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "content": "x"})))
            .await
            .unwrap();
        h.store.fail_deletes.store(true, Ordering::SeqCst);

        let err = h.service.remove_from_queue(&receipt.id).await.unwrap_err();

        assert!(matches!(err, QueueError::Storage(_)));
        assert_eq!(h.service.queue_len().await.unwrap(), 0);
        assert!(h.store.records.contains_key(&record_key(&receipt.id)));
        assert!(h.service.list_queue(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_read_failure_publishes_nothing() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 10, "content": "x"})))
            .await
            .unwrap();
        h.store.fail_reads.store(true, Ordering::SeqCst);

        let err = h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Storage(_)));
        assert!(h.content.replies.lock().unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(h.service.queue_len().await.unwrap(), 1);
        assert!(h.store.records.contains_key(&record_key(&receipt.id)));
    }

    #[tokio::test]
    async fn test_submit_unknown_id_is_noop() {
        let h = harness(QueueSettings::default());

        let outcome = h
            .service
            .submit_from_queue("post-42", &SiteConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::NotQueued);
        assert!(h.content.replies.lock().unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_reply_end_to_end() {
        let h = harness(QueueSettings::default());
        let data = submission(json!({"uid": "5", "tid": 10, "content": "hello"}));
        let receipt = h.service.enqueue(&data).await.unwrap();
        assert!(receipt.id.starts_with("post-"));

        let outcome = h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Published(PublishResult::Reply(_))));
        assert_eq!(*h.content.replies.lock().unwrap(), vec![data.into_value()]);
        assert!(h.service.get_queued(&receipt.id).await.unwrap().is_none());
        assert_eq!(h.service.queue_len().await.unwrap(), 0);

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SubmitterId::new(5));
        assert_eq!(sent[0].1.name(), "newPost");
    }

    #[tokio::test]
    async fn test_submit_topic_end_to_end() {
        let h = harness(QueueSettings::default());
        let data = submission(json!({"uid": "5", "title": "Hi", "content": "body"}));
        let receipt = h.service.enqueue(&data).await.unwrap();

        let stored = h.service.get_queued(&receipt.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, SubmissionKind::Topic);

        h.service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap();

        assert_eq!(h.content.threads.lock().unwrap().len(), 1);
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.name(), "newTopic");
        assert_eq!(h.service.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupted_payload_stays_queued() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "content": "x"})))
            .await
            .unwrap();

        let mut broken = RecordFields::new();
        broken.insert("data".to_string(), "{not json".to_string());
        h.store
            .set_record(&record_key(&receipt.id), &broken)
            .await
            .unwrap();
        let before = h.store.get_record(&record_key(&receipt.id)).await.unwrap();

        let err = h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Deserialization { .. }));
        assert_eq!(h.store.get_record(&record_key(&receipt.id)).await.unwrap(), before);
        assert_eq!(h.service.queue_len().await.unwrap(), 1);
        assert!(h.content.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_materialization_stays_queued() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 10, "content": "x"})))
            .await
            .unwrap();
        h.content.reject.store(true, Ordering::SeqCst);

        let err = h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Materialization(_)));
        assert!(h.service.get_queued(&receipt.id).await.unwrap().is_some());

        // A moderator retries once the topic problem is fixed
        h.content.reject.store(false, Ordering::SeqCst);
        h.service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap();
        assert_eq!(h.service.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_listing_follows_admission_order() {
        let h = harness(QueueSettings::default());
        let mut ids = Vec::new();
        for i in 0..5 {
            let data = if i % 2 == 0 {
                json!({"uid": "5", "title": format!("t{}", i), "content": "c"})
            } else {
                json!({"uid": "5", "tid": 3, "content": format!("r{}", i)})
            };
            ids.push(h.service.enqueue(&submission(data)).await.unwrap().id);
        }

        let listed: Vec<String> = h
            .service
            .list_queue(0, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(listed, ids);

        let page = h.service.list_queue(1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[1]);
        assert!(page[0].submission().is_some());
        assert_eq!(page[0].admitted_at, 1001);
    }

    #[tokio::test]
    async fn test_concurrent_submits_can_double_publish() {
        let h = harness(QueueSettings::default());
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 10, "content": "x"})))
            .await
            .unwrap();
        let config = SiteConfig::default();

        let (a, b) = tokio::join!(
            h.service.submit_from_queue(&receipt.id, &config),
            h.service.submit_from_queue(&receipt.id, &config)
        );
        a.unwrap();
        b.unwrap();

        // Accepted race: both saw the record before either removed it
        assert_eq!(h.content.replies.lock().unwrap().len(), 2);
        assert_eq!(h.service.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_serialized_submits_publish_once() {
        let h = harness(QueueSettings {
            serialize_submits: true,
        });
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 10, "content": "x"})))
            .await
            .unwrap();
        let config = SiteConfig::default();

        let (a, b) = tokio::join!(
            h.service.submit_from_queue(&receipt.id, &config),
            h.service.submit_from_queue(&receipt.id, &config)
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == SubmitOutcome::NotQueued)
                .count(),
            1
        );
        assert_eq!(h.content.replies.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
        assert!(h.service.submit_locks.inner.is_empty());
    }

    #[tokio::test]
    async fn test_lock_released_on_failure() {
        let h = harness(QueueSettings {
            serialize_submits: true,
        });
        let receipt = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 10, "content": "x"})))
            .await
            .unwrap();
        h.content.reject.store(true, Ordering::SeqCst);

        assert!(h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .is_err());
        assert!(h.service.submit_locks.inner.is_empty());

        h.content.reject.store(false, Ordering::SeqCst);
        let outcome = h
            .service
            .submit_from_queue(&receipt.id, &SiteConfig::default())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Published(_)));
    }

    #[tokio::test]
    async fn test_listing_keeps_unreadable_records_visible() {
        let h = harness(QueueSettings::default());
        let broken = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 3, "content": "a"})))
            .await
            .unwrap()
            .id;
        let good = h
            .service
            .enqueue(&submission(json!({"uid": "5", "tid": 3, "content": "b"})))
            .await
            .unwrap()
            .id;
        h.store
            .records
            .get_mut(&record_key(&broken))
            .unwrap()
            .remove("type");

        let listed = h.service.list_queue(0, 10).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, broken);
        match &listed[0].record {
            QueuedRecord::Unreadable { fields, reason } => {
                assert!(reason.contains("type"));
                assert_eq!(fields.get("id"), Some(&broken));
            }
            other => panic!("expected an unreadable record, got {:?}", other),
        }
        assert_eq!(listed[1].id, good);
        assert_eq!(listed[1].submission().unwrap().kind, SubmissionKind::Post);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_entry_is_reused_then_cleared() {
        let locks = SubmitLocks::default();
        let holder = locks.acquire("post-1").await;

        let mut waiter = Box::pin(locks.acquire("post-1"));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("lock is held"),
            _ = std::future::ready(()) => {}
        }

        drop(holder);
        drop(waiter);
        // Nobody holds it, but the entry outlives the abandoned waiter
        assert_eq!(locks.inner.len(), 1);

        drop(locks.acquire("post-1").await);
        assert!(locks.inner.is_empty());
    }
}
