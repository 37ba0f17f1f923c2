// Post queue domain models.
//
// Pure data types: no storage or transport dependencies. Records are flattened
// to string fields at the storage boundary and rebuilt here.

use super::coercion::{coerce_flag, coerce_int, coerce_value_int, is_truthy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ordered index holding every queued id, scored by admission time in ms.
pub const QUEUE_SET: &str = "post:queue";

/// Token returned to the submitter when their post was held for review.
pub const QUEUED_MESSAGE: &str = "[[success:post-queued]]";

/// Storage key of the record behind a queued id.
pub fn record_key(id: &str) -> String {
    format!("{}:{}", QUEUE_SET, id)
}

/// Flat field map as the storage engine keeps it.
pub type RecordFields = BTreeMap<String, String>;

// ============================================================================
// SUBMISSIONS
// ============================================================================

/// What a queued submission turns into once approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    /// A new discussion thread
    Topic,
    /// A reply to an existing thread
    Post,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Topic => "topic",
            SubmissionKind::Post => "post",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topic" => Ok(SubmissionKind::Topic),
            "post" => Ok(SubmissionKind::Post),
            other => Err(format!("unknown submission kind '{}'", other)),
        }
    }
}

/// Account id of whoever produced a submission.
///
/// Zero is the unauthenticated sentinel; anything that doesn't parse as a
/// number collapses to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubmitterId(i64);

impl SubmitterId {
    pub const GUEST: SubmitterId = SubmitterId(0);

    pub fn new(uid: i64) -> Self {
        Self(uid)
    }

    pub fn from_raw(raw: &str) -> Self {
        Self(coerce_int(raw))
    }

    pub fn from_value(value: &Value) -> Self {
        Self(coerce_value_int(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The submitted data: title, content, target thread and whatever else the
/// content subsystem needs. Kept as an opaque JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission(Map<String, Value>);

impl Submission {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value. Only objects are submissions.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A field as a string slice, if it is one.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn submitter(&self) -> SubmitterId {
        self.0
            .get("uid")
            .map(SubmitterId::from_value)
            .unwrap_or(SubmitterId::GUEST)
    }

    /// Anything with a title starts a thread; everything else is a reply.
    pub fn kind(&self) -> SubmissionKind {
        match self.0.get("title") {
            Some(title) if is_truthy(title) => SubmissionKind::Topic,
            _ => SubmissionKind::Post,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

// ============================================================================
// QUEUE RECORDS
// ============================================================================

/// A submission as it sits in the queue, payload still encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSubmission {
    pub id: String,
    pub submitter: SubmitterId,
    pub kind: SubmissionKind,
    /// JSON text of the original [`Submission`]
    pub payload: String,
}

/// Why a stored record could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record is missing field '{0}'")]
    MissingField(&'static str),
    #[error("{0}")]
    BadKind(String),
}

impl QueuedSubmission {
    /// Stored envelope. `uid` is the coerced submitter, so a non-numeric
    /// payload uid is written as `0`; the raw value survives in `data`.
    pub fn to_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        fields.insert("id".to_string(), self.id.clone());
        fields.insert("uid".to_string(), self.submitter.to_string());
        fields.insert("type".to_string(), self.kind.to_string());
        fields.insert("data".to_string(), self.payload.clone());
        fields
    }

    pub fn from_fields(mut fields: RecordFields) -> Result<Self, RecordError> {
        let id = fields
            .remove("id")
            .ok_or(RecordError::MissingField("id"))?;
        let kind = fields
            .get("type")
            .ok_or(RecordError::MissingField("type"))?
            .parse()
            .map_err(RecordError::BadKind)?;
        let payload = fields
            .remove("data")
            .ok_or(RecordError::MissingField("data"))?;
        let submitter = fields
            .get("uid")
            .map(|raw| SubmitterId::from_raw(raw))
            .unwrap_or(SubmitterId::GUEST);

        Ok(Self {
            id,
            submitter,
            kind,
            payload,
        })
    }

    pub fn decode_payload(&self) -> serde_json::Result<Submission> {
        serde_json::from_str(&self.payload)
    }
}

/// One row of the moderation listing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: String,
    /// Admission time, ms since the epoch
    pub admitted_at: i64,
    pub record: QueuedRecord,
}

/// What the listing found behind an index entry.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedRecord {
    Readable(QueuedSubmission),
    /// Envelope could not be rebuilt; raw fields kept for manual repair.
    Unreadable { fields: RecordFields, reason: String },
}

impl QueueEntry {
    pub fn submission(&self) -> Option<&QueuedSubmission> {
        match &self.record {
            QueuedRecord::Readable(submission) => Some(submission),
            QueuedRecord::Unreadable { .. } => None,
        }
    }
}

/// Acknowledgment returned by enqueue.
///
/// `id` is an addition over the bare `{queued, message}` pair so callers that
/// need to address the record later don't have to reconstruct it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueReceipt {
    pub queued: bool,
    pub message: String,
    pub id: String,
}

impl QueueReceipt {
    pub fn queued(id: String) -> Self {
        Self {
            queued: true,
            message: QUEUED_MESSAGE.to_string(),
            id,
        }
    }
}

// ============================================================================
// SITE CONFIGURATION
// ============================================================================

pub const POST_QUEUE_KEY: &str = "postQueue";
pub const REPUTATION_DISABLED_KEY: &str = "reputation:disabled";
pub const DOWNVOTE_DISABLED_KEY: &str = "downvote:disabled";

/// Typed snapshot of the site-wide settings this queue reads.
///
/// Refreshing it is the caller's job; operations take it by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Hold posts from brand-new, zero-reputation accounts
    pub post_queue: bool,
    pub reputation_disabled: bool,
    pub downvote_disabled: bool,
}

impl SiteConfig {
    /// Build from raw stored settings. Missing or malformed values are off.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let flag = |key: &str| raw.get(key).map(|v| coerce_flag(v)).unwrap_or(false);
        Self {
            post_queue: flag(POST_QUEUE_KEY),
            reputation_disabled: flag(REPUTATION_DISABLED_KEY),
            downvote_disabled: flag(DOWNVOTE_DISABLED_KEY),
        }
    }
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Real-time event pushed to observers once a queued item goes live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotificationEvent {
    NewTopic {
        posts: Vec<Value>,
        topic: Value,
    },
    NewPost {
        posts: Vec<Value>,
        #[serde(rename = "reputation:disabled")]
        reputation_disabled: bool,
        #[serde(rename = "downvote:disabled")]
        downvote_disabled: bool,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::NewTopic { .. } => "newTopic",
            NotificationEvent::NewPost { .. } => "newPost",
        }
    }
}
