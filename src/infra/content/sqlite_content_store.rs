// SQLite content store - where approved submissions end up as live threads
// and replies.
//
// Tables:
// - topics: one row per thread, pointing at its first post
// - posts: every post, first posts included

use crate::core::queue::coercion::coerce_value_int;
use crate::core::queue::{ContentCreator, ContentError, CreatedThread, Submission};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteContentStore {
    pool: Pool<Sqlite>,
}

fn store_err(e: sqlx::Error) -> ContentError {
    ContentError::Store(e.to_string())
}

/// Non-blank `content`, required on every post.
fn required_content(data: &Submission) -> Result<&str, ContentError> {
    match data.text("content").map(str::trim) {
        Some(content) if !content.is_empty() => Ok(content),
        _ => Err(ContentError::Invalid("content is required".to_string())),
    }
}

impl SqliteContentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                tid INTEGER PRIMARY KEY AUTOINCREMENT,
                uid INTEGER NOT NULL,
                title TEXT NOT NULL,
                main_pid INTEGER,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                pid INTEGER PRIMARY KEY AUTOINCREMENT,
                tid INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of posts in a thread, first post included.
    pub async fn post_count(&self, tid: i64) -> Result<i64, ContentError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM posts WHERE tid = ?")
            .bind(tid)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.get("n"))
    }

    pub async fn topic_count(&self) -> Result<i64, ContentError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM topics")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl ContentCreator for SqliteContentStore {
    async fn create_thread(&self, data: &Submission) -> Result<CreatedThread, ContentError> {
        let title = match data.text("title").map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => return Err(ContentError::Invalid("title is required".to_string())),
        };
        let content = required_content(data)?;
        let uid = data.submitter().get();
        let timestamp = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let tid = sqlx::query("INSERT INTO topics (uid, title, timestamp) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(title)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?
            .last_insert_rowid();

        let pid = sqlx::query(
            "INSERT INTO posts (tid, uid, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(tid)
        .bind(uid)
        .bind(content)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?
        .last_insert_rowid();

        sqlx::query("UPDATE topics SET main_pid = ? WHERE tid = ?")
            .bind(pid)
            .bind(tid)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        tracing::debug!(tid, pid, uid, "Thread created");
        Ok(CreatedThread {
            topic: json!({
                "tid": tid,
                "uid": uid,
                "title": title,
                "mainPid": pid,
                "timestamp": timestamp,
            }),
            post: json!({
                "pid": pid,
                "tid": tid,
                "uid": uid,
                "content": content,
                "timestamp": timestamp,
            }),
        })
    }

    async fn create_reply(&self, data: &Submission) -> Result<Value, ContentError> {
        let tid = data.field("tid").map(coerce_value_int).unwrap_or(0);
        let content = required_content(data)?;
        let uid = data.submitter().get();

        let exists = sqlx::query("SELECT 1 FROM topics WHERE tid = ?")
            .bind(tid)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .is_some();
        if !exists {
            return Err(ContentError::NoSuchTopic(tid));
        }

        let timestamp = Utc::now().to_rfc3339();
        let pid = sqlx::query(
            "INSERT INTO posts (tid, uid, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(tid)
        .bind(uid)
        .bind(content)
        .bind(&timestamp)
        .execute(&self.pool)
        .await
        .map_err(store_err)?
        .last_insert_rowid();

        tracing::debug!(tid, pid, uid, "Reply created");
        Ok(json!({
            "pid": pid,
            "tid": tid,
            "uid": uid,
            "content": content,
            "timestamp": timestamp,
        }))
    }
}
