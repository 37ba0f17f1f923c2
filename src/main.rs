// Moderator command line for the post queue.
//
// This file's job is to:
// 1. Load configuration (.env, environment, command line)
// 2. Open the database and build the stores
// 3. Wire everything into the queue service (dependency injection)
// 4. Run one moderation command

use anyhow::Context;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use post_queue::core::queue::{
    PostQueueService, QueueSettings, QueuedRecord, SiteConfigStore, Submission, SubmitOutcome,
    SubmitterId,
};
use post_queue::infra::content::SqliteContentStore;
use post_queue::infra::notify::BroadcastNotifier;
use post_queue::infra::profiles::SqliteProfileStore;
use post_queue::infra::queue::SqliteQueueStore;
use post_queue::infra::site_config::SqliteSiteConfigStore;
use post_queue::infra::sqlite;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "post-queue", version, about = "Review submissions held for moderation")]
struct Cli {
    /// SQLite database holding the queue, users, settings and content
    #[arg(long, env = "POST_QUEUE_DB", default_value = "data/post_queue.db")]
    database: String,

    /// Let only one approval of a given item run at a time
    #[arg(long, env = "POST_QUEUE_SERIALIZE_SUBMITS")]
    serialize_submits: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Would a submission from this uid be held for review?
    Check { uid: String },
    /// Hold a submission, given as a JSON object
    Enqueue { json: String },
    /// Show queued submissions, oldest first
    List {
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Approve a queued submission and publish it
    Submit { id: String },
    /// Reject a queued submission
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging; RUST_LOG controls verbosity
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let pool = sqlite::connect(&cli.database)
        .await
        .with_context(|| format!("Failed to open database at {}", cli.database))?;

    let queue_store = SqliteQueueStore::new(pool.clone());
    queue_store.migrate().await?;
    let profiles = SqliteProfileStore::new(pool.clone());
    profiles.migrate().await?;
    let settings = SqliteSiteConfigStore::new(pool.clone());
    settings.migrate().await?;
    let content = SqliteContentStore::new(pool.clone());
    content.migrate().await?;

    let notifier = Arc::new(BroadcastNotifier::new(64));
    let mut observer = notifier.subscribe();

    let service = PostQueueService::new(queue_store, profiles, content, Arc::clone(&notifier))
        .with_settings(QueueSettings {
            serialize_submits: cli.serialize_submits,
        });

    // Fresh snapshot per run
    let site_config = settings.load_site_config().await?;
    tracing::debug!(?site_config, "Loaded site settings");

    // ========================================================================
    // COMMANDS
    // ========================================================================

    match cli.command {
        Command::Check { uid } => {
            let submitter = SubmitterId::from_raw(&uid);
            let queued = service
                .should_queue(submitter, &Submission::default(), &site_config)
                .await?;
            println!("{}", if queued { "queue" } else { "publish" });
        }
        Command::Enqueue { json } => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("Submission is not valid JSON")?;
            let data = Submission::from_value(value).context("Submission must be a JSON object")?;
            let receipt = service.enqueue(&data).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::List { start, limit } => {
            let entries = service.list_queue(start, limit).await?;
            if entries.is_empty() {
                println!("Queue is empty");
            }
            for entry in entries {
                let admitted = DateTime::from_timestamp_millis(entry.admitted_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| entry.admitted_at.to_string());
                match &entry.record {
                    QueuedRecord::Readable(submission) => println!(
                        "{}\t{}\tuid={}\t{}\t{}",
                        entry.id, submission.kind, submission.submitter, admitted, submission.payload
                    ),
                    QueuedRecord::Unreadable { fields, reason } => println!(
                        "{}\tunreadable ({})\t{}\t{:?}",
                        entry.id, reason, admitted, fields
                    ),
                }
            }
        }
        Command::Submit { id } => {
            match service.submit_from_queue(&id, &site_config).await? {
                SubmitOutcome::NotQueued => println!("Nothing queued under {}", id),
                SubmitOutcome::Published(_) => println!("Published {}", id),
            }
            while let Ok(notification) = observer.try_recv() {
                println!("{}", serde_json::to_string(&notification)?);
            }
        }
        Command::Remove { id } => {
            service.remove_from_queue(&id).await?;
            println!("Removed {}", id);
        }
    }

    pool.close().await;
    Ok(())
}
