// Shared SQLite connection setup for every store in this crate.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Open (creating if needed) the database at `database_url`.
///
/// Accepts a bare file path or a `sqlite:` URL. In-memory databases get a
/// single connection that is never recycled, since each connection would
/// otherwise see its own empty database.
pub async fn connect(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let in_memory = database_url.contains(":memory:");

    // Ensure the file exists if it's a file path
    let path_str = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if !in_memory && !Path::new(path_str).exists() {
        if let Some(parent) = Path::new(path_str).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(path_str)?;
    }

    let conn_str = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    let mut options = SqlitePoolOptions::new().max_connections(5);
    if in_memory {
        // The database lives exactly as long as its one connection.
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = options.connect(&conn_str).await?;

    Ok(pool)
}
