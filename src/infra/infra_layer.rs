// The infra module contains implementations of core traits.
// Each concern gets its own submodule.

pub mod sqlite;

#[path = "queue/mod.rs"]
pub mod queue;

#[path = "profiles/sqlite_profile_store.rs"]
pub mod profiles;

#[path = "site_config/sqlite_config_store.rs"]
pub mod site_config;

#[path = "content/sqlite_content_store.rs"]
pub mod content;

#[path = "notify/broadcast_notifier.rs"]
pub mod notify;
