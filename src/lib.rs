// Moderation admission queue for user-submitted topics and replies.
//
// - `core/` = queue logic and the ports it needs (storage, profiles, content, notifications)
// - `infra/` = SQLite, in-memory and broadcast implementations of those ports

// Descriptive root files instead of a pile of identical mod.rs files.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;
