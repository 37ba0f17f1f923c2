// Implementations of the queue storage engine.

pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryQueueStore;
pub use sqlite_store::SqliteQueueStore;
