// The core module contains all business logic.
// No database or transport code here; infra implements the ports.

#[path = "queue/mod.rs"]
pub mod queue;
