//! SQLite persistence.

pub mod session_repository;

pub use session_repository::SqliteSessionStore;
