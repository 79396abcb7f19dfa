//! docn-store - SQLite vector store adapter
//!
//! Persists vectors and their metadata in SQLite and serves the
//! [`VectorStore`](docn_core::VectorStore) contract with an exact scan.
//! Only flat indexes are supported.

mod schema;
mod sqlite;

pub use sqlite::SqliteVectorStore;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
