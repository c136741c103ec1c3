//! Storage module
//!
//! The local mirror: a small key/value interface, its SQLite and in-memory
//! implementations, and the JSON subscription list kept on top of it.

pub mod kv;
pub mod mirror;

pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use mirror::LocalMirror;
