//! Data models for the storage-quota housekeeping service.
//!
//! These entities mirror the persisted layout: tracked media items, the
//! singleton quota record, and outbound alert mail. They map to SQLite rows
//! via `sqlx::FromRow` and serialize as JSON via `serde` where a row crosses
//! the HTTP boundary.

pub mod mail;
pub mod media;
pub mod quota;
