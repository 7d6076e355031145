//! Tracked media items (gallery photos, uploaded media files).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The two content collections whose items count toward storage usage.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Gallery,
    MediaFiles,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Gallery => "gallery",
            Collection::MediaFiles => "media_files",
        }
    }
}

/// A single tracked content item.
///
/// The row stores metadata only; the payload lives as a file under the blob
/// root, addressed through `url`. `file_size` is nullable because legacy rows
/// were written before sizes were recorded — the aggregator counts those as 0.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MediaItem {
    pub id: Uuid,

    /// Which tracked collection the item belongs to.
    pub collection: Collection,

    pub title: Option<String>,

    /// Size of the backing file in bytes, if known.
    pub file_size: Option<i64>,

    /// Public URL of the backing file; the blob path is derived from it.
    pub url: Option<String>,

    /// Published items are protected during cleanup until every unpublished
    /// item has been considered.
    pub is_published: bool,

    pub created_at: DateTime<Utc>,
}

impl MediaItem {
    /// Size contribution toward the quota; missing sizes count as zero.
    pub fn size_or_zero(&self) -> i64 {
        self.file_size.unwrap_or(0).max(0)
    }
}
