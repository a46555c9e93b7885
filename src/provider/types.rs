//! Provider value types
//!
//! Metadata, listings and quota returned by providers. All are immutable
//! values created per call.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::path::CloudPath;

/// Kind of a remote item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Folder,
    Unknown,
}

/// Metadata for a single file or folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Base name (last path segment)
    pub name: String,
    /// Full path of the item
    pub path: CloudPath,
    pub item_type: ItemType,
    #[serde(default)]
    pub last_modified: Option<SystemTime>,
    /// Size in bytes, if known (usually absent for folders)
    #[serde(default)]
    pub size: Option<u64>,
}

impl ItemMetadata {
    pub fn file(path: CloudPath, size: u64, last_modified: Option<SystemTime>) -> Self {
        Self {
            name: path.file_name().unwrap_or_default().to_string(),
            path,
            item_type: ItemType::File,
            last_modified,
            size: Some(size),
        }
    }

    pub fn folder(path: CloudPath) -> Self {
        Self {
            name: path.file_name().unwrap_or_default().to_string(),
            path,
            item_type: ItemType::Folder,
            last_modified: None,
            size: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    pub items: Vec<ItemMetadata>,
    /// Token for the next page; `None` on the last page
    pub next_page_token: Option<String>,
}

impl ItemList {
    pub fn new(items: Vec<ItemMetadata>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token,
        }
    }

    /// New list holding these items followed by `more`, continuing at `next_page_token`
    pub fn add(&self, more: impl IntoIterator<Item = ItemMetadata>, next_page_token: Option<String>) -> Self {
        let mut items = self.items.clone();
        items.extend(more);
        Self {
            items,
            next_page_token,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Storage quota for a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub available_bytes: u64,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub used_bytes: Option<u64>,
}

impl Quota {
    pub fn new(available_bytes: u64, total_bytes: Option<u64>, used_bytes: Option<u64>) -> Self {
        Self {
            available_bytes,
            total_bytes,
            used_bytes,
        }
    }
}
