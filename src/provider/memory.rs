//! In-memory provider
//!
//! A complete `CloudProvider` held in a `BTreeMap`. Used as the reference
//! backend in tests and wherever the caches are embedded without a remote.
//! Counts calls per operation and can add artificial latency so coalescing
//! and expiry behaviour are observable.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tracing::trace;

use super::errors::{CloudError, CloudResult};
use super::traits::CloudProvider;
use super::types::{ItemList, ItemMetadata, Quota};
use crate::path::CloudPath;

/// Default number of items per listing page
const DEFAULT_PAGE_SIZE: usize = 100;

/// Provider operations, used to read call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ItemMetadata,
    List,
    Quota,
    Read,
    Write,
    CreateFolder,
    DeleteFile,
    DeleteFolder,
    Move,
}

const OPERATION_COUNT: usize = 9;

#[derive(Debug, Clone)]
enum Entry {
    Folder,
    File {
        data: Bytes,
        last_modified: Option<SystemTime>,
    },
}

/// Provider storing everything in process memory
pub struct InMemoryProvider {
    entries: RwLock<BTreeMap<CloudPath, Entry>>,
    /// `None` means quota is not available
    quota: RwLock<Option<CloudResult<Quota>>>,
    calls: [AtomicUsize; OPERATION_COUNT],
    latency: Option<Duration>,
    page_size: usize,
    caching_capability: bool,
}

impl InMemoryProvider {
    /// Empty provider containing only the root folder
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(CloudPath::root(), Entry::Folder);
        Self {
            entries: RwLock::new(entries),
            quota: RwLock::new(None),
            calls: Default::default(),
            latency: None,
            page_size: DEFAULT_PAGE_SIZE,
            caching_capability: false,
        }
    }

    /// Delay every operation by `latency` before it touches storage
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Advertise support for the coalescing cache stack
    pub fn with_caching_capability(mut self, enabled: bool) -> Self {
        self.caching_capability = enabled;
        self
    }

    /// Set the outcome of subsequent quota calls (`None` = not available)
    pub fn set_quota(&self, quota: Option<CloudResult<Quota>>) {
        *self.quota.write() = quota;
    }

    /// Insert a folder and any missing ancestors, bypassing counters
    pub fn seed_folder(&self, path: &str) {
        let path = CloudPath::new(path);
        let mut entries = self.entries.write();
        Self::insert_ancestors(&mut entries, &path);
        entries.insert(path, Entry::Folder);
    }

    /// Insert a file and any missing ancestors, bypassing counters
    pub fn seed_file(&self, path: &str, data: impl Into<Bytes>) {
        let path = CloudPath::new(path);
        let mut entries = self.entries.write();
        Self::insert_ancestors(&mut entries, &path);
        entries.insert(
            path,
            Entry::File {
                data: data.into(),
                last_modified: Some(SystemTime::now()),
            },
        );
    }

    /// Number of calls made to `op` so far
    pub fn calls(&self, op: Operation) -> usize {
        self.calls[op as usize].load(Ordering::SeqCst)
    }

    /// Whether `path` currently exists
    pub fn contains(&self, path: &CloudPath) -> bool {
        self.entries.read().contains_key(path)
    }

    fn insert_ancestors(entries: &mut BTreeMap<CloudPath, Entry>, path: &CloudPath) {
        let mut ancestor = path.parent();
        while let Some(p) = ancestor {
            ancestor = p.parent();
            entries.entry(p).or_insert(Entry::Folder);
        }
    }

    async fn enter(&self, op: Operation, path: &CloudPath) {
        self.calls[op as usize].fetch_add(1, Ordering::SeqCst);
        trace!(op = ?op, path = %path, "in-memory provider call");
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn metadata_of(path: &CloudPath, entry: &Entry) -> ItemMetadata {
        match entry {
            Entry::Folder => ItemMetadata::folder(path.clone()),
            Entry::File {
                data,
                last_modified,
            } => ItemMetadata::file(path.clone(), data.len() as u64, *last_modified),
        }
    }

    fn require_folder(entries: &BTreeMap<CloudPath, Entry>, folder: &CloudPath) -> CloudResult<()> {
        match entries.get(folder) {
            Some(Entry::Folder) => Ok(()),
            Some(Entry::File { .. }) => Err(CloudError::TypeMismatch(folder.clone())),
            None => Err(CloudError::NotFound(folder.clone())),
        }
    }

    fn require_parent(entries: &BTreeMap<CloudPath, Entry>, path: &CloudPath) -> CloudResult<()> {
        match path.parent() {
            Some(parent) => Self::require_folder(entries, &parent),
            None => Err(CloudError::AlreadyExists(path.clone())),
        }
    }

    fn remove_subtree(entries: &mut BTreeMap<CloudPath, Entry>, root: &CloudPath) {
        entries.retain(|key, _| !key.starts_with(root));
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    async fn item_metadata(&self, path: &CloudPath) -> CloudResult<ItemMetadata> {
        self.enter(Operation::ItemMetadata, path).await;
        let entries = self.entries.read();
        entries
            .get(path)
            .map(|entry| Self::metadata_of(path, entry))
            .ok_or_else(|| CloudError::NotFound(path.clone()))
    }

    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> CloudResult<ItemList> {
        self.enter(Operation::List, folder).await;
        let entries = self.entries.read();
        Self::require_folder(&entries, folder)?;

        let children: Vec<ItemMetadata> = entries
            .iter()
            .filter(|(key, _)| key.parent().as_ref() == Some(folder))
            .map(|(key, entry)| Self::metadata_of(key, entry))
            .collect();

        let start = match page_token {
            None => 0,
            Some(token) => match token.parse::<usize>() {
                Ok(start) if start <= children.len() => start,
                _ => return Err(CloudError::InvalidPageToken(token.to_string())),
            },
        };

        let end = (start + self.page_size).min(children.len());
        let next = (end < children.len()).then(|| end.to_string());
        Ok(ItemList::new(children[start..end].to_vec(), next))
    }

    async fn quota(&self, folder: &CloudPath) -> CloudResult<Quota> {
        self.enter(Operation::Quota, folder).await;
        Self::require_folder(&self.entries.read(), folder)?;
        match &*self.quota.read() {
            Some(outcome) => outcome.clone(),
            None => Err(CloudError::QuotaNotAvailable(folder.clone())),
        }
    }

    async fn read(&self, file: &CloudPath, offset: u64, count: Option<u64>) -> CloudResult<Bytes> {
        self.enter(Operation::Read, file).await;
        let entries = self.entries.read();
        match entries.get(file) {
            Some(Entry::File { data, .. }) => {
                let len = data.len() as u64;
                let start = offset.min(len);
                let end = count.map_or(len, |c| start.saturating_add(c).min(len));
                Ok(data.slice(start as usize..end as usize))
            }
            Some(Entry::Folder) => Err(CloudError::TypeMismatch(file.clone())),
            None => Err(CloudError::NotFound(file.clone())),
        }
    }

    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: Bytes,
        _size: u64,
        last_modified: Option<SystemTime>,
    ) -> CloudResult<ItemMetadata> {
        self.enter(Operation::Write, file).await;
        let mut entries = self.entries.write();
        Self::require_parent(&entries, file)?;
        match entries.get(file) {
            Some(Entry::Folder) => return Err(CloudError::TypeMismatch(file.clone())),
            Some(Entry::File { .. }) if !replace => {
                return Err(CloudError::AlreadyExists(file.clone()))
            }
            _ => {}
        }

        let entry = Entry::File {
            data,
            last_modified: last_modified.or_else(|| Some(SystemTime::now())),
        };
        let metadata = Self::metadata_of(file, &entry);
        entries.insert(file.clone(), entry);
        Ok(metadata)
    }

    async fn create_folder(&self, folder: &CloudPath) -> CloudResult<CloudPath> {
        self.enter(Operation::CreateFolder, folder).await;
        let mut entries = self.entries.write();
        if entries.contains_key(folder) {
            return Err(CloudError::AlreadyExists(folder.clone()));
        }
        Self::require_parent(&entries, folder)?;
        entries.insert(folder.clone(), Entry::Folder);
        Ok(folder.clone())
    }

    async fn delete_file(&self, file: &CloudPath) -> CloudResult<()> {
        self.enter(Operation::DeleteFile, file).await;
        let mut entries = self.entries.write();
        match entries.get(file) {
            Some(Entry::File { .. }) => {
                entries.remove(file);
                Ok(())
            }
            Some(Entry::Folder) => Err(CloudError::TypeMismatch(file.clone())),
            None => Err(CloudError::NotFound(file.clone())),
        }
    }

    async fn delete_folder(&self, folder: &CloudPath) -> CloudResult<()> {
        self.enter(Operation::DeleteFolder, folder).await;
        if folder.is_root() {
            return Err(CloudError::provider("cannot delete the root folder"));
        }
        let mut entries = self.entries.write();
        Self::require_folder(&entries, folder)?;
        Self::remove_subtree(&mut entries, folder);
        Ok(())
    }

    async fn move_item(
        &self,
        source: &CloudPath,
        target: &CloudPath,
        replace: bool,
    ) -> CloudResult<CloudPath> {
        self.enter(Operation::Move, source).await;
        let mut entries = self.entries.write();
        if !entries.contains_key(source) {
            return Err(CloudError::NotFound(source.clone()));
        }
        if target.starts_with(source) {
            return Err(CloudError::provider(format!(
                "cannot move {} into itself ({})",
                source, target
            )));
        }
        if entries.contains_key(target) {
            if !replace {
                return Err(CloudError::AlreadyExists(target.clone()));
            }
            Self::remove_subtree(&mut entries, target);
        }
        Self::require_parent(&entries, target)?;

        let moved: Vec<CloudPath> = entries
            .keys()
            .filter(|key| key.starts_with(source))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let relative = source
                    .relativize(&key)
                    .map_err(CloudError::provider)?;
                entries.insert(target.resolve(&relative), entry);
            }
        }
        Ok(target.clone())
    }

    fn caching_capability(&self) -> bool {
        self.caching_capability
    }
}
