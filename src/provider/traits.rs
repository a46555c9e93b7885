//! The CloudProvider contract
//!
//! Implemented by remote backends and by every cache decorator in this crate,
//! so decorators nest freely and look like a backend to whatever wraps them.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::SystemTime;

use super::errors::CloudResult;
use super::types::{ItemList, ItemMetadata, Quota};
use crate::path::CloudPath;

/// Async, path-keyed storage backend
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Metadata for a single item. Fails with `NotFound` if absent.
    async fn item_metadata(&self, path: &CloudPath) -> CloudResult<ItemMetadata>;

    /// One page of a folder listing, starting at `page_token` when given
    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> CloudResult<ItemList>;

    async fn quota(&self, folder: &CloudPath) -> CloudResult<Quota>;

    /// Read `count` bytes starting at `offset`; `None` reads to the end
    async fn read(&self, file: &CloudPath, offset: u64, count: Option<u64>) -> CloudResult<Bytes>;

    /// Write a file. With `replace == false` an existing file is `AlreadyExists`.
    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: Bytes,
        size: u64,
        last_modified: Option<SystemTime>,
    ) -> CloudResult<ItemMetadata>;

    async fn create_folder(&self, folder: &CloudPath) -> CloudResult<CloudPath>;

    async fn delete_file(&self, file: &CloudPath) -> CloudResult<()>;

    async fn delete_folder(&self, folder: &CloudPath) -> CloudResult<()>;

    /// Move `source` to `target`, returning the target path
    async fn move_item(
        &self,
        source: &CloudPath,
        target: &CloudPath,
        replace: bool,
    ) -> CloudResult<CloudPath>;

    /// Whether this backend wants the coalescing cache stack
    fn caching_capability(&self) -> bool {
        false
    }
}

#[async_trait]
impl<P: CloudProvider + ?Sized> CloudProvider for Arc<P> {
    async fn item_metadata(&self, path: &CloudPath) -> CloudResult<ItemMetadata> {
        (**self).item_metadata(path).await
    }

    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> CloudResult<ItemList> {
        (**self).list(folder, page_token).await
    }

    async fn quota(&self, folder: &CloudPath) -> CloudResult<Quota> {
        (**self).quota(folder).await
    }

    async fn read(&self, file: &CloudPath, offset: u64, count: Option<u64>) -> CloudResult<Bytes> {
        (**self).read(file, offset, count).await
    }

    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: Bytes,
        size: u64,
        last_modified: Option<SystemTime>,
    ) -> CloudResult<ItemMetadata> {
        (**self)
            .write(file, replace, data, size, last_modified)
            .await
    }

    async fn create_folder(&self, folder: &CloudPath) -> CloudResult<CloudPath> {
        (**self).create_folder(folder).await
    }

    async fn delete_file(&self, file: &CloudPath) -> CloudResult<()> {
        (**self).delete_file(file).await
    }

    async fn delete_folder(&self, folder: &CloudPath) -> CloudResult<()> {
        (**self).delete_folder(folder).await
    }

    async fn move_item(
        &self,
        source: &CloudPath,
        target: &CloudPath,
        replace: bool,
    ) -> CloudResult<CloudPath> {
        (**self).move_item(source, target, replace).await
    }

    fn caching_capability(&self) -> bool {
        (**self).caching_capability()
    }
}
