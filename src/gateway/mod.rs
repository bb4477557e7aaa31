//! Filesystem backend consumed by the canvas.
//!
//! Every call is asynchronous and may fail on its own; a failure never poisons
//! the session. Paths cross this boundary in [`CanonicalPath`] form and each
//! implementation converts to native paths internally.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::GatewayError;
use crate::path::CanonicalPath;

pub mod local;
pub mod memory;

pub use local::LocalGateway;
pub use memory::MemoryGateway;

/// One child of a listed folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: CanonicalPath,
    pub is_dir: bool,
    pub size: Option<u64>,
    /// Milliseconds since the Unix epoch.
    pub created_at: Option<u64>,
    /// Milliseconds since the Unix epoch.
    pub modified_at: Option<u64>,
}

impl DirEntry {
    pub fn folder(path: CanonicalPath) -> Self {
        Self {
            name: path.basename().to_string(),
            path,
            is_dir: true,
            size: None,
            created_at: None,
            modified_at: None,
        }
    }

    pub fn file(path: CanonicalPath, size: u64) -> Self {
        Self {
            name: path.basename().to_string(),
            path,
            is_dir: false,
            size: Some(size),
            created_at: None,
            modified_at: None,
        }
    }
}

/// Properties of one item. `size` is recursive for folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: CanonicalPath,
    pub is_dir: bool,
    pub size: u64,
    pub created_at: Option<u64>,
    pub modified_at: Option<u64>,
}

/// Which operation family a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

impl TransferMode {
    pub fn verb(&self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

pub trait FsGateway: Send + Sync + 'static {
    fn list_children(
        &self,
        path: &CanonicalPath,
    ) -> impl Future<Output = GatewayResult<Vec<DirEntry>>> + Send;

    fn is_directory(&self, path: &CanonicalPath) -> impl Future<Output = GatewayResult<bool>> + Send;

    fn file_info(&self, path: &CanonicalPath) -> impl Future<Output = GatewayResult<FileInfo>> + Send;

    fn create_folder(
        &self,
        parent: &CanonicalPath,
        name: &str,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn create_file(
        &self,
        parent: &CanonicalPath,
        name: &str,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn delete_item(&self, path: &CanonicalPath) -> impl Future<Output = GatewayResult<()>> + Send;

    fn rename_item(
        &self,
        path: &CanonicalPath,
        new_name: &str,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn move_file(
        &self,
        src: &CanonicalPath,
        dest_folder: &CanonicalPath,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn copy_file(
        &self,
        src: &CanonicalPath,
        dest_folder: &CanonicalPath,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn move_folder(
        &self,
        src: &CanonicalPath,
        dest_folder: &CanonicalPath,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;

    fn copy_folder(
        &self,
        src: &CanonicalPath,
        dest_folder: &CanonicalPath,
    ) -> impl Future<Output = GatewayResult<CanonicalPath>> + Send;
}

/// Directory check where a failed query counts as "not a folder".
pub async fn is_directory_or_false<G: FsGateway>(gateway: &G, path: &CanonicalPath) -> bool {
    match gateway.is_directory(path).await {
        Ok(is_dir) => is_dir,
        Err(err) => {
            tracing::warn!(%path, %err, "is_directory failed, treating as file");
            false
        }
    }
}

/// Dispatch to the file or folder variant of a copy/move.
pub async fn transfer<G: FsGateway>(
    gateway: &G,
    mode: TransferMode,
    src_is_dir: bool,
    src: &CanonicalPath,
    dest_folder: &CanonicalPath,
) -> GatewayResult<CanonicalPath> {
    match (mode, src_is_dir) {
        (TransferMode::Copy, false) => gateway.copy_file(src, dest_folder).await,
        (TransferMode::Copy, true) => gateway.copy_folder(src, dest_folder).await,
        (TransferMode::Move, false) => gateway.move_file(src, dest_folder).await,
        (TransferMode::Move, true) => gateway.move_folder(src, dest_folder).await,
    }
}
