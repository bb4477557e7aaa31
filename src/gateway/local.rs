use jwalk::WalkDir;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{DirEntry, FileInfo, FsGateway, GatewayResult};
use crate::error::GatewayError;
use crate::path::CanonicalPath;

/// Gateway backed by the native filesystem.
///
/// Cheap reads go through `tokio::fs`; recursive folder copies run on a
/// blocking thread, discovering the tree with `jwalk` and copying files on a
/// rayon pool.
#[derive(Debug, Clone)]
pub struct LocalGateway {
    show_hidden: bool,
}

impl Default for LocalGateway {
    fn default() -> Self {
        Self::new(false)
    }
}

fn millis(time: std::io::Result<SystemTime>) -> Option<u64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
}

fn entry_from_metadata(path: CanonicalPath, metadata: &Metadata) -> DirEntry {
    let modified_at = millis(metadata.modified());
    DirEntry {
        name: path.basename().to_string(),
        is_dir: metadata.is_dir(),
        size: if metadata.is_dir() { None } else { Some(metadata.len()) },
        created_at: millis(metadata.created()).or(modified_at),
        modified_at,
        path,
    }
}

fn copy_parallelism() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cores.clamp(2, 16)
}

/// Recreate `src` under `dest`. Directories are created first (the walk is
/// sorted, so parents precede children), then files are copied in parallel.
fn copy_tree_blocking(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;

    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    for entry in WalkDir::new(src).skip_hidden(false).sort(true).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let path = entry.path();
        let rel = path
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            files.push((path, target));
        }
    }

    let copy_all = || {
        files
            .par_iter()
            .try_for_each(|(from, to)| std::fs::copy(from, to).map(|_| ()))
    };

    ThreadPoolBuilder::new()
        .num_threads(copy_parallelism())
        .build()
        .map(|pool| pool.install(copy_all))
        .unwrap_or_else(|_| copy_all())
}

/// Total size of the files under `root`.
fn tree_size_blocking(root: &Path) -> u64 {
    WalkDir::new(root)
        .skip_hidden(false)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

impl LocalGateway {
    pub fn new(show_hidden: bool) -> Self {
        Self { show_hidden }
    }

    fn destination_for(src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        let name = src.basename();
        if name.is_empty() || src.parent().is_none() {
            return Err(GatewayError::InvalidPath(src.to_string()));
        }
        Ok(dest_folder.join(name))
    }

    async fn ensure_folder(path: &CanonicalPath) -> GatewayResult<()> {
        let metadata = tokio::fs::metadata(path.to_native())
            .await
            .map_err(|e| GatewayError::io(path, e))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(GatewayError::NotADirectory(path.clone()))
        }
    }

    async fn copy_tree(src: &CanonicalPath, dest: &CanonicalPath) -> GatewayResult<()> {
        let native_src = src.to_native();
        let native_dest = dest.to_native();
        tokio::task::spawn_blocking(move || copy_tree_blocking(&native_src, &native_dest))
            .await
            .map_err(|e| GatewayError::TaskJoin(e.to_string()))?
            .map_err(|e| GatewayError::io(src, e))
    }

    async fn rename_or_copy(
        src: &CanonicalPath,
        dest: &CanonicalPath,
        is_dir: bool,
    ) -> GatewayResult<()> {
        match tokio::fs::rename(src.to_native(), dest.to_native()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(GatewayError::io(src, err)),
            Err(err) => {
                // Renames fail across devices.
                tracing::debug!(%src, %dest, %err, "rename failed, copying instead");
                Self::copy_then_remove(src, dest, is_dir).await
            }
        }
    }

    async fn copy_then_remove(src: &CanonicalPath, dest: &CanonicalPath, is_dir: bool) -> GatewayResult<()> {
        if is_dir {
            Self::copy_tree(src, dest).await?;
            tokio::fs::remove_dir_all(src.to_native())
                .await
                .map_err(|e| GatewayError::io(src, e))
        } else {
            tokio::fs::copy(src.to_native(), dest.to_native())
                .await
                .map_err(|e| GatewayError::io(src, e))?;
            tokio::fs::remove_file(src.to_native())
                .await
                .map_err(|e| GatewayError::io(src, e))
        }
    }
}

impl FsGateway for LocalGateway {
    async fn list_children(&self, path: &CanonicalPath) -> GatewayResult<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path.to_native())
            .await
            .map_err(|e| GatewayError::io(path, e))?;

        let mut items = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| GatewayError::io(path, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }
            // Broken links and racing deletes are skipped, not fatal.
            let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
                continue;
            };
            items.push(entry_from_metadata(path.join(&name), &metadata));
        }

        items.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(items)
    }

    async fn is_directory(&self, path: &CanonicalPath) -> GatewayResult<bool> {
        tokio::fs::metadata(path.to_native())
            .await
            .map(|m| m.is_dir())
            .map_err(|e| GatewayError::io(path, e))
    }

    async fn file_info(&self, path: &CanonicalPath) -> GatewayResult<FileInfo> {
        let metadata = tokio::fs::metadata(path.to_native())
            .await
            .map_err(|e| GatewayError::io(path, e))?;
        let entry = entry_from_metadata(path.clone(), &metadata);
        let size = if metadata.is_dir() {
            let native = path.to_native();
            tokio::task::spawn_blocking(move || tree_size_blocking(&native))
                .await
                .map_err(|e| GatewayError::TaskJoin(e.to_string()))?
        } else {
            metadata.len()
        };
        Ok(FileInfo {
            name: entry.name,
            path: entry.path,
            is_dir: entry.is_dir,
            size,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
        })
    }

    async fn create_folder(&self, parent: &CanonicalPath, name: &str) -> GatewayResult<CanonicalPath> {
        let target = parent.join(name);
        tokio::fs::create_dir(target.to_native())
            .await
            .map_err(|e| GatewayError::io(&target, e))?;
        Ok(target)
    }

    async fn create_file(&self, parent: &CanonicalPath, name: &str) -> GatewayResult<CanonicalPath> {
        let target = parent.join(name);
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target.to_native())
            .await
            .map_err(|e| GatewayError::io(&target, e))?;
        Ok(target)
    }

    async fn delete_item(&self, path: &CanonicalPath) -> GatewayResult<()> {
        let metadata = tokio::fs::metadata(path.to_native())
            .await
            .map_err(|e| GatewayError::io(path, e))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path.to_native()).await
        } else {
            tokio::fs::remove_file(path.to_native()).await
        };
        result.map_err(|e| GatewayError::io(path, e))
    }

    async fn rename_item(&self, path: &CanonicalPath, new_name: &str) -> GatewayResult<CanonicalPath> {
        if new_name.is_empty() || new_name.contains(['/', '\\']) {
            return Err(GatewayError::InvalidPath(new_name.to_string()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| GatewayError::InvalidPath(path.to_string()))?;
        let target = parent.join(new_name);
        tokio::fs::rename(path.to_native(), target.to_native())
            .await
            .map_err(|e| GatewayError::io(path, e))?;
        Ok(target)
    }

    async fn move_file(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        Self::ensure_folder(dest_folder).await?;
        let target = Self::destination_for(src, dest_folder)?;
        Self::rename_or_copy(src, &target, false).await?;
        Ok(target)
    }

    async fn copy_file(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        Self::ensure_folder(dest_folder).await?;
        let target = Self::destination_for(src, dest_folder)?;
        tokio::fs::copy(src.to_native(), target.to_native())
            .await
            .map_err(|e| GatewayError::io(src, e))?;
        Ok(target)
    }

    async fn move_folder(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        Self::ensure_folder(src).await?;
        Self::ensure_folder(dest_folder).await?;
        let target = Self::destination_for(src, dest_folder)?;
        Self::rename_or_copy(src, &target, true).await?;
        Ok(target)
    }

    async fn copy_folder(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        Self::ensure_folder(src).await?;
        Self::ensure_folder(dest_folder).await?;
        let target = Self::destination_for(src, dest_folder)?;
        if target.is_same_or_descendant_of(src) {
            return Err(GatewayError::InvalidPath(target.to_string()));
        }
        Self::copy_tree(src, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn canon(path: &Path) -> CanonicalPath {
        CanonicalPath::from_native(path)
    }

    #[tokio::test]
    async fn test_list_children_folders_first_and_hidden_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();

        let gateway = LocalGateway::default();
        let items = gateway.list_children(&canon(dir.path())).await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "b.txt"]);
        assert!(items[0].is_dir);
        assert_eq!(items[1].size, Some(1));

        let with_hidden = LocalGateway::new(true);
        assert_eq!(with_hidden.list_children(&canon(dir.path())).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_copy_folder_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("inner/deep")).unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        fs::write(src.join("inner/deep/leaf.txt"), "leaf").unwrap();
        let dst = dir.path().join("dst");
        fs::create_dir(&dst).unwrap();

        let gateway = LocalGateway::default();
        let created = gateway.copy_folder(&canon(&src), &canon(&dst)).await.unwrap();

        assert_eq!(created, canon(&dst.join("src")));
        assert_eq!(fs::read_to_string(dst.join("src/inner/deep/leaf.txt")).unwrap(), "leaf");
        assert_eq!(fs::read_to_string(dst.join("src/top.txt")).unwrap(), "top");
        assert!(src.join("top.txt").exists());
    }

    #[tokio::test]
    async fn test_move_file_and_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let dst = dir.path().join("dst");
        fs::create_dir(&dst).unwrap();

        let gateway = LocalGateway::default();
        let missing = canon(&dir.path().join("nope"));
        assert!(gateway.move_file(&canon(&file), &missing).await.is_err());

        let moved = gateway.move_file(&canon(&file), &canon(&dst)).await.unwrap();
        assert_eq!(moved, canon(&dst.join("a.txt")));
        assert!(!file.exists());
        assert!(dst.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_move_folder_relocates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("inner")).unwrap();
        fs::write(src.join("inner/leaf.txt"), "leaf").unwrap();
        let dst = dir.path().join("dst");
        fs::create_dir(&dst).unwrap();

        let gateway = LocalGateway::default();
        let file = canon(&src.join("inner/leaf.txt"));
        assert!(matches!(
            gateway.move_folder(&file, &canon(&dst)).await,
            Err(GatewayError::NotADirectory(_))
        ));

        let moved = gateway.move_folder(&canon(&src), &canon(&dst)).await.unwrap();
        assert_eq!(moved, canon(&dst.join("src")));
        assert_eq!(fs::read_to_string(dst.join("src/inner/leaf.txt")).unwrap(), "leaf");
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn test_copy_then_remove_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("folder");
        fs::create_dir_all(folder.join("nested")).unwrap();
        fs::write(folder.join("nested/n.txt"), "n").unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "f").unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        LocalGateway::copy_then_remove(&canon(&folder), &canon(&out.join("folder")), true)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(out.join("folder/nested/n.txt")).unwrap(), "n");
        assert!(!folder.exists());

        LocalGateway::copy_then_remove(&canon(&file), &canon(&out.join("f.txt")), false)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(out.join("f.txt")).unwrap(), "f");
        assert!(!file.exists());

        let gone = canon(&dir.path().join("gone.txt"));
        assert!(LocalGateway::copy_then_remove(&gone, &canon(&out.join("gone.txt")), false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_file_info_recursive_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/one.txt"), "12345").unwrap();
        fs::write(dir.path().join("a/b/two.txt"), "123").unwrap();

        let gateway = LocalGateway::default();
        let folder = gateway.file_info(&canon(&dir.path().join("a"))).await.unwrap();
        assert!(folder.is_dir);
        assert_eq!(folder.size, 8);
        assert_eq!(folder.name, "a");

        let file = gateway.file_info(&canon(&dir.path().join("a/one.txt"))).await.unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.size, 5);
        assert!(file.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_create_rename_delete() {
        let dir = tempfile::tempdir().unwrap();
        let root = canon(dir.path());
        let gateway = LocalGateway::default();

        let folder = gateway.create_folder(&root, "new").await.unwrap();
        assert!(gateway.is_directory(&folder).await.unwrap());
        let file = gateway.create_file(&folder, "x.txt").await.unwrap();
        assert!(!gateway.is_directory(&file).await.unwrap());
        assert!(matches!(
            gateway.create_file(&folder, "x.txt").await,
            Err(GatewayError::AlreadyExists(_))
        ));

        let renamed = gateway.rename_item(&file, "y.txt").await.unwrap();
        assert_eq!(renamed.basename(), "y.txt");
        gateway.delete_item(&folder).await.unwrap();
        assert!(matches!(
            gateway.is_directory(&folder).await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
