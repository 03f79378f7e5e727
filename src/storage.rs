use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;
use uuid::Uuid;

use crate::config::STORED_NAME_PREFIX;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    confine_paths: bool,
}

impl Storage {
    pub fn new(root: PathBuf, confine_paths: bool) -> Self {
        Self {
            root,
            confine_paths,
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Maps a URL path segment onto the upload directory.
    ///
    /// Without containment the segment is joined as-is, so `..` sequences
    /// reach outside the root. With containment, parent/root components and
    /// symlinks are rejected.
    pub async fn resolve(&self, segment: &str) -> Result<PathBuf, StorageError> {
        if !self.confine_paths {
            return Ok(self.root.join(segment));
        }
        let target = self.normalize(segment)?;
        self.ensure_no_symlink_components(&target).await?;
        Ok(target)
    }

    fn normalize(&self, segment: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath);
        }
        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath);
                    }
                }
                // 不存在的叶子交给调用方按 404 处理。
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// 判断解析后的路径是否存在；无法访问时视为不存在。
    pub async fn exists(&self, target: &Path) -> bool {
        fs::try_exists(target).await.unwrap_or(false)
    }

    /// 为上传文件生成落盘文件名，保留原文件扩展名。
    pub fn stored_name(&self, original_name: &str) -> String {
        let id = Uuid::new_v4().simple();
        match extension_of(original_name) {
            Some(ext) => format!("{STORED_NAME_PREFIX}{id}.{ext}"),
            None => format!("{STORED_NAME_PREFIX}{id}"),
        }
    }
}

/// 扩展名只取点号后的首段字母数字，例如 `a.tar.gz` 取 `gz`，`a.pdf?x` 取 `pdf`。
fn extension_of(original_name: &str) -> Option<&str> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    let end = ext
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(ext.len());
    let ext = &ext[..end];
    (!ext.is_empty()).then_some(ext)
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
