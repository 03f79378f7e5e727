//! 临时写入后重命名落盘，避免下载方读到写了一半的上传文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 目标文件同目录下的隐藏临时文件。未完成落盘就被丢弃时删除临时文件。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
    written: u64,
    settled: bool,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target path"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}.tmp.{}", Uuid::new_v4());
        let temp_path = parent.join(temp_name);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file: Some(file),
            written: 0,
            settled: false,
        })
    }

    /// 追加一段数据，返回累计写入字节数。
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<u64> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(self.written)
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(mut self) {
        self.file.take();
        self.settled = true;
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并重命名到目标路径，返回文件大小。
    pub async fn finalize(mut self) -> io::Result<u64> {
        let file = self.file.take().ok_or_else(closed)?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.temp_path, &self.target).await?;
        self.settled = true;

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(self.written)
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.settled {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("temp file already closed")
}

#[cfg(unix)]
async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(not(unix))]
async fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
