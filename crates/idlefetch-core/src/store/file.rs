//! Streaming backend: one randomly writable file per cache key.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::{ChunkStore, Seekable, StoreError, StoreKind};

/// File-backed store. Opening never truncates, so a reopened file resumes
/// from its current length. Nothing is preallocated: the file length is the
/// stored prefix.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
}

impl FileStore {
    /// Open or create the file at `path`, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkStore for FileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Streaming
    }

    async fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(())
    }

    async fn size(&mut self) -> Result<u64, StoreError> {
        self.file.flush().await?;
        Ok(self.file.metadata().await?.len())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }

    async fn assemble(&mut self) -> Result<Option<PathBuf>, StoreError> {
        self.file.flush().await?;
        Ok(Some(self.path.clone()))
    }

    fn seekable(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }
}

#[async_trait]
impl Seekable for FileStore {
    async fn seek(&mut self, pos: u64) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(pos)).await?;
        Ok(())
    }

    /// Written bytes reach the file before this returns, so a reopened store sees them.
    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_size_close_assemble() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("files/out.bin")).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 0);
        store.write_chunk(0, b"hello").await.unwrap();
        store.write_chunk(5, b" world").await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.size().await.unwrap(), 11);
        let path = store.assemble().await.unwrap().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn reopen_keeps_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.bin");
        {
            let mut store = FileStore::open(&path).await.unwrap();
            store.write_chunk(0, b"abcd").await.unwrap();
            store.close().await.unwrap();
        }
        let mut store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 4);
        store.write_chunk(4, b"ef").await.unwrap();
        store.close().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn seekable_capability_writes_at_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seek.bin");
        let mut store = FileStore::open(&path).await.unwrap();
        store.write_chunk(0, b"xxxx").await.unwrap();
        {
            let cursor = store.seekable().unwrap();
            cursor.seek(2).await.unwrap();
            cursor.write(b"yy").await.unwrap();
            cursor.write(b"zz").await.unwrap();
        }
        assert!(store.purgeable().is_none());
        store.close().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"xxyyzz");
    }
}
