use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Random access to one region file on disk.
///
/// Positioned reads and writes are seek-then-exact operations on the one
/// owned handle, so every operation needs `&mut self`.
#[derive(Debug)]
pub(crate) struct FileBackend {
    file: File,
}

impl FileBackend {
    /// Opens an existing file for reading and writing. `None` means the
    /// file does not exist; every other failure is passed through.
    pub async fn open(path: &Path) -> io::Result<Option<Self>> {
        match OpenOptions::new().read(true).write(true).open(path).await {
            Ok(file) => Ok(Some(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Creates a new empty file.
    pub async fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        Ok(Self { file })
    }

    pub async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0; len];
        self.file.read_exact(&mut buf).await?;

        Ok(buf)
    }

    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await
    }

    pub async fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len).await
    }

    pub async fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    /// Flushes everything to disk and releases the handle.
    pub async fn close(mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await
    }
}
