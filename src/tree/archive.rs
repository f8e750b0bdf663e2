use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use super::{index_key, PathIndex, TreeContainer};
use crate::error::{IoResultExt, Result, ZipResultExt};

type SharedArchive = ZipArchive<Cursor<Arc<[u8]>>>;

/// upper bound on the buffer reserved from an entry's declared size
const READ_RESERVE_LIMIT: u64 = 1 << 20;

/// tree backed by a zip archive held in memory
///
/// the central directory is parsed once; every read clones the archive handle,
/// which shares the parsed directory and the underlying buffer.
#[derive(Clone)]
pub struct ZipTree {
    label: PathBuf,
    archive: SharedArchive,
    index: PathIndex<usize>,
}

impl ZipTree {
    /// open a zip archive from disk
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_path(path)?;
        Self::from_bytes(path, data)
    }

    /// index an archive already in memory; label names it in errors
    pub fn from_bytes(label: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self> {
        let label = label.into();
        let buffer: Arc<[u8]> = Arc::from(data);
        let mut archive = ZipArchive::new(Cursor::new(buffer)).with_archive(&label)?;

        let mut index = PathIndex::default();
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).with_archive(&label)?;
            let key = index_key(Path::new(entry.name()));
            if entry.is_dir() {
                index.insert_dir(&key);
            } else {
                index.insert_file(&key, i);
            }
        }

        tracing::debug!(
            "indexed {} files in archive {}",
            index.file_count(),
            label.display()
        );

        Ok(Self {
            label,
            archive,
            index,
        })
    }

    /// number of file entries, directory entries excluded
    pub fn file_count(&self) -> usize {
        self.index.file_count()
    }
}

impl fmt::Debug for ZipTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipTree")
            .field("label", &self.label)
            .field("files", &self.index.file_count())
            .finish()
    }
}

impl TreeContainer for ZipTree {
    fn exists(&self, path: &Path) -> bool {
        self.index.exists(&index_key(path))
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.index.is_dir(&index_key(path))
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<String>> {
        self.index.list(path)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let i = *self.index.file(path)?;
        let mut archive = self.archive.clone();
        let mut entry = archive.by_index(i).with_archive(&self.label)?;
        // declared sizes are untrusted; the buffer grows with the real data
        let mut data = Vec::with_capacity(entry.size().min(READ_RESERVE_LIMIT) as usize);
        entry.read_to_end(&mut data).with_path(path)?;
        Ok(data)
    }

    /// entries borrow the archive, so the stream is a cursor over the
    /// decompressed entry
    fn stream(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let data = self.read_file(path)?;
        Ok(Box::new(Cursor::new(data)))
    }
}
