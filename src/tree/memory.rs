use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use super::{index_key, PathIndex, TreeContainer};
use crate::error::Result;

/// virtual tree held entirely in memory
///
/// streams are restartable: each call yields a cursor over a copy of the file.
#[derive(Clone, Debug, Default)]
pub struct MemoryTree {
    index: PathIndex<Arc<[u8]>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// build a tree from `(path, content)` pairs
    pub fn from_entries<P, B>(entries: impl IntoIterator<Item = (P, B)>) -> Self
    where
        P: AsRef<Path>,
        B: Into<Vec<u8>>,
    {
        let mut tree = Self::new();
        for (path, content) in entries {
            tree.add_file(path, content);
        }
        tree
    }

    /// add a file, creating parent directories
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let key = index_key(path.as_ref());
        self.index.insert_file(&key, Arc::from(content.into()));
    }

    /// add an empty directory
    pub fn add_directory(&mut self, path: impl AsRef<Path>) {
        self.index.insert_dir(&index_key(path.as_ref()));
    }

    /// builder form of add_file
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, content);
        self
    }
}

impl TreeContainer for MemoryTree {
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
        Ok(self.index.file(path)?.to_vec())
    }

    fn stream(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let data = Arc::clone(self.index.file(path)?);
        Ok(Box::new(Cursor::new(data)))
    }
}
