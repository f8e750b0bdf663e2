//! read-only views over a content source
//!
//! resolution and conversion never touch `std::fs` directly; they go through a
//! [`TreeContainer`], so the same logic works on a project checkout, a
//! retrieved zip archive, or files held in memory.

mod archive;
mod disk;
mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub use archive::ZipTree;
pub use disk::DiskTree;
pub use memory::MemoryTree;

/// read capabilities shared by every content source
pub trait TreeContainer: Send + Sync + fmt::Debug {
    /// does a file or directory exist at path, never fails
    fn exists(&self, path: &Path) -> bool;

    /// is path a directory, false for missing paths
    fn is_directory(&self, path: &Path) -> bool;

    /// names of the direct children of a directory, sorted
    fn read_directory(&self, path: &Path) -> Result<Vec<String>>;

    /// read a whole file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// open a single-pass reader over a file
    ///
    /// every call returns a fresh reader
    fn stream(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// every file below dir, recursively, in sorted order
    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for name in self.read_directory(dir)? {
            let path = dir.join(&name);
            if self.is_directory(&path) {
                files.extend(self.walk_files(&path)?);
            } else {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// normalize a path into the `a/b/c` key form used by in-memory indexes
///
/// root and current-dir components are dropped, `..` pops
pub(crate) fn index_key(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

/// directory structure of a tree that is not backed by a real filesystem
#[derive(Clone, Debug)]
pub(crate) struct PathIndex<T> {
    files: BTreeMap<String, T>,
    dirs: BTreeMap<String, BTreeSet<String>>,
}

impl<T> Default for PathIndex<T> {
    fn default() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(String::new(), BTreeSet::new());
        Self {
            files: BTreeMap::new(),
            dirs,
        }
    }
}

impl<T> PathIndex<T> {
    /// register a file and all of its ancestor directories
    pub fn insert_file(&mut self, key: &str, value: T) {
        if key.is_empty() {
            return;
        }
        let (parent, name) = split_key(key);
        self.insert_dir(parent);
        self.dirs
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string());
        self.files.insert(key.to_string(), value);
    }

    /// register a directory and all of its ancestors
    pub fn insert_dir(&mut self, key: &str) {
        if self.dirs.contains_key(key) {
            return;
        }
        self.dirs.insert(key.to_string(), BTreeSet::new());
        if key.is_empty() {
            return;
        }
        let (parent, name) = split_key(key);
        self.insert_dir(parent);
        self.dirs
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn is_dir(&self, key: &str) -> bool {
        self.dirs.contains_key(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.files.contains_key(key) || self.dirs.contains_key(key)
    }

    pub fn file(&self, path: &Path) -> Result<&T> {
        let key = index_key(path);
        self.files
            .get(&key)
            .ok_or_else(|| Error::PathNotFound(path.to_path_buf()))
    }

    pub fn list(&self, path: &Path) -> Result<Vec<String>> {
        let key = index_key(path);
        match self.dirs.get(&key) {
            Some(children) => Ok(children.iter().cloned().collect()),
            None if self.files.contains_key(&key) => Err(Error::NotADirectory(path.to_path_buf())),
            None => Err(Error::PathNotFound(path.to_path_buf())),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn split_key(key: &str) -> (&str, &str) {
    match key.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", key),
    }
}
