use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::TreeContainer;
use crate::error::{Error, IoResultExt, Result};

/// tree backed by the local filesystem, paths are used as given
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskTree;

impl DiskTree {
    pub fn new() -> Self {
        Self
    }
}

impl TreeContainer for DiskTree {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(path)
            .with_path(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_path(path)?;
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_path(path)
    }

    fn stream(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = File::open(path).with_path(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}
