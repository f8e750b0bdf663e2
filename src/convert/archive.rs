//! deterministic zip archives and safe extraction

use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, IoResultExt, Result, ZipResultExt};
use crate::tree::{index_key, TreeContainer};

/// deflate level legacy tooling produced archives with
pub const ARCHIVE_COMPRESSION_LEVEL: i64 = 3;

/// entry options that make identical input produce identical archives
pub(crate) fn archive_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ARCHIVE_COMPRESSION_LEVEL))
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

/// archive entry name for a relative path, always `/` separated
pub(crate) fn entry_name(path: &Path) -> String {
    index_key(path)
}

/// incremental builder over an in-memory archive
pub(crate) struct ArchiveBuilder {
    label: PathBuf,
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchiveBuilder {
    pub fn new(label: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// add one file entry, copying everything source yields
    pub fn add(&mut self, name: &Path, source: &mut dyn Read) -> Result<()> {
        self.writer
            .start_file(entry_name(name), archive_options())
            .with_archive(&self.label)?;
        std::io::copy(source, &mut self.writer).with_path(name)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.writer.finish().with_archive(&self.label)?;
        Ok(cursor.into_inner())
    }
}

/// zip every file below root, entry names relative to root
///
/// only file entries are written, in sorted path order
pub fn zip_directory(tree: &dyn TreeContainer, root: &Path) -> Result<Vec<u8>> {
    let mut builder = ArchiveBuilder::new(root);
    let files = tree.walk_files(root)?;
    for file in &files {
        let relative = file.strip_prefix(root).unwrap_or(file);
        let mut reader = tree.stream(file)?;
        builder.add(relative, &mut reader)?;
    }
    tracing::debug!("archived {} files from {}", files.len(), root.display());
    builder.finish()
}

/// index and relative path of every file entry, directory entries skipped
///
/// entry names escaping the archive root are rejected
pub(crate) fn file_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    label: &Path,
) -> Result<Vec<(usize, PathBuf)>> {
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).with_archive(label)?;
        if entry.is_dir() {
            continue;
        }
        match entry.enclosed_name() {
            Some(path) => entries.push((i, path)),
            None => {
                return Err(Error::InvalidArchiveEntry {
                    archive: label.to_path_buf(),
                    name: entry.name().to_string(),
                })
            }
        }
    }
    Ok(entries)
}
