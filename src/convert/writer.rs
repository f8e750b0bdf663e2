//! executes write instructions

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::archive::ArchiveBuilder;
use super::WriteInstruction;
use crate::error::{Error, IoResultExt, Result};

/// where converted files go
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// relative destinations are rooted here
    Directory(PathBuf),
    /// every destination becomes an entry of one archive
    Zip(PathBuf),
}

impl OutputTarget {
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::Directory(path) | OutputTarget::Zip(path) => path,
        }
    }
}

/// write source to destination through a temporary sibling and a rename
///
/// parent directories are created; a failed write leaves no partial file
pub(crate) fn write_file(destination: &Path, source: &mut dyn Read) -> Result<u64> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| Error::InvalidDestination(destination.to_path_buf()))?;
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_path(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4()
    ));
    let result = write_then_rename(&tmp_path, destination, source);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_then_rename(tmp_path: &Path, destination: &Path, source: &mut dyn Read) -> Result<u64> {
    let written = {
        let mut tmp_file = File::create(tmp_path).with_path(tmp_path)?;
        let written = io::copy(source, &mut tmp_file).with_path(tmp_path)?;
        tmp_file.sync_all().with_path(tmp_path)?;
        written
    };
    fs::rename(tmp_path, destination).with_path(destination)?;
    Ok(written)
}

/// wait for every write task, then report the first failure if any
///
/// returns the number of successful writes
pub(crate) async fn settle(handles: Vec<JoinHandle<Result<()>>>) -> Result<usize> {
    let results = futures::future::join_all(handles).await;

    let mut written = 0;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(Ok(())) => written += 1,
            Ok(Err(e)) => {
                tracing::warn!("{}", e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(Error::Task(e.to_string()));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

/// spawn one bounded blocking write, failures name the destination
pub(crate) fn spawn_write<F>(
    limit: &Arc<Semaphore>,
    destination: PathBuf,
    write: F,
) -> JoinHandle<Result<()>>
where
    F: FnOnce(&Path) -> Result<()> + Send + 'static,
{
    let limit = Arc::clone(limit);
    tokio::spawn(async move {
        let _permit = limit
            .acquire_owned()
            .await
            .map_err(|e| Error::Task(e.to_string()))?;
        tokio::task::spawn_blocking(move || {
            write(&destination).map_err(|e| Error::writing(&destination, e))
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    })
}

/// execute instructions against target
///
/// directory writes run concurrently, bounded by limit; every write settles
/// before the first failure is returned. returns the number of files written.
pub async fn write_instructions(
    instructions: Vec<WriteInstruction>,
    target: &OutputTarget,
    limit: &Arc<Semaphore>,
) -> Result<usize> {
    match target {
        OutputTarget::Directory(root) => {
            let mut handles = Vec::with_capacity(instructions.len());
            for instruction in instructions {
                let destination = if instruction.destination.is_relative() {
                    root.join(&instruction.destination)
                } else {
                    instruction.destination
                };
                let source = instruction.source;
                handles.push(spawn_write(limit, destination, move |path| {
                    let mut reader = source.open()?;
                    write_file(path, &mut reader)?;
                    Ok(())
                }));
            }
            let written = settle(handles).await?;
            tracing::info!("wrote {} files to {}", written, root.display());
            Ok(written)
        }
        OutputTarget::Zip(path) => {
            let count = instructions.len();
            let path = path.clone();
            let handle = spawn_write(limit, path.clone(), move |path| {
                let data = archive_instructions(instructions, path)?;
                write_file(path, &mut Cursor::new(data))?;
                Ok(())
            });
            settle(vec![handle]).await?;
            tracing::info!("wrote {} entries to {}", count, path.display());
            Ok(count)
        }
    }
}

/// pack instructions into one archive, entries sorted by destination
fn archive_instructions(mut instructions: Vec<WriteInstruction>, label: &Path) -> Result<Vec<u8>> {
    instructions.sort_by(|a, b| a.destination.cmp(&b.destination));
    let mut builder = ArchiveBuilder::new(label);
    for instruction in &instructions {
        if !instruction.destination.is_relative() {
            return Err(Error::InvalidDestination(instruction.destination.clone()));
        }
        let mut reader = instruction.source.open()?;
        builder.add(&instruction.destination, &mut reader)?;
    }
    builder.finish()
}
