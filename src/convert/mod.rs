//! conversion between source format and metadata format
//!
//! a [`Transformer`] turns one resolved component into [`WriteInstruction`]s;
//! the [`writer`] executes them against a directory or a zip archive. the
//! archive-expanding branch of the static resource transformer writes its
//! entries directly, bounded by the shared write limit.

pub mod archive;
pub mod content_type;
mod converter;
mod decomposed;
mod default;
mod static_resource;
pub mod writer;

use std::fmt;
use std::future::Future;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::component::SourceComponent;
use crate::error::Result;
use crate::registry::{Registry, TransformerKind, TypeDescriptor};
use crate::tree::TreeContainer;

pub use converter::{ConvertResult, Converter, DEFAULT_API_VERSION, MANIFEST_FILE_NAME};
pub use decomposed::DecomposedTransformer;
pub use default::DefaultTransformer;
pub use static_resource::StaticResourceTransformer;
pub use writer::{write_instructions, OutputTarget};

/// the two on-disk representations of a component
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Format {
    /// deployable layout: packed archives, composed documents, package.xml
    Metadata,
    /// editable layout: expanded archives, decomposed documents, -meta.xml descriptors
    Source,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Metadata => write!(f, "metadata"),
            Format::Source => write!(f, "source"),
        }
    }
}

/// where the bytes of a write instruction come from, opened lazily
#[derive(Clone, Debug)]
pub enum WriteSource {
    /// a file of a tree, streamed
    Tree {
        tree: Arc<dyn TreeContainer>,
        path: PathBuf,
    },
    /// bytes a transformer produced
    Bytes(Arc<[u8]>),
    /// a directory of a tree, zipped when opened
    Archive {
        tree: Arc<dyn TreeContainer>,
        root: PathBuf,
    },
}

impl WriteSource {
    /// open a fresh reader over the source
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            WriteSource::Tree { tree, path } => tree.stream(path),
            WriteSource::Bytes(data) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            WriteSource::Archive { tree, root } => {
                let data = archive::zip_directory(tree.as_ref(), root)?;
                Ok(Box::new(Cursor::new(data)))
            }
        }
    }

    /// read the whole source into memory
    pub fn read_all(&self) -> Result<Vec<u8>> {
        match self {
            WriteSource::Tree { tree, path } => tree.read_file(path),
            WriteSource::Bytes(data) => Ok(data.to_vec()),
            WriteSource::Archive { tree, root } => archive::zip_directory(tree.as_ref(), root),
        }
    }
}

/// copy source to destination; relative destinations are rooted by the writer
#[derive(Clone, Debug)]
pub struct WriteInstruction {
    pub source: WriteSource,
    pub destination: PathBuf,
}

impl WriteInstruction {
    /// copy a tree file
    pub fn copy(tree: &Arc<dyn TreeContainer>, path: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: WriteSource::Tree {
                tree: Arc::clone(tree),
                path: path.into(),
            },
            destination: destination.into(),
        }
    }

    /// write generated bytes
    pub fn bytes(data: impl Into<Arc<[u8]>>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: WriteSource::Bytes(data.into()),
            destination: destination.into(),
        }
    }

    /// zip a tree directory into a single file
    pub fn archive(tree: &Arc<dyn TreeContainer>, root: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: WriteSource::Archive {
                tree: Arc::clone(tree),
                root: root.into(),
            },
            destination: destination.into(),
        }
    }
}

/// state shared by every transformer of one conversion
#[derive(Clone, Debug)]
pub struct TransformerContext {
    /// root for direct writes whose destination is relative
    pub default_directory: PathBuf,
    /// bounds concurrently open destination files
    pub write_limit: Arc<Semaphore>,
}

impl TransformerContext {
    pub fn new(default_directory: impl Into<PathBuf>, max_concurrent_writes: usize) -> Self {
        Self {
            default_directory: default_directory.into(),
            write_limit: Arc::new(Semaphore::new(max_concurrent_writes.max(1))),
        }
    }
}

/// converts one component between the two formats
///
/// `merge_with` is an existing component in the target representation whose
/// paths are reused instead of computed.
pub trait MetadataTransformer {
    fn to_metadata_format(
        &self,
        component: &SourceComponent,
    ) -> impl Future<Output = Result<Vec<WriteInstruction>>> + Send;

    fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> impl Future<Output = Result<Vec<WriteInstruction>>> + Send;
}

/// transformer selected by a type's registry strategy
#[derive(Clone, Debug)]
pub enum Transformer {
    Default(DefaultTransformer),
    StaticResource(StaticResourceTransformer),
    Decomposed(DecomposedTransformer),
}

impl Transformer {
    /// pick the transformer for ty
    pub fn for_type(
        ty: &TypeDescriptor,
        registry: &Registry,
        context: &TransformerContext,
    ) -> Result<Self> {
        Ok(match ty.strategies.transformer {
            TransformerKind::Default => Transformer::Default(DefaultTransformer),
            TransformerKind::StaticResource => {
                Transformer::StaticResource(StaticResourceTransformer::new(context.clone()))
            }
            TransformerKind::Decomposed => {
                Transformer::Decomposed(DecomposedTransformer::new(ty, registry)?)
            }
        })
    }
}

impl MetadataTransformer for Transformer {
    async fn to_metadata_format(&self, component: &SourceComponent) -> Result<Vec<WriteInstruction>> {
        match self {
            Transformer::Default(t) => t.to_metadata_format(component).await,
            Transformer::StaticResource(t) => t.to_metadata_format(component).await,
            Transformer::Decomposed(t) => t.to_metadata_format(component).await,
        }
    }

    async fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<Vec<WriteInstruction>> {
        match self {
            Transformer::Default(t) => t.to_source_format(component, merge_with).await,
            Transformer::StaticResource(t) => t.to_source_format(component, merge_with).await,
            Transformer::Decomposed(t) => t.to_source_format(component, merge_with).await,
        }
    }
}
