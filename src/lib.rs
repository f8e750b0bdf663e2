//! metaconv - metadata component resolution and format conversion
//!
//! components of a platform metadata project live in one of two layouts. the
//! **source format** is the editable one: archives expanded into directories,
//! large documents split into one file per child, every descriptor carrying a
//! `-meta.xml` suffix. the **metadata format** is the deployable one: packed
//! archives, composed documents and a `package.xml` manifest.
//!
//! # Core concepts
//!
//! - **Tree**: a read-only view over disk, a zip archive or memory
//! - **Registry**: type descriptors keyed by name, suffix and directory
//! - **Component**: a typed unit with a descriptor file and optional content
//! - **Transformer**: turns one component into write instructions for the other format
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use metaconv::convert::{Converter, Format, OutputTarget};
//! use metaconv::registry::Registry;
//! use metaconv::resolve::SourceResolver;
//! use metaconv::tree::DiskTree;
//! use metaconv::Config;
//!
//! # async fn run() -> metaconv::Result<()> {
//! let registry = Registry::builtin()?;
//! let report = SourceResolver::new(&registry, Arc::new(DiskTree::new()))
//!     .resolve(Path::new("force-app"))?;
//!
//! Converter::new(&registry, Config::default())
//!     .convert(
//!         &report.components,
//!         Format::Metadata,
//!         &OutputTarget::Zip("package.zip".into()),
//!         &[],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;

pub mod component;
pub mod convert;
pub mod registry;
pub mod resolve;
pub mod tree;
pub mod xml;

pub use component::{MetadataComponent, SourceComponent};
pub use config::{Config, CONFIG_FILE_NAME, DEFAULT_MAX_CONCURRENT_WRITES};
pub use error::{Error, IoResultExt, Result, ZipResultExt};
pub use registry::{Registry, TypeDescriptor};
