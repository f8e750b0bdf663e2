use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::registry::TypeDescriptor;
use crate::tree::TreeContainer;
use crate::xml::from_xml;

/// a component resolved from a tree: its type plus where its files live
///
/// built once by a resolver and never mutated afterwards
#[derive(Clone, Debug)]
pub struct SourceComponent {
    full_name: String,
    type_: Arc<TypeDescriptor>,
    xml: PathBuf,
    content: Option<PathBuf>,
    tree: Arc<dyn TreeContainer>,
    children: Vec<SourceComponent>,
}

impl SourceComponent {
    pub fn new(
        full_name: impl Into<String>,
        type_: Arc<TypeDescriptor>,
        xml: impl Into<PathBuf>,
        content: Option<PathBuf>,
        tree: Arc<dyn TreeContainer>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            type_,
            xml: xml.into(),
            content,
            tree,
            children: vec![],
        }
    }

    /// attach child components of a decomposed type
    pub fn with_children(mut self, children: Vec<SourceComponent>) -> Self {
        self.children = children;
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// last segment of the full name, without folder prefix
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.full_name)
    }

    pub fn type_(&self) -> &Arc<TypeDescriptor> {
        &self.type_
    }

    /// path of the descriptor file
    pub fn xml(&self) -> &Path {
        &self.xml
    }

    /// path of the content file or directory, absent for metadata-only types
    pub fn content(&self) -> Option<&Path> {
        self.content.as_deref()
    }

    pub fn tree(&self) -> &Arc<dyn TreeContainer> {
        &self.tree
    }

    pub fn children(&self) -> &[SourceComponent] {
        &self.children
    }

    /// is the content an expanded directory rather than a single file
    pub fn content_is_directory(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| self.tree.is_directory(c))
    }

    /// every content file, recursively for directory content
    pub fn content_files(&self) -> Result<Vec<PathBuf>> {
        match &self.content {
            Some(content) if self.tree.is_directory(content) => self.tree.walk_files(content),
            Some(content) => Ok(vec![content.clone()]),
            None => Ok(vec![]),
        }
    }

    /// deserialize the descriptor file
    pub fn parse_descriptor<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.tree.read_file(&self.xml)?;
        from_xml(&data, &self.xml)
    }

    /// path relative to the package root, starting at the type directory
    ///
    /// the package root is taken from the descriptor, so files nested below
    /// a folder that repeats the type directory name keep their full tail
    pub fn package_relative_path(&self, path: &Path) -> PathBuf {
        let directory_name = &self.type_.directory_name;
        let xml: Vec<_> = self.xml.components().collect();
        if let Some(i) = xml.iter().rposition(|c| c.as_os_str() == directory_name.as_str()) {
            let root: PathBuf = xml[..i].iter().collect();
            if let Ok(rest) = path.strip_prefix(&root) {
                if rest.starts_with(directory_name) {
                    return rest.to_path_buf();
                }
            }
        }
        package_relative_path(path, directory_name)
    }

    /// type and full name identify a component across representations
    pub fn same_identity(&self, other: &SourceComponent) -> bool {
        self.type_.is(&other.type_.name) && self.full_name == other.full_name
    }
}

impl fmt::Display for SourceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_.name, self.full_name)
    }
}

/// a component identity without files, as declared by a manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataComponent {
    pub full_name: String,
    pub type_: Arc<TypeDescriptor>,
}

impl MetadataComponent {
    pub fn new(full_name: impl Into<String>, type_: Arc<TypeDescriptor>) -> Self {
        Self {
            full_name: full_name.into(),
            type_,
        }
    }
}

impl fmt::Display for MetadataComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_.name, self.full_name)
    }
}

/// trim a path so it starts at the last `directory_name` component
///
/// paths without that component collapse to `directory_name/<file name>`
pub fn package_relative_path(path: &Path, directory_name: &str) -> PathBuf {
    let components: Vec<_> = path.components().collect();
    match components
        .iter()
        .rposition(|c| c.as_os_str() == directory_name)
    {
        Some(i) => components[i..].iter().collect(),
        None => {
            let mut out = PathBuf::from(directory_name);
            if let Some(name) = path.file_name() {
                out.push(name);
            }
            out
        }
    }
}

/// file name up to the first dot
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((base, _)) => base.to_string(),
        None => name,
    }
}

/// path with the file name cut at its first dot
pub fn strip_suffix(path: &Path) -> PathBuf {
    path.with_file_name(base_name(path))
}
