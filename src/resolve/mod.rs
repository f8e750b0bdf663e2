//! component resolution
//!
//! [`SourceResolver`] walks a tree and turns files into components using the
//! registry's adapter rules. [`ManifestResolver`] turns a package manifest into
//! component identities. Both are read-only and synchronous; a resolver only
//! borrows the registry, so independent trees can be resolved in parallel.

mod adapters;
pub mod manifest;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::component::SourceComponent;
use crate::error::{Error, Result};
use crate::registry::{AdapterKind, Registry, TypeDescriptor};
use crate::tree::TreeContainer;

pub use manifest::{ManifestResolver, PackageManifest, PackageTypeMembers, ResolveManifestResult};

/// file name suffix marking a descriptor in the source format
pub const META_XML_SUFFIX: &str = "-meta.xml";

/// a component that could not be resolved; siblings still resolve
#[derive(Debug)]
pub struct ResolveFailure {
    pub path: PathBuf,
    pub type_name: String,
    pub error: Error,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.path.display(),
            self.type_name,
            self.error
        )
    }
}

/// outcome of walking a tree
#[derive(Debug, Default)]
pub struct ResolveReport {
    pub components: Vec<SourceComponent>,
    pub failures: Vec<ResolveFailure>,
}

impl ResolveReport {
    /// did every matching entry resolve
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// find a component by type name and full name
    pub fn find(&self, type_name: &str, full_name: &str) -> Option<&SourceComponent> {
        self.components
            .iter()
            .find(|c| c.type_().is(type_name) && c.full_name() == full_name)
    }
}

/// resolves every component below a root directory of a tree
pub struct SourceResolver<'r> {
    registry: &'r Registry,
    tree: Arc<dyn TreeContainer>,
    ignore: Vec<glob::Pattern>,
}

impl<'r> SourceResolver<'r> {
    pub fn new(registry: &'r Registry, tree: Arc<dyn TreeContainer>) -> Self {
        Self {
            registry,
            tree,
            ignore: vec![],
        }
    }

    /// skip paths matching any pattern, relative to the resolve root
    pub fn with_ignore(mut self, patterns: Vec<glob::Pattern>) -> Self {
        self.ignore = patterns;
        self
    }

    /// walk root and resolve every component below it
    ///
    /// per-component problems are collected in the report; only a root that
    /// cannot be listed at all fails the call.
    pub fn resolve(&self, root: &Path) -> Result<ResolveReport> {
        if !self.tree.exists(root) {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }
        if !self.tree.is_directory(root) {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        let mut walker = Walker {
            registry: self.registry,
            tree: &self.tree,
            ignore: &self.ignore,
            root,
            report: ResolveReport::default(),
        };

        // the root itself may be a type directory
        let root_type = root
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| self.registry.type_by_directory_name(n));
        match root_type {
            Some(ty) => walker.resolve_type_directory(ty, root),
            None => walker.walk(root)?,
        }

        let report = walker.report;
        tracing::debug!(
            "resolved {} components, {} failures under {}",
            report.components.len(),
            report.failures.len(),
            root.display()
        );
        Ok(report)
    }
}

/// state of one resolve call
pub(crate) struct Walker<'a> {
    registry: &'a Registry,
    tree: &'a Arc<dyn TreeContainer>,
    ignore: &'a [glob::Pattern],
    root: &'a Path,
    report: ResolveReport,
}

impl Walker<'_> {
    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignore.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(self.root).unwrap_or(path);
        self.ignore.iter().any(|p| p.matches_path(rel))
    }

    /// walk directories that are not owned by a type
    fn walk(&mut self, dir: &Path) -> Result<()> {
        let registry = self.registry;
        for name in self.tree.read_directory(dir)? {
            let path = dir.join(&name);
            if self.is_ignored(&path) {
                tracing::debug!("ignoring {}", path.display());
                continue;
            }
            if self.tree.is_directory(&path) {
                match registry.type_by_directory_name(&name) {
                    Some(ty) => self.resolve_type_directory(ty, &path),
                    None => {
                        if let Err(e) = self.walk(&path) {
                            self.fail(&path, "<directory>", e);
                        }
                    }
                }
            } else {
                self.resolve_loose_file(&path, &name);
            }
        }
        Ok(())
    }

    /// hand a type directory to the type's adapter
    fn resolve_type_directory(&mut self, ty: &Arc<TypeDescriptor>, dir: &Path) {
        tracing::debug!(
            "resolving {} as {} ({:?})",
            dir.display(),
            ty.name,
            ty.strategies.adapter
        );
        let result = match ty.strategies.adapter {
            AdapterKind::Bundle => self.resolve_bundles(ty, dir),
            AdapterKind::Decomposed => self.resolve_decomposed(ty, dir),
            AdapterKind::Default | AdapterKind::MatchingContent | AdapterKind::MixedContent => {
                self.resolve_files(ty, dir, &[])
            }
        };
        if let Err(e) = result {
            self.fail(dir, &ty.name, e);
        }
    }

    /// a descriptor or content file found outside any type directory
    fn resolve_loose_file(&mut self, path: &Path, name: &str) {
        let (descriptor_name, is_descriptor) = match name.strip_suffix(META_XML_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };
        let registry = self.registry;
        let Some((ty, stem)) = registry.type_for_file_name(descriptor_name) else {
            return;
        };
        if ty.strict_directory_name || ty.is_child_type() {
            return;
        }
        let ty = Arc::clone(ty);
        let dir = path.parent().unwrap_or(Path::new(""));

        match (ty.strategies.adapter, is_descriptor) {
            (AdapterKind::Default, true) => {
                self.push(SourceComponent::new(stem, ty, path, None, Arc::clone(self.tree)));
            }
            (AdapterKind::MatchingContent, true) => {
                let content = dir.join(descriptor_name);
                if self.tree.exists(&content) {
                    let c = SourceComponent::new(stem, ty, path, Some(content), Arc::clone(self.tree));
                    self.push(c);
                } else {
                    let e = Error::MissingContent {
                        component: format!("{}:{}", ty.name, stem),
                        descriptor: path.to_path_buf(),
                    };
                    self.fail(path, &ty.name, e);
                }
            }
            (AdapterKind::MatchingContent, false) => {
                let descriptor = dir.join(format!("{}{}", name, META_XML_SUFFIX));
                if !self.tree.exists(&descriptor) {
                    self.fail(path, &ty.name, Error::MissingDescriptor(path.to_path_buf()));
                }
            }
            _ => {}
        }
    }

    fn push(&mut self, component: SourceComponent) {
        tracing::debug!("resolved {}", component);
        self.report.components.push(component);
    }

    fn fail(&mut self, path: &Path, type_name: &str, error: Error) {
        tracing::warn!("could not resolve {}: {}", path.display(), error);
        self.report.failures.push(ResolveFailure {
            path: path.to_path_buf(),
            type_name: type_name.to_string(),
            error,
        });
    }
}
