//! adapter rules: how the files inside a type directory form components

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Walker, META_XML_SUFFIX};
use crate::component::SourceComponent;
use crate::convert::content_type::check_expanded_archive;
use crate::error::{Error, Result};
use crate::registry::{longest_suffix, AdapterKind, TransformerKind, TypeDescriptor};

impl Walker<'_> {
    /// default, matching-content and mixed-content types
    ///
    /// `folder` holds the folder names between the type directory and `dir`
    /// for in-folder types.
    pub(super) fn resolve_files(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        dir: &Path,
        folder: &[String],
    ) -> Result<()> {
        let names = self.tree.read_directory(dir)?;
        let registry = self.registry;
        let folder_ty = registry.folder_type_of(ty)?.cloned();
        let mut claimed: HashSet<String> = HashSet::new();

        let candidates: Vec<&str> = ty
            .suffix
            .iter()
            .chain(folder_ty.iter().filter_map(|f| f.suffix.as_ref()))
            .map(String::as_str)
            .collect();

        for name in &names {
            let Some(descriptor_name) = name.strip_suffix(META_XML_SUFFIX) else {
                continue;
            };
            let path = dir.join(name);
            if self.is_ignored(&path) {
                claimed.insert(name.clone());
                continue;
            }
            let Some((suffix, stem)) = longest_suffix(descriptor_name, candidates.iter().copied())
            else {
                tracing::debug!("no {} suffix on {}, skipping", ty.name, path.display());
                continue;
            };
            claimed.insert(name.clone());

            let folder_match = folder_ty
                .as_ref()
                .filter(|f| f.suffix.as_deref() == Some(suffix));
            if let Some(folder_ty) = folder_match {
                let full_name = join_folder(folder, stem);
                self.push(SourceComponent::new(
                    full_name,
                    Arc::clone(folder_ty),
                    path,
                    None,
                    Arc::clone(self.tree),
                ));
                continue;
            }

            let full_name = if ty.in_folder {
                join_folder(folder, stem)
            } else {
                stem.to_string()
            };

            match ty.strategies.adapter {
                AdapterKind::MatchingContent => {
                    let content = dir.join(descriptor_name);
                    if self.tree.exists(&content) && !self.tree.is_directory(&content) {
                        claimed.insert(descriptor_name.to_string());
                        self.push_component(full_name, ty, path, Some(content));
                    } else {
                        self.fail_missing_content(ty, &full_name, path);
                    }
                }
                AdapterKind::MixedContent => {
                    match self.find_mixed_content(dir, &names, name, stem) {
                        Some(content_name) => {
                            let content = dir.join(&content_name);
                            claimed.insert(content_name);
                            self.push_component(full_name, ty, path, Some(content));
                        }
                        None => self.fail_missing_content(ty, &full_name, path),
                    }
                }
                _ => self.push_component(full_name, ty, path, None),
            }
        }

        for name in &names {
            if claimed.contains(name) {
                continue;
            }
            let path = dir.join(name);
            if self.is_ignored(&path) {
                continue;
            }

            if self.tree.is_directory(&path) {
                if ty.in_folder {
                    let mut nested = folder.to_vec();
                    nested.push(name.clone());
                    if let Err(e) = self.resolve_files(ty, &path, &nested) {
                        self.fail(&path, &ty.name, e);
                    }
                } else if ty.strategies.adapter == AdapterKind::MixedContent {
                    // an expanded content directory nobody describes
                    self.fail(&path, &ty.name, Error::MissingDescriptor(path.clone()));
                } else if let Err(e) = self.resolve_files(ty, &path, folder) {
                    self.fail(&path, &ty.name, e);
                }
                continue;
            }

            match ty.strategies.adapter {
                AdapterKind::Default => {
                    // metadata format: the document itself without -meta.xml
                    let stem = ty
                        .suffix
                        .as_deref()
                        .and_then(|s| longest_suffix(name, [s]))
                        .map(|(_, stem)| stem);
                    if let Some(stem) = stem {
                        let full_name = if ty.in_folder {
                            join_folder(folder, stem)
                        } else {
                            stem.to_string()
                        };
                        self.push_component(full_name, ty, path, None);
                    }
                }
                AdapterKind::MatchingContent => {
                    let matches_suffix = ty
                        .suffix
                        .as_deref()
                        .is_some_and(|s| longest_suffix(name, [s]).is_some());
                    if matches_suffix {
                        self.fail(&path, &ty.name, Error::MissingDescriptor(path.clone()));
                    }
                }
                AdapterKind::MixedContent => {
                    self.fail(&path, &ty.name, Error::MissingDescriptor(path.clone()));
                }
                AdapterKind::Bundle | AdapterKind::Decomposed => {}
            }
        }

        Ok(())
    }

    /// content of a mixed-content component: `stem/` or a `stem.*` file
    fn find_mixed_content(
        &self,
        dir: &Path,
        names: &[String],
        descriptor: &str,
        stem: &str,
    ) -> Option<String> {
        if names.iter().any(|n| n == stem) && self.tree.is_directory(&dir.join(stem)) {
            return Some(stem.to_string());
        }
        let prefix = format!("{}.", stem);
        names
            .iter()
            .find(|n| {
                n.as_str() != descriptor
                    && n.starts_with(&prefix)
                    && !n.ends_with(META_XML_SUFFIX)
                    && !self.tree.is_directory(&dir.join(n.as_str()))
            })
            .cloned()
    }

    /// one component per subdirectory, descriptor inside it
    pub(super) fn resolve_bundles(&mut self, ty: &Arc<TypeDescriptor>, dir: &Path) -> Result<()> {
        for name in self.tree.read_directory(dir)? {
            let path = dir.join(&name);
            if self.is_ignored(&path) || !self.tree.is_directory(&path) {
                continue;
            }
            let prefix = format!("{}.", name);
            let descriptor = self
                .tree
                .read_directory(&path)?
                .into_iter()
                .find(|n| n.starts_with(&prefix) && n.ends_with(META_XML_SUFFIX));
            match descriptor {
                Some(descriptor) => {
                    let xml = path.join(descriptor);
                    self.push_component(name, ty, xml, Some(path));
                }
                None => self.fail(&path, &ty.name, Error::MissingDescriptor(path.clone())),
            }
        }
        Ok(())
    }

    /// parent directories with child files, or composed single documents
    pub(super) fn resolve_decomposed(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        dir: &Path,
    ) -> Result<()> {
        let Some(suffix) = ty.suffix.as_deref() else {
            return Err(Error::Registry(format!(
                "decomposed type {} has no suffix",
                ty.name
            )));
        };
        let registry = self.registry;
        let child_types = registry.child_types(ty)?;
        let child_suffixes: Vec<&str> = child_types
            .iter()
            .filter_map(|c| c.suffix.as_deref())
            .collect();

        for name in self.tree.read_directory(dir)? {
            let path = dir.join(&name);
            if self.is_ignored(&path) {
                continue;
            }

            if !self.tree.is_directory(&path) {
                // composed document, or a flat source descriptor
                let document = name.strip_suffix(META_XML_SUFFIX).unwrap_or(&name);
                if let Some((_, stem)) = longest_suffix(document, [suffix]) {
                    self.push_component(stem.to_string(), ty, path, None);
                }
                continue;
            }

            let xml = path.join(format!("{}.{}{}", name, suffix, META_XML_SUFFIX));
            if !self.tree.exists(&xml) {
                self.fail(&path, &ty.name, Error::MissingDescriptor(xml));
                continue;
            }

            let mut children = Vec::new();
            for file in self.tree.walk_files(&path)? {
                if file == xml || self.is_ignored(&file) {
                    continue;
                }
                let Some(file_name) = file.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(document) = file_name.strip_suffix(META_XML_SUFFIX) else {
                    continue;
                };
                let Some((child_suffix, stem)) =
                    longest_suffix(document, child_suffixes.iter().copied())
                else {
                    tracing::debug!("skipping unknown child file {}", file.display());
                    continue;
                };
                let Some(child_ty) = child_types
                    .iter()
                    .find(|c| c.suffix.as_deref() == Some(child_suffix))
                else {
                    continue;
                };
                children.push(SourceComponent::new(
                    format!("{}.{}", name, stem),
                    Arc::clone(child_ty),
                    file.clone(),
                    None,
                    Arc::clone(self.tree),
                ));
            }

            let component =
                SourceComponent::new(name.clone(), Arc::clone(ty), xml, Some(path), Arc::clone(self.tree))
                    .with_children(children);
            self.push(component);
        }
        Ok(())
    }

    fn push_component(
        &mut self,
        full_name: String,
        ty: &Arc<TypeDescriptor>,
        xml: PathBuf,
        content: Option<PathBuf>,
    ) {
        let component =
            SourceComponent::new(full_name, Arc::clone(ty), xml.clone(), content, Arc::clone(self.tree));

        // an expanded directory is only valid for archive content types
        if ty.strategies.transformer == TransformerKind::StaticResource
            && component.content_is_directory()
        {
            if let Err(e) = check_expanded_archive(&component) {
                self.fail(&xml, &ty.name, e);
                return;
            }
        }

        self.push(component);
    }

    fn fail_missing_content(&mut self, ty: &TypeDescriptor, full_name: &str, descriptor: PathBuf) {
        let error = Error::MissingContent {
            component: format!("{}:{}", ty.name, full_name),
            descriptor: descriptor.clone(),
        };
        self.fail(&descriptor, &ty.name, error);
    }
}

fn join_folder(folder: &[String], name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder.join("/"), name)
    }
}
