use std::path::{Path, PathBuf};

use super::{MetadataTransformer, WriteInstruction};
use crate::component::SourceComponent;
use crate::error::Result;
use crate::resolve::META_XML_SUFFIX;

/// copies descriptor and content files between the two layouts
///
/// metadata-only types gain or lose the `-meta.xml` suffix on the descriptor;
/// everything else keeps its package-relative path.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransformer;

impl DefaultTransformer {
    /// content files, the descriptor excluded when it lives inside the content directory
    fn content_files(component: &SourceComponent) -> Result<Vec<PathBuf>> {
        Ok(component
            .content_files()?
            .into_iter()
            .filter(|f| f != component.xml())
            .collect())
    }

    /// destination of a content file, reusing merge paths when given
    fn content_destination(
        component: &SourceComponent,
        file: &Path,
        merge_with: Option<&SourceComponent>,
    ) -> PathBuf {
        let merge_content = merge_with.and_then(|m| m.content().map(|c| (m, c)));
        match (merge_content, component.content()) {
            (Some((merge, target)), Some(content)) if merge.content_is_directory() => {
                match file.strip_prefix(content) {
                    Ok(relative) => target.join(relative),
                    Err(_) => component.package_relative_path(file),
                }
            }
            (Some((_, target)), _) => target.to_path_buf(),
            (None, _) => component.package_relative_path(file),
        }
    }
}

impl MetadataTransformer for DefaultTransformer {
    async fn to_metadata_format(&self, component: &SourceComponent) -> Result<Vec<WriteInstruction>> {
        let tree = component.tree();
        let mut descriptor = component.package_relative_path(component.xml());
        if component.content().is_none() {
            if let Some(name) = descriptor
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(META_XML_SUFFIX))
            {
                descriptor = descriptor.with_file_name(name);
            }
        }

        let mut instructions = vec![WriteInstruction::copy(tree, component.xml(), descriptor)];
        for file in Self::content_files(component)? {
            let destination = component.package_relative_path(&file);
            instructions.push(WriteInstruction::copy(tree, file, destination));
        }
        Ok(instructions)
    }

    async fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<Vec<WriteInstruction>> {
        let tree = component.tree();
        let descriptor = match merge_with {
            Some(merge) => merge.xml().to_path_buf(),
            None => {
                let path = component.package_relative_path(component.xml());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if component.content().is_none() && !name.ends_with(META_XML_SUFFIX) {
                    path.with_file_name(format!("{}{}", name, META_XML_SUFFIX))
                } else {
                    path
                }
            }
        };

        let mut instructions = vec![WriteInstruction::copy(tree, component.xml(), descriptor)];
        for file in Self::content_files(component)? {
            let destination = Self::content_destination(component, &file, merge_with);
            instructions.push(WriteInstruction::copy(tree, file, destination));
        }
        Ok(instructions)
    }
}
