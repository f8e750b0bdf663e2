use std::path::PathBuf;

use super::writer::write_instructions;
use super::{Format, MetadataTransformer, OutputTarget, Transformer, TransformerContext, WriteInstruction};
use crate::component::SourceComponent;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::resolve::PackageManifest;

/// api version written to generated manifests
pub const DEFAULT_API_VERSION: &str = "60.0";

/// manifest file name inside a metadata-format package
pub const MANIFEST_FILE_NAME: &str = "package.xml";

/// summary of one conversion
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvertResult {
    pub components: usize,
    pub files_written: usize,
}

/// converts resolved components and writes them to an output target
pub struct Converter<'r> {
    registry: &'r Registry,
    config: Config,
    api_version: String,
}

impl<'r> Converter<'r> {
    pub fn new(registry: &'r Registry, config: Config) -> Self {
        Self {
            registry,
            config,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// api version of the generated package.xml
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// directory relative destinations land in
    fn output_root(&self, format: Format, output: &OutputTarget) -> Result<PathBuf> {
        match (format, output) {
            (Format::Source, OutputTarget::Zip(_)) => Err(Error::Unsupported(
                "source format can only be written to a directory".to_string(),
            )),
            (Format::Source, OutputTarget::Directory(dir)) => Ok(match &self.config.default_directory {
                Some(default) => dir.join(default),
                None => dir.clone(),
            }),
            (Format::Metadata, target) => Ok(target.path().to_path_buf()),
        }
    }

    /// convert components into format and write them to output
    ///
    /// a component with the same identity in merge_with has its paths reused.
    /// metadata format output also gets a package.xml listing the components.
    pub async fn convert(
        &self,
        components: &[SourceComponent],
        format: Format,
        output: &OutputTarget,
        merge_with: &[SourceComponent],
    ) -> Result<ConvertResult> {
        let root = self.output_root(format, output)?;
        let context = TransformerContext::new(&root, self.config.max_concurrent_writes);

        let mut instructions: Vec<WriteInstruction> = Vec::new();
        for component in components {
            let transformer = Transformer::for_type(component.type_(), self.registry, &context)?;
            let converted = match format {
                Format::Metadata => transformer.to_metadata_format(component).await?,
                Format::Source => {
                    let merge = merge_with.iter().find(|m| m.same_identity(component));
                    if merge.is_some() {
                        tracing::debug!("merging {} into existing files", component);
                    }
                    transformer.to_source_format(component, merge).await?
                }
            };
            instructions.extend(converted);
        }

        if format == Format::Metadata {
            let manifest = PackageManifest::from_components(
                components
                    .iter()
                    .map(|c| (c.type_().name.as_str(), c.full_name())),
                self.api_version.clone(),
            );
            instructions.push(WriteInstruction::bytes(manifest.to_xml()?, MANIFEST_FILE_NAME));
        }

        let target = match output {
            OutputTarget::Directory(_) => OutputTarget::Directory(root),
            OutputTarget::Zip(path) => OutputTarget::Zip(path.clone()),
        };
        let files_written = write_instructions(instructions, &target, &context.write_limit).await?;

        tracing::info!(
            "converted {} components to {} format",
            components.len(),
            format
        );
        Ok(ConvertResult {
            components: components.len(),
            files_written,
        })
    }
}
