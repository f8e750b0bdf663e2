//! resources whose content is a single file or an archive that may be expanded

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use super::archive::file_entries;
use super::content_type::{check_expanded_archive, declared_content_type, extension_for, is_archive_type};
use super::writer::{settle, spawn_write, write_file};
use super::{MetadataTransformer, TransformerContext, WriteInstruction};
use crate::component::{base_name, strip_suffix, SourceComponent};
use crate::error::{Error, Result, ZipResultExt};

#[derive(Clone, Debug)]
pub struct StaticResourceTransformer {
    context: TransformerContext,
}

impl StaticResourceTransformer {
    pub fn new(context: TransformerContext) -> Self {
        Self { context }
    }

    /// package-relative directory holding the component's files
    fn package_directory(component: &SourceComponent) -> PathBuf {
        component
            .package_relative_path(component.xml())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&component.type_().directory_name))
    }

    /// content path without its suffix, from the merge target when there is one
    fn base_content_path(component: &SourceComponent, merge_with: Option<&SourceComponent>) -> PathBuf {
        match merge_with {
            Some(merge) => strip_suffix(merge.content().unwrap_or(merge.xml())),
            None => {
                let computed = match component.content() {
                    Some(content) => component.package_relative_path(content),
                    None => component.package_relative_path(component.xml()),
                };
                strip_suffix(&computed)
            }
        }
    }

    fn content<'c>(component: &'c SourceComponent) -> Result<&'c Path> {
        component.content().ok_or_else(|| Error::MissingContent {
            component: component.to_string(),
            descriptor: component.xml().to_path_buf(),
        })
    }

    /// expand the archive content, one bounded concurrent write per file entry
    ///
    /// every write settles before the first failure is returned
    async fn unzip(&self, component: &SourceComponent, base: &Path) -> Result<usize> {
        let content = Self::content(component)?;
        let data: Arc<[u8]> = Arc::from(component.tree().read_file(content)?);
        let label = content.to_path_buf();
        let mut archive = ZipArchive::new(Cursor::new(data)).with_archive(&label)?;
        let entries = file_entries(&mut archive, &label)?;

        let mut handles = Vec::with_capacity(entries.len());
        for (index, name) in entries {
            let mut destination = base.join(&name);
            if destination.is_relative() {
                destination = self.context.default_directory.join(destination);
            }
            let archive = archive.clone();
            let label = label.clone();
            handles.push(spawn_write(
                &self.context.write_limit,
                destination,
                move |path| {
                    let mut archive = archive;
                    let mut entry = archive.by_index(index).with_archive(&label)?;
                    write_file(path, &mut entry)?;
                    Ok(())
                },
            ));
        }

        let written = settle(handles).await?;
        tracing::debug!("expanded {} files of {}", written, component);
        Ok(written)
    }
}

impl MetadataTransformer for StaticResourceTransformer {
    async fn to_metadata_format(&self, component: &SourceComponent) -> Result<Vec<WriteInstruction>> {
        let tree = component.tree();
        let content = Self::content(component)?;
        let directory = Self::package_directory(component);
        let suffix = component.type_().suffix.as_deref().unwrap_or("resource");
        let destination = directory.join(format!("{}.{}", base_name(component.xml()), suffix));

        let packed = if component.content_is_directory() {
            check_expanded_archive(component)?;
            WriteInstruction::archive(tree, content, destination)
        } else {
            WriteInstruction::copy(tree, content, destination)
        };

        let descriptor_name = component
            .xml()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        Ok(vec![
            packed,
            WriteInstruction::copy(tree, component.xml(), directory.join(descriptor_name)),
        ])
    }

    async fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<Vec<WriteInstruction>> {
        check_expanded_archive(component)?;
        let tree = component.tree();
        let content_type = declared_content_type(component)?;
        let should_unzip = is_archive_type(&content_type)
            && merge_with.map_or(true, SourceComponent::content_is_directory);
        let base = Self::base_content_path(component, merge_with);

        let mut instructions = Vec::new();
        if should_unzip && component.content_is_directory() {
            // already expanded, copy file by file
            let content = Self::content(component)?;
            for file in component.content_files()? {
                let relative = file.strip_prefix(content).unwrap_or(&file).to_path_buf();
                instructions.push(WriteInstruction::copy(tree, &file, base.join(relative)));
            }
        } else if should_unzip {
            self.unzip(component, &base).await?;
        } else if component.content_is_directory() {
            // expanded content merging into a packed resource is packed again
            let content = Self::content(component)?;
            let name = format!("{}.{}", base_name(&base), extension_for(&content_type));
            instructions.push(WriteInstruction::archive(tree, content, base.with_file_name(name)));
        } else {
            let content = Self::content(component)?;
            let name = format!("{}.{}", base_name(&base), extension_for(&content_type));
            instructions.push(WriteInstruction::copy(tree, content, base.with_file_name(name)));
        }

        let descriptor = match merge_with {
            Some(merge) => merge.xml().to_path_buf(),
            None => component.package_relative_path(component.xml()),
        };
        instructions.push(WriteInstruction::copy(tree, component.xml(), descriptor));
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::archive::zip_directory;
    use crate::convert::writer::write_instructions;
    use crate::convert::{OutputTarget, WriteSource};
    use crate::registry::Registry;
    use crate::resolve::SourceResolver;
    use crate::tree::{DiskTree, MemoryTree, TreeContainer};
    use std::fs;
    use std::io::{Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn descriptor(content_type: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<StaticResource xmlns="http://soap.sforce.com/2006/04/metadata">
    <cacheControl>Private</cacheControl>
    <contentType>{}</contentType>
</StaticResource>"#,
            content_type
        )
    }

    fn zip_of(files: &[(&str, &str)], dirs: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for dir in dirs {
            writer.add_directory(*dir, SimpleFileOptions::default()).unwrap();
        }
        for (name, data) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn resolve(tree: MemoryTree, root: &str, full_name: &str) -> SourceComponent {
        let registry = Registry::builtin().unwrap();
        let report = SourceResolver::new(&registry, Arc::new(tree))
            .resolve(Path::new(root))
            .unwrap();
        assert!(report.is_complete(), "{:?}", report.failures);
        report.find("StaticResource", full_name).unwrap().clone()
    }

    /// a metadata-format resource: `<name>.resource` plus its descriptor
    fn retrieved(name: &str, content_type: &str, content: Vec<u8>) -> SourceComponent {
        let tree = MemoryTree::new()
            .with_file(format!("pkg/staticresources/{}.resource", name), content)
            .with_file(
                format!("pkg/staticresources/{}.resource-meta.xml", name),
                descriptor(content_type),
            );
        resolve(tree, "pkg", name)
    }

    fn transformer(dir: &Path, limit: usize) -> StaticResourceTransformer {
        StaticResourceTransformer::new(TransformerContext::new(dir, limit))
    }

    fn destinations(instructions: &[WriteInstruction]) -> Vec<PathBuf> {
        instructions.iter().map(|i| i.destination.clone()).collect()
    }

    #[tokio::test]
    async fn test_to_metadata_packs_expanded_directory() {
        let tree = MemoryTree::from_entries([
            ("force-app/staticresources/app/index.html", "<html/>"),
            ("force-app/staticresources/app/js/main.js", "main()"),
        ])
        .with_file(
            "force-app/staticresources/app.resource-meta.xml",
            descriptor("application/zip"),
        );
        let component = resolve(tree, "force-app", "app");
        let dir = tempfile::tempdir().unwrap();

        let out = transformer(dir.path(), 4)
            .to_metadata_format(&component)
            .await
            .unwrap();

        assert_eq!(
            destinations(&out),
            vec![
                PathBuf::from("staticresources/app.resource"),
                PathBuf::from("staticresources/app.resource-meta.xml"),
            ]
        );
        let archive = out[0].source.read_all().unwrap();
        assert_eq!(
            archive,
            zip_directory(component.tree().as_ref(), Path::new("force-app/staticresources/app")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_to_metadata_raw_content() {
        let tree = MemoryTree::new()
            .with_file("force-app/staticresources/logo.png", vec![0x89, b'P', b'N', b'G'])
            .with_file(
                "force-app/staticresources/logo.resource-meta.xml",
                descriptor("image/png"),
            );
        let component = resolve(tree, "force-app", "logo");

        let out = transformer(Path::new("out"), 4)
            .to_metadata_format(&component)
            .await
            .unwrap();
        assert_eq!(out[0].destination, PathBuf::from("staticresources/logo.resource"));
        assert_eq!(out[0].source.read_all().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_to_source_extension_from_content_type() {
        let out_dir = tempfile::tempdir().unwrap();
        let t = transformer(out_dir.path(), 4);

        let haml = retrieved("page", "text/x-haml", b"%p hi".to_vec());
        let out = t.to_source_format(&haml, None).await.unwrap();
        assert_eq!(
            destinations(&out),
            vec![
                PathBuf::from("staticresources/page.haml"),
                PathBuf::from("staticresources/page.resource-meta.xml"),
            ]
        );

        let unknown = retrieved("blob", "application/x-unheard-of", b"??".to_vec());
        let out = t.to_source_format(&unknown, None).await.unwrap();
        assert_eq!(out[0].destination, PathBuf::from("staticresources/blob.bin"));
    }

    #[tokio::test]
    async fn test_to_source_missing_content_type() {
        let tree = MemoryTree::new()
            .with_file("pkg/staticresources/app.resource", "x")
            .with_file(
                "pkg/staticresources/app.resource-meta.xml",
                "<StaticResource><cacheControl>Public</cacheControl></StaticResource>",
            );
        let component = resolve(tree, "pkg", "app");

        let err = transformer(Path::new("out"), 4)
            .to_source_format(&component, None)
            .await
            .unwrap_err();
        match err {
            Error::MissingContentType { component, .. } => assert_eq!(component, "StaticResource:app"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_to_source_unzips_file_entries() {
        let data = zip_of(
            &[
                ("index.html", "<html/>"),
                ("js/main.js", "main()"),
                ("img/a.svg", "<svg/>"),
            ],
            &["js/", "img/", "empty/"],
        );
        let component = retrieved("app", "application/zip", data);
        let out_dir = tempfile::tempdir().unwrap();

        let out = transformer(out_dir.path(), 2)
            .to_source_format(&component, None)
            .await
            .unwrap();

        // only the descriptor is left for the writer
        assert_eq!(
            destinations(&out),
            vec![PathBuf::from("staticresources/app.resource-meta.xml")]
        );

        let expanded = out_dir.path().join("staticresources/app");
        let files = DiskTree::new().walk_files(&expanded).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(fs::read(expanded.join("js/main.js")).unwrap(), b"main()");
        assert_eq!(fs::read(expanded.join("img/a.svg")).unwrap(), b"<svg/>");
        assert!(!expanded.join("empty").exists());
    }

    #[tokio::test]
    async fn test_unzip_many_files_bounded() {
        let names: Vec<String> = (0..100).map(|i| format!("files/f{:03}.txt", i)).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), n.as_str())).collect();
        let component = retrieved("many", "application/zip", zip_of(&files, &[]));
        let out_dir = tempfile::tempdir().unwrap();

        transformer(out_dir.path(), 3)
            .to_source_format(&component, None)
            .await
            .unwrap();

        let expanded = out_dir.path().join("staticresources/many");
        assert_eq!(DiskTree::new().walk_files(&expanded).unwrap().len(), 100);
        for name in &names {
            assert_eq!(fs::read(expanded.join(name)).unwrap(), name.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_unzip_failure_lets_other_files_land() {
        let data = zip_of(
            &[("a.txt", "a"), ("blocked.txt", "b"), ("c.txt", "c")],
            &[],
        );
        let component = retrieved("app", "application/zip", data);
        let out_dir = tempfile::tempdir().unwrap();
        let expanded = out_dir.path().join("staticresources/app");
        fs::create_dir_all(expanded.join("blocked.txt/inner")).unwrap();

        let err = transformer(out_dir.path(), 4)
            .to_source_format(&component, None)
            .await
            .unwrap_err();

        match err {
            Error::WriteFailed { path, .. } => assert_eq!(path, expanded.join("blocked.txt")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(fs::read(expanded.join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(expanded.join("c.txt")).unwrap(), b"c");
    }

    #[tokio::test]
    async fn test_merge_with_plain_file_does_not_unzip() {
        let data = zip_of(&[("index.html", "<html/>")], &[]);
        let component = retrieved("app", "application/zip", data.clone());

        let work = tempfile::tempdir().unwrap();
        let project = work.path().join("force-app/staticresources");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("app.zip"), b"old archive").unwrap();
        fs::write(project.join("app.resource-meta.xml"), descriptor("application/zip")).unwrap();
        let registry = Registry::builtin().unwrap();
        let merge = SourceResolver::new(&registry, Arc::new(DiskTree::new()))
            .resolve(&work.path().join("force-app"))
            .unwrap()
            .find("StaticResource", "app")
            .unwrap()
            .clone();

        let out_dir = tempfile::tempdir().unwrap();
        let out = transformer(out_dir.path(), 4)
            .to_source_format(&component, Some(&merge))
            .await
            .unwrap();

        assert_eq!(
            destinations(&out),
            vec![project.join("app.zip"), project.join("app.resource-meta.xml")]
        );
        assert!(!out_dir.path().join("staticresources").exists());
        assert!(!project.join("app").exists());

        let limit = Arc::new(tokio::sync::Semaphore::new(4));
        write_instructions(out, &OutputTarget::Directory(out_dir.path().to_path_buf()), &limit)
            .await
            .unwrap();
        assert_eq!(fs::read(project.join("app.zip")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_merge_with_expanded_directory_unzips_into_it() {
        let data = zip_of(&[("index.html", "<html>v2</html>")], &[]);
        let component = retrieved("app", "application/zip", data);

        let work = tempfile::tempdir().unwrap();
        let project = work.path().join("force-app/staticresources");
        fs::create_dir_all(project.join("app")).unwrap();
        fs::write(project.join("app/index.html"), b"<html>v1</html>").unwrap();
        fs::write(project.join("app.resource-meta.xml"), descriptor("application/zip")).unwrap();
        let registry = Registry::builtin().unwrap();
        let merge = SourceResolver::new(&registry, Arc::new(DiskTree::new()))
            .resolve(&work.path().join("force-app"))
            .unwrap()
            .find("StaticResource", "app")
            .unwrap()
            .clone();

        let out = transformer(Path::new("unused"), 4)
            .to_source_format(&component, Some(&merge))
            .await
            .unwrap();

        assert_eq!(destinations(&out), vec![project.join("app.resource-meta.xml")]);
        assert_eq!(
            fs::read(project.join("app/index.html")).unwrap(),
            b"<html>v2</html>"
        );
    }

    fn by_hand(tree: MemoryTree, xml: &str, content: &str) -> SourceComponent {
        let registry = Registry::builtin().unwrap();
        let ty = registry.get_type_by_name("StaticResource").unwrap().clone();
        SourceComponent::new("app", ty, xml, Some(PathBuf::from(content)), Arc::new(tree))
    }

    #[tokio::test]
    async fn test_to_source_expanded_non_archive_fails() {
        let tree = MemoryTree::new()
            .with_file("pkg/staticresources/app/a.css", "body {}")
            .with_file("pkg/staticresources/app.resource-meta.xml", descriptor("text/css"));
        let component = by_hand(
            tree,
            "pkg/staticresources/app.resource-meta.xml",
            "pkg/staticresources/app",
        );

        let err = transformer(Path::new("unused"), 4)
            .to_source_format(&component, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExpectedArchive { .. }), "{}", err);
    }

    #[tokio::test]
    async fn test_merge_expanded_directory_into_plain_file_repacks() {
        let tree = MemoryTree::new()
            .with_file("pkg/staticresources/app/a.js", "a()")
            .with_file("pkg/staticresources/app/css/b.css", "b {}")
            .with_file(
                "pkg/staticresources/app.resource-meta.xml",
                descriptor("application/zip"),
            );
        let component = by_hand(
            tree,
            "pkg/staticresources/app.resource-meta.xml",
            "pkg/staticresources/app",
        );
        let project = MemoryTree::new()
            .with_file("proj/staticresources/app.zip", "zip")
            .with_file(
                "proj/staticresources/app.resource-meta.xml",
                descriptor("application/zip"),
            );
        let merge = by_hand(
            project,
            "proj/staticresources/app.resource-meta.xml",
            "proj/staticresources/app.zip",
        );

        let out = transformer(Path::new("unused"), 4)
            .to_source_format(&component, Some(&merge))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].destination, PathBuf::from("proj/staticresources/app.zip"));
        assert!(matches!(out[0].source, WriteSource::Archive { .. }));

        let data = out[0].source.read_all().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.js", "css/b.css"]);
        let mut text = String::new();
        archive.by_name("css/b.css").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "b {}");
    }

    #[tokio::test]
    async fn test_round_trip_expanded_directory() {
        let source = MemoryTree::from_entries([
            ("force-app/staticresources/app/index.html", "<html/>"),
            ("force-app/staticresources/app/js/main.js", "main()"),
            ("force-app/staticresources/app/css/site.css", "body {}"),
        ])
        .with_file(
            "force-app/staticresources/app.resource-meta.xml",
            descriptor("application/zip"),
        );
        let before = resolve(source, "force-app", "app");
        let t = transformer(Path::new("unused"), 4);

        // to metadata, materialized as a fresh tree
        let mut metadata = MemoryTree::new();
        for instruction in t.to_metadata_format(&before).await.unwrap() {
            let path = Path::new("pkg").join(&instruction.destination);
            metadata.add_file(path, instruction.source.read_all().unwrap());
        }
        let packed = resolve(metadata, "pkg", "app");

        // and back
        let out_dir = tempfile::tempdir().unwrap();
        let out = transformer(out_dir.path(), 4)
            .to_source_format(&packed, None)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);

        let expanded = out_dir.path().join("staticresources/app");
        for file in before.content_files().unwrap() {
            let relative = file.strip_prefix("force-app/staticresources/app").unwrap();
            assert_eq!(
                fs::read(expanded.join(relative)).unwrap(),
                before.tree().read_file(&file).unwrap()
            );
        }
        assert_eq!(DiskTree::new().walk_files(&expanded).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_round_trip_plain_file() {
        let source = MemoryTree::new()
            .with_file("force-app/staticresources/site.css", "body { color: red }")
            .with_file(
                "force-app/staticresources/site.resource-meta.xml",
                descriptor("text/css"),
            );
        let before = resolve(source, "force-app", "site");
        let t = transformer(Path::new("unused"), 4);

        let mut metadata = MemoryTree::new();
        for instruction in t.to_metadata_format(&before).await.unwrap() {
            metadata.add_file(
                Path::new("pkg").join(&instruction.destination),
                instruction.source.read_all().unwrap(),
            );
        }
        let packed = resolve(metadata, "pkg", "site");

        let out = t.to_source_format(&packed, None).await.unwrap();
        assert_eq!(out[0].destination, PathBuf::from("staticresources/site.css"));
        assert_eq!(out[0].source.read_all().unwrap(), b"body { color: red }");
    }
}
