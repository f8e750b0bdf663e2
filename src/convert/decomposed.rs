//! types stored as one document per child in source format

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{MetadataTransformer, WriteInstruction};
use crate::component::SourceComponent;
use crate::error::{Error, Result};
use crate::registry::{Registry, TypeDescriptor};
use crate::resolve::META_XML_SUFFIX;
use crate::xml::{document_writer, finish_document, xml_write_error, METADATA_NAMESPACE};

/// element whose text names a child document
const FULL_NAME_ELEMENT: &str = "fullName";

/// composes child documents into their parent and splits them back out
#[derive(Clone, Debug)]
pub struct DecomposedTransformer {
    parent: Arc<TypeDescriptor>,
    children: Vec<Arc<TypeDescriptor>>,
}

impl DecomposedTransformer {
    pub fn new(ty: &TypeDescriptor, registry: &Registry) -> Result<Self> {
        let parent = Arc::clone(registry.get_type_by_name(&ty.name)?);
        let mut children = Vec::new();
        for child in registry.child_types(ty)? {
            if child.xml_element.is_none() {
                return Err(Error::Registry(format!(
                    "child type {} of {} has no xml_element",
                    child.name, ty.name
                )));
            }
            children.push(Arc::clone(child));
        }
        Ok(Self { parent, children })
    }

    fn suffix(&self) -> Result<&str> {
        self.parent
            .suffix
            .as_deref()
            .ok_or_else(|| Error::Registry(format!("decomposed type {} has no suffix", self.parent.name)))
    }

    /// child type stored under an element name of the composed document
    fn child_for_element(&self, element: &[u8]) -> Option<&Arc<TypeDescriptor>> {
        self.children
            .iter()
            .find(|c| c.xml_element.as_deref().map(str::as_bytes) == Some(element))
    }

    /// is the component's descriptor a single composed document
    fn is_composed(component: &SourceComponent) -> bool {
        component.children().is_empty()
            && component.content().is_none()
            && !component.xml().to_string_lossy().ends_with(META_XML_SUFFIX)
    }

    /// parent document with every child document appended inside its root
    fn compose(&self, component: &SourceComponent) -> Result<Vec<u8>> {
        let data = component.tree().read_file(component.xml())?;
        let text = utf8(&data, component.xml())?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        let mut writer = document_writer()?;

        let mut depth = 0usize;
        loop {
            let event = reader.read_event().map_err(|e| read_error(component.xml(), e))?;
            match event {
                Event::Decl(_) => {}
                Event::Eof => break,
                Event::Start(e) => {
                    depth += 1;
                    write(&mut writer, Event::Start(e))?;
                }
                Event::End(e) => {
                    if depth == 1 {
                        self.write_children(&mut writer, component)?;
                    }
                    depth = depth.saturating_sub(1);
                    write(&mut writer, Event::End(e))?;
                }
                Event::Empty(e) if depth == 0 => {
                    // a root without content still receives the children
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    write(&mut writer, Event::Start(e))?;
                    self.write_children(&mut writer, component)?;
                    write(&mut writer, Event::End(BytesEnd::new(name)))?;
                }
                other => write(&mut writer, other)?,
            }
        }
        Ok(finish_document(writer))
    }

    fn write_children(&self, writer: &mut Writer<Vec<u8>>, component: &SourceComponent) -> Result<()> {
        for child in component.children() {
            let Some(element) = child.type_().xml_element.as_deref() else {
                continue;
            };
            let data = child.tree().read_file(child.xml())?;
            let text = utf8(&data, child.xml())?;
            let mut reader = Reader::from_str(text);
            reader.config_mut().trim_text(true);

            let mut depth = 0usize;
            loop {
                let event = reader.read_event().map_err(|e| read_error(child.xml(), e))?;
                match event {
                    Event::Decl(_) => {}
                    Event::Eof => break,
                    Event::Start(e) => {
                        depth += 1;
                        if depth == 1 {
                            write(writer, Event::Start(BytesStart::new(element)))?;
                        } else {
                            write(writer, Event::Start(e))?;
                        }
                    }
                    Event::End(e) => {
                        if depth == 1 {
                            write(writer, Event::End(BytesEnd::new(element)))?;
                        } else {
                            write(writer, Event::End(e))?;
                        }
                        depth = depth.saturating_sub(1);
                    }
                    Event::Empty(_) if depth == 0 => {
                        write(writer, Event::Empty(BytesStart::new(element)))?;
                    }
                    other => write(writer, other)?,
                }
            }
        }
        Ok(())
    }

    /// split a composed document into the parent document and one per child
    ///
    /// children are keyed by their `fullName` element; the parent comes first
    fn decompose(&self, data: &[u8], path: &Path) -> Result<Vec<(Option<Arc<TypeDescriptor>>, String, Vec<u8>)>> {
        let text = utf8(data, path)?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut parent = document_writer()?;
        let mut children = Vec::new();
        let mut capture: Option<Capture> = None;
        let mut depth = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| read_error(path, e))?;
            if let Some(current) = capture.as_mut() {
                match &event {
                    Event::Start(e) => {
                        depth += 1;
                        current.in_full_name = depth == 3 && e.name().as_ref() == FULL_NAME_ELEMENT.as_bytes();
                    }
                    Event::End(_) => {
                        current.in_full_name = false;
                        if depth == 2 {
                            depth -= 1;
                            let done = capture.take();
                            if let Some(done) = done {
                                children.push(done.finish(path)?);
                            }
                            continue;
                        }
                        depth -= 1;
                    }
                    Event::Text(t) if current.in_full_name => {
                        let name = t.unescape().map_err(|e| read_error(path, e))?;
                        current.full_name = Some(name.into_owned());
                    }
                    Event::Eof => {
                        return Err(Error::Xml {
                            path: path.to_path_buf(),
                            message: "unexpected end of document".to_string(),
                        })
                    }
                    _ => {}
                }
                write(&mut current.writer, event)?;
                continue;
            }

            match event {
                Event::Decl(_) => {}
                Event::Eof => break,
                Event::Start(e) => {
                    let child = (depth == 1).then(|| self.child_for_element(e.name().as_ref())).flatten();
                    depth += 1;
                    match child {
                        Some(ty) => capture = Some(Capture::new(Arc::clone(ty))?),
                        None => write(&mut parent, Event::Start(e))?,
                    }
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    write(&mut parent, Event::End(e))?;
                }
                other => write(&mut parent, other)?,
            }
        }

        let mut documents = vec![(None, String::new(), finish_document(parent))];
        documents.extend(
            children
                .into_iter()
                .map(|(ty, name, data)| (Some(ty), name, data)),
        );
        Ok(documents)
    }
}

/// a child element being copied into its own document
struct Capture {
    ty: Arc<TypeDescriptor>,
    writer: Writer<Vec<u8>>,
    full_name: Option<String>,
    in_full_name: bool,
}

impl Capture {
    fn new(ty: Arc<TypeDescriptor>) -> Result<Self> {
        let mut writer = document_writer()?;
        let root = BytesStart::new(ty.name.as_str()).with_attributes([("xmlns", METADATA_NAMESPACE)]);
        write(&mut writer, Event::Start(root))?;
        Ok(Self {
            ty,
            writer,
            full_name: None,
            in_full_name: false,
        })
    }

    fn finish(mut self, path: &Path) -> Result<(Arc<TypeDescriptor>, String, Vec<u8>)> {
        write(&mut self.writer, Event::End(BytesEnd::new(self.ty.name.as_str())))?;
        let full_name = self.full_name.ok_or_else(|| Error::Xml {
            path: path.to_path_buf(),
            message: format!("{} element without {}", self.ty.name, FULL_NAME_ELEMENT),
        })?;
        Ok((self.ty, full_name, finish_document(self.writer)))
    }
}

fn utf8<'a>(data: &'a [u8], path: &Path) -> Result<&'a str> {
    std::str::from_utf8(data).map_err(|e| Error::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| xml_write_error(&e))
}

impl MetadataTransformer for DecomposedTransformer {
    async fn to_metadata_format(&self, component: &SourceComponent) -> Result<Vec<WriteInstruction>> {
        let destination = PathBuf::from(&self.parent.directory_name)
            .join(format!("{}.{}", component.full_name(), self.suffix()?));
        if Self::is_composed(component) {
            return Ok(vec![WriteInstruction::copy(component.tree(), component.xml(), destination)]);
        }

        let composed = self.compose(component)?;
        tracing::debug!(
            "composed {} with {} children",
            component,
            component.children().len()
        );
        Ok(vec![WriteInstruction::bytes(composed, destination)])
    }

    async fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<Vec<WriteInstruction>> {
        let suffix = self.suffix()?;
        let composed = if Self::is_composed(component) {
            component.tree().read_file(component.xml())?
        } else {
            self.compose(component)?
        };

        let base = match merge_with {
            Some(merge) => merge
                .content()
                .map(Path::to_path_buf)
                .or_else(|| merge.xml().parent().map(Path::to_path_buf))
                .unwrap_or_default(),
            None => PathBuf::from(&self.parent.directory_name).join(component.full_name()),
        };

        let mut instructions = Vec::new();
        for (child, full_name, data) in self.decompose(&composed, component.xml())? {
            let destination = match child {
                None => base.join(format!("{}.{}{}", component.name(), suffix, META_XML_SUFFIX)),
                Some(ty) => {
                    let child_suffix = ty.suffix.as_deref().unwrap_or(&ty.directory_name);
                    base.join(&ty.directory_name)
                        .join(format!("{}.{}{}", full_name, child_suffix, META_XML_SUFFIX))
                }
            };
            instructions.push(WriteInstruction::bytes(data, destination));
        }
        tracing::debug!("decomposed {} into {} documents", component, instructions.len());
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::SourceResolver;
    use crate::tree::{MemoryTree, TreeContainer};

    const PARENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomObject xmlns="http://soap.sforce.com/2006/04/metadata">
    <label>Account</label>
    <sharingModel>ReadWrite</sharingModel>
</CustomObject>"#;

    const FIELD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomField xmlns="http://soap.sforce.com/2006/04/metadata">
    <fullName>Rating__c</fullName>
    <label>Rating &amp; Score</label>
    <type>Number</type>
</CustomField>"#;

    const LIST_VIEW: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListView xmlns="http://soap.sforce.com/2006/04/metadata">
    <fullName>All</fullName>
    <filterScope>Everything</filterScope>
</ListView>"#;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn resolve(registry: &Registry, tree: MemoryTree, root: &str) -> SourceComponent {
        let report = SourceResolver::new(registry, Arc::new(tree))
            .resolve(Path::new(root))
            .unwrap();
        assert!(report.is_complete(), "{:?}", report.failures);
        report.find("CustomObject", "Account").unwrap().clone()
    }

    fn source_tree() -> MemoryTree {
        MemoryTree::from_entries([
            ("force-app/objects/Account/Account.object-meta.xml", PARENT),
            ("force-app/objects/Account/fields/Rating__c.field-meta.xml", FIELD),
            ("force-app/objects/Account/listViews/All.listView-meta.xml", LIST_VIEW),
        ])
    }

    fn transformer(registry: &Registry) -> DecomposedTransformer {
        let ty = registry.get_type_by_name("CustomObject").unwrap();
        DecomposedTransformer::new(ty, registry).unwrap()
    }

    #[tokio::test]
    async fn test_compose() {
        let registry = registry();
        let component = resolve(&registry, source_tree(), "force-app");
        assert_eq!(component.children().len(), 2);

        let out = transformer(&registry)
            .to_metadata_format(&component)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, PathBuf::from("objects/Account.object"));

        let text = String::from_utf8(out[0].source.read_all().unwrap()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<label>Account</label>"));
        assert!(text.contains("<fields>"));
        assert!(text.contains("<fullName>Rating__c</fullName>"));
        assert!(text.contains("Rating &amp; Score"));
        assert!(text.contains("<listViews>"));
        assert!(!text.contains("<CustomField"));
        assert!(text.trim_end().ends_with("</CustomObject>"));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let registry = registry();
        let before = resolve(&registry, source_tree(), "force-app");
        let t = transformer(&registry);

        let mut metadata = MemoryTree::new();
        for instruction in t.to_metadata_format(&before).await.unwrap() {
            metadata.add_file(
                Path::new("pkg").join(&instruction.destination),
                instruction.source.read_all().unwrap(),
            );
        }
        let composed = resolve(&registry, metadata, "pkg");
        assert!(composed.children().is_empty());

        let out = t.to_source_format(&composed, None).await.unwrap();
        let destinations: Vec<_> = out.iter().map(|i| i.destination.clone()).collect();
        assert_eq!(
            destinations,
            vec![
                PathBuf::from("objects/Account/Account.object-meta.xml"),
                PathBuf::from("objects/Account/fields/Rating__c.field-meta.xml"),
                PathBuf::from("objects/Account/listViews/All.listView-meta.xml"),
            ]
        );

        let field = String::from_utf8(out[1].source.read_all().unwrap()).unwrap();
        assert!(field.contains(r#"<CustomField xmlns="http://soap.sforce.com/2006/04/metadata">"#));
        assert!(field.contains("<fullName>Rating__c</fullName>"));
        assert!(field.contains("Rating &amp; Score"));

        let parent = String::from_utf8(out[0].source.read_all().unwrap()).unwrap();
        assert!(parent.contains("<sharingModel>ReadWrite</sharingModel>"));
        assert!(!parent.contains("<fields>"));

        // the written source tree resolves to the same component set
        let mut rewritten = MemoryTree::new();
        for instruction in &out {
            rewritten.add_file(
                Path::new("again").join(&instruction.destination),
                instruction.source.read_all().unwrap(),
            );
        }
        let again = resolve(&registry, rewritten, "again");
        let names: Vec<_> = again.children().iter().map(|c| c.full_name().to_string()).collect();
        assert_eq!(names, vec!["Account.Rating__c", "Account.All"]);
        assert!(again.tree().exists(Path::new("again/objects/Account/listViews/All.listView-meta.xml")));
    }

    #[tokio::test]
    async fn test_child_without_full_name_is_an_error() {
        let registry = registry();
        let tree = MemoryTree::from_entries([(
            "pkg/objects/Account.object",
            "<CustomObject><fields><label>x</label></fields></CustomObject>",
        )]);
        let component = resolve(&registry, tree, "pkg");

        let err = transformer(&registry)
            .to_source_format(&component, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Xml { .. }));
    }

    #[tokio::test]
    async fn test_empty_parent_receives_children() {
        let registry = registry();
        let tree = MemoryTree::from_entries([
            (
                "force-app/objects/Account/Account.object-meta.xml",
                r#"<CustomObject xmlns="http://soap.sforce.com/2006/04/metadata"/>"#,
            ),
            ("force-app/objects/Account/fields/Rating__c.field-meta.xml", FIELD),
        ]);
        let component = resolve(&registry, tree, "force-app");

        let out = transformer(&registry)
            .to_metadata_format(&component)
            .await
            .unwrap();
        let text = String::from_utf8(out[0].source.read_all().unwrap()).unwrap();
        assert!(text.contains("<fields>"));
        assert!(text.contains("</CustomObject>"));
    }
}
