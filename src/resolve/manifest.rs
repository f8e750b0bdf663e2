use std::path::Path;
use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::component::MetadataComponent;
use crate::error::{Error, Result};
use crate::registry::{Registry, TypeDescriptor};
use crate::tree::TreeContainer;
use crate::xml::{document_writer, finish_document, from_xml, xml_write_error, METADATA_NAMESPACE};

/// one `<types>` block of a package manifest
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PackageTypeMembers {
    /// a single `<members>` element and a repeated one both land here
    #[serde(default)]
    pub members: Vec<String>,
    pub name: String,
}

/// a parsed package manifest (package.xml)
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub types: Vec<PackageTypeMembers>,
    pub version: String,
}

impl PackageManifest {
    /// parse manifest xml, path names the document in errors
    pub fn parse(data: &[u8], path: &Path) -> Result<Self> {
        from_xml(data, path).map_err(|e| match e {
            Error::Xml { path, message } => Error::InvalidManifest { path, message },
            other => other,
        })
    }

    /// build a manifest listing components, grouped by type in first-seen order
    pub fn from_components<'c>(
        components: impl IntoIterator<Item = (&'c str, &'c str)>,
        version: impl Into<String>,
    ) -> Self {
        let mut types: Vec<PackageTypeMembers> = Vec::new();
        for (type_name, full_name) in components {
            let block = match types.iter_mut().position(|t| t.name == type_name) {
                Some(i) => &mut types[i],
                None => {
                    types.push(PackageTypeMembers {
                        members: vec![],
                        name: type_name.to_string(),
                    });
                    let last = types.len() - 1;
                    &mut types[last]
                }
            };
            if !block.members.iter().any(|m| m == full_name) {
                block.members.push(full_name.to_string());
            }
        }
        Self {
            full_name: None,
            types,
            version: version.into(),
        }
    }

    /// render the manifest as xml
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = document_writer()?;
        let root = BytesStart::new("Package").with_attributes([("xmlns", METADATA_NAMESPACE)]);
        write(&mut writer, Event::Start(root))?;
        if let Some(full_name) = &self.full_name {
            write_text_element(&mut writer, "fullName", full_name)?;
        }
        for block in &self.types {
            write(&mut writer, Event::Start(BytesStart::new("types")))?;
            for member in &block.members {
                write_text_element(&mut writer, "members", member)?;
            }
            write_text_element(&mut writer, "name", &block.name)?;
            write(&mut writer, Event::End(BytesEnd::new("types")))?;
        }
        write_text_element(&mut writer, "version", &self.version)?;
        write(&mut writer, Event::End(BytesEnd::new("Package")))?;
        Ok(finish_document(writer))
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| xml_write_error(&e))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

/// outcome of resolving a manifest
#[derive(Clone, Debug)]
pub struct ResolveManifestResult {
    pub components: Vec<MetadataComponent>,
    pub api_version: String,
    pub full_name: Option<String>,
}

/// maps the type/member pairs of a manifest to component identities
pub struct ManifestResolver<'r> {
    registry: &'r Registry,
    tree: Arc<dyn TreeContainer>,
}

impl<'r> ManifestResolver<'r> {
    pub fn new(registry: &'r Registry, tree: Arc<dyn TreeContainer>) -> Self {
        Self { registry, tree }
    }

    /// read and resolve the manifest at manifest_path
    pub fn resolve(&self, manifest_path: &Path) -> Result<ResolveManifestResult> {
        let data = self.tree.read_file(manifest_path)?;
        let manifest = PackageManifest::parse(&data, manifest_path)?;
        let components = self.resolve_manifest(&manifest)?;

        tracing::debug!(
            "manifest {} declares {} components (api {})",
            manifest_path.display(),
            components.len(),
            manifest.version
        );

        Ok(ResolveManifestResult {
            components,
            api_version: manifest.version,
            full_name: manifest.full_name,
        })
    }

    /// resolve an already parsed manifest, one component per member in order
    ///
    /// an unknown type name fails the whole manifest
    pub fn resolve_manifest(&self, manifest: &PackageManifest) -> Result<Vec<MetadataComponent>> {
        let mut components = Vec::new();
        for block in &manifest.types {
            let ty = self.registry.get_type_by_name(&block.name)?;
            for member in &block.members {
                let member_ty = self.member_type(ty, member, &block.members)?;
                components.push(MetadataComponent::new(member.clone(), member_ty));
            }
        }
        Ok(components)
    }

    /// the type a member resolves to, reclassifying folders of folder-aware types
    ///
    /// in-folder types: a member without `/` is a folder when another member
    /// of the same block starts with `member/`. other types with a folder
    /// type: the member is a folder whenever the folder type's own
    /// `folder_type` is not the folder type itself.
    fn member_type(
        &self,
        ty: &Arc<TypeDescriptor>,
        member: &str,
        members: &[String],
    ) -> Result<Arc<TypeDescriptor>> {
        let Some(folder_type_name) = &ty.folder_type else {
            return Ok(Arc::clone(ty));
        };
        let folder_ty = self.registry.get_type_by_name(folder_type_name)?;

        let nested = if ty.in_folder {
            let prefix = format!("{}/", member);
            !member.contains('/') && members.iter().any(|m| m.starts_with(&prefix))
        } else {
            !folder_ty
                .folder_type
                .as_deref()
                .is_some_and(|own| folder_ty.is(own))
        };

        if nested {
            tracing::debug!("{} resolves to folder type {}", member, folder_ty.name);
            Ok(Arc::clone(folder_ty))
        } else {
            Ok(Arc::clone(ty))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryTree;

    fn resolve_doc(doc: &str) -> Result<ResolveManifestResult> {
        let registry = Registry::builtin()?;
        let tree = MemoryTree::new().with_file("package.xml", doc);
        ManifestResolver::new(&registry, Arc::new(tree)).resolve(Path::new("package.xml"))
    }

    fn pairs(result: &ResolveManifestResult) -> Vec<(String, String)> {
        result
            .components
            .iter()
            .map(|c| (c.type_.name.clone(), c.full_name.clone()))
            .collect()
    }

    #[test]
    fn test_resolve_manifest() {
        let result = resolve_doc(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <fullName>my-package</fullName>
    <types>
        <members>Foo</members>
        <members>Bar</members>
        <name>ApexClass</name>
    </types>
    <types>
        <members>app</members>
        <name>StaticResource</name>
    </types>
    <version>60.0</version>
</Package>"#,
        )
        .unwrap();

        assert_eq!(result.api_version, "60.0");
        assert_eq!(result.full_name.as_deref(), Some("my-package"));
        assert_eq!(
            pairs(&result),
            vec![
                ("ApexClass".to_string(), "Foo".to_string()),
                ("ApexClass".to_string(), "Bar".to_string()),
                ("StaticResource".to_string(), "app".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_member_same_as_list() {
        let scalar = resolve_doc(
            r#"<Package>
    <types><members>Foo</members><name>ApexClass</name></types>
    <version>60.0</version>
</Package>"#,
        )
        .unwrap();

        let manifest = PackageManifest {
            full_name: None,
            types: vec![PackageTypeMembers {
                members: vec!["Foo".to_string()],
                name: "ApexClass".to_string(),
            }],
            version: "60.0".to_string(),
        };
        let registry = Registry::builtin().unwrap();
        let listed = ManifestResolver::new(&registry, Arc::new(MemoryTree::new()))
            .resolve_manifest(&manifest)
            .unwrap();

        assert_eq!(scalar.components, listed);
    }

    #[test]
    fn test_in_folder_nesting() {
        let result = resolve_doc(
            r#"<Package>
    <types>
        <members>Public</members>
        <members>Public/MyDoc</members>
        <members>Other</members>
        <name>EmailTemplate</name>
    </types>
    <version>60.0</version>
</Package>"#,
        )
        .unwrap();

        assert_eq!(
            pairs(&result),
            vec![
                ("EmailFolder".to_string(), "Public".to_string()),
                ("EmailTemplate".to_string(), "Public/MyDoc".to_string()),
                ("EmailTemplate".to_string(), "Other".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_in_folder_rule_uses_registry_fact() {
        // builtin Territory2Model names itself as its folder type: not nested
        let result = resolve_doc(
            r#"<Package>
    <types><members>North</members><name>Territory2</name></types>
    <version>60.0</version>
</Package>"#,
        )
        .unwrap();
        assert_eq!(result.components[0].type_.name, "Territory2");

        // a folder type that does not name itself: always nested
        let registry = Registry::from_toml_str(
            r#"
            [[types]]
            name = "Region"
            directory_name = "regions"
            suffix = "region"
            folder_type = "RegionModel"

            [[types]]
            name = "RegionModel"
            directory_name = "regionModels"
            suffix = "regionModel"
            folder_content_type = "Region"
            "#,
        )
        .unwrap();
        let manifest = PackageManifest::from_components([("Region", "North")], "60.0");
        let components = ManifestResolver::new(&registry, Arc::new(MemoryTree::new()))
            .resolve_manifest(&manifest)
            .unwrap();
        assert_eq!(components[0].type_.name, "RegionModel");
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let result = resolve_doc(
            r#"<Package>
    <types><members>Foo</members><name>ApexClass</name></types>
    <types><members>x</members><name>Bogus</name></types>
    <version>60.0</version>
</Package>"#,
        );
        assert!(matches!(result, Err(Error::UnknownType(name)) if name == "Bogus"));
    }

    #[test]
    fn test_missing_version_is_invalid() {
        let result = resolve_doc("<Package><types><members>Foo</members><name>ApexClass</name></types></Package>");
        assert!(matches!(result, Err(Error::InvalidManifest { .. })));
    }

    #[test]
    fn test_manifest_xml_roundtrip() {
        let manifest = PackageManifest::from_components(
            [
                ("ApexClass", "Foo"),
                ("StaticResource", "app"),
                ("ApexClass", "Bar"),
                ("ApexClass", "Foo"),
            ],
            "60.0",
        );
        assert_eq!(manifest.types.len(), 2);
        assert_eq!(manifest.types[0].members, vec!["Foo", "Bar"]);

        let xml = manifest.to_xml().unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.contains("<members>Foo</members>"));
        assert!(text.contains(METADATA_NAMESPACE));

        let parsed = PackageManifest::parse(&xml, Path::new("package.xml")).unwrap();
        assert_eq!(parsed, manifest);
    }
}
