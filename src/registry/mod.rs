//! metadata type registry
//!
//! the registry is static data describing every metadata type: where its files
//! live, which suffix they carry, whether members sit in folders, and which
//! adapter and transformer strategies apply. it is loaded once per run and
//! shared read-only; every lookup hands out `Arc<TypeDescriptor>` so resolved
//! components can outlive the registry borrow.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

const BUILTIN_REGISTRY: &str = include_str!("builtin.toml");

/// how a type's files are grouped into components in a tree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// descriptor only, no separate content
    #[default]
    Default,
    /// `name.suffix` content next to `name.suffix-meta.xml`
    MatchingContent,
    /// content is any `name.*` file or a `name/` directory
    MixedContent,
    /// a directory per component, descriptor inside it
    Bundle,
    /// parent descriptor plus one file per child in the source format
    Decomposed,
}

/// which transformer converts a type between formats
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerKind {
    #[default]
    Default,
    /// archive expansion and contraction driven by the declared content type
    StaticResource,
    /// recompose children into the parent document and back
    Decomposed,
}

/// per-type strategies selected by registry data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategies {
    pub adapter: AdapterKind,
    pub transformer: TransformerKind,
}

/// static description of one metadata type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub directory_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub in_folder: bool,
    /// type of the folders members of this type are nested in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_type: Option<String>,
    /// set on folder types: the type of the members they contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_content_type: Option<String>,
    #[serde(default)]
    pub strategies: Strategies,
    /// child types recomposed into this type's document
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// element name wrapping this type inside its parent's document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_element: Option<String>,
    /// only resolve inside a directory named `directory_name`
    #[serde(default)]
    pub strict_directory_name: bool,
}

impl TypeDescriptor {
    /// does this type name match, ignoring case
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// is this a folder type
    pub fn is_folder_type(&self) -> bool {
        self.folder_content_type.is_some()
    }

    /// is this a child of a decomposed type
    pub fn is_child_type(&self) -> bool {
        self.xml_element.is_some()
    }
}

#[derive(Deserialize)]
struct RegistryData {
    #[serde(default)]
    types: Vec<TypeDescriptor>,
}

/// lookup table over type descriptors
#[derive(Clone, Debug, Default)]
pub struct Registry {
    types: HashMap<String, Arc<TypeDescriptor>>,
    by_suffix: HashMap<String, String>,
    by_directory: HashMap<String, String>,
}

impl Registry {
    /// registry built from the embedded type data
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_REGISTRY)
    }

    /// load registry data from a toml file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Self::from_toml_str(&content)
    }

    /// parse registry data from toml
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let data: RegistryData =
            toml::from_str(content).map_err(|e| Error::Registry(e.to_string()))?;
        Self::from_types(data.types)
    }

    /// build a registry from descriptors, validating cross references
    pub fn from_types(types: Vec<TypeDescriptor>) -> Result<Self> {
        let mut registry = Registry::default();

        for ty in types {
            let key = ty.name.to_lowercase();
            if registry.types.contains_key(&key) {
                return Err(Error::Registry(format!("duplicate type {}", ty.name)));
            }
            if let Some(suffix) = &ty.suffix {
                if let Some(existing) = registry.by_suffix.insert(suffix.clone(), key.clone()) {
                    return Err(Error::Registry(format!(
                        "suffix {} claimed by both {} and {}",
                        suffix, existing, ty.name
                    )));
                }
            }
            registry.types.insert(key, Arc::new(ty));
        }

        for ty in registry.types.values() {
            for reference in ty
                .folder_type
                .iter()
                .chain(ty.folder_content_type.iter())
                .chain(ty.children.iter())
            {
                if !registry.types.contains_key(&reference.to_lowercase()) {
                    return Err(Error::Registry(format!(
                        "{} references unknown type {}",
                        ty.name, reference
                    )));
                }
            }
        }

        // a directory belongs to its content type; folder types only claim
        // directories no content type uses, child types never do
        let mut names: Vec<&String> = registry.types.keys().collect();
        names.sort();
        let mut by_directory: HashMap<String, String> = HashMap::new();
        for key in names {
            let ty = &registry.types[key];
            if ty.is_child_type() {
                continue;
            }
            match by_directory.get(&ty.directory_name) {
                Some(existing) => {
                    let existing_ty = &registry.types[existing];
                    match (existing_ty.is_folder_type(), ty.is_folder_type()) {
                        (true, false) => {
                            by_directory.insert(ty.directory_name.clone(), key.clone());
                        }
                        (false, false) => {
                            return Err(Error::Registry(format!(
                                "directory {} claimed by both {} and {}",
                                ty.directory_name, existing_ty.name, ty.name
                            )));
                        }
                        _ => {}
                    }
                }
                None => {
                    by_directory.insert(ty.directory_name.clone(), key.clone());
                }
            }
        }
        registry.by_directory = by_directory;

        Ok(registry)
    }

    /// look up a type by name, failing for unknown names
    pub fn get_type_by_name(&self, name: &str) -> Result<&Arc<TypeDescriptor>> {
        self.find_type(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// look up a type by name
    pub fn find_type(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(&name.to_lowercase())
    }

    /// look up a type by file suffix
    pub fn get_type_by_suffix(&self, suffix: &str) -> Option<&Arc<TypeDescriptor>> {
        self.by_suffix.get(suffix).and_then(|key| self.types.get(key))
    }

    /// content type owning a directory name
    pub fn type_by_directory_name(&self, directory: &str) -> Option<&Arc<TypeDescriptor>> {
        self.by_directory
            .get(directory)
            .and_then(|key| self.types.get(key))
    }

    /// match a file name (without `-meta.xml`) against registered suffixes
    ///
    /// when several suffixes match, the longest one wins. returns the type and
    /// the file name with the suffix removed.
    pub fn type_for_file_name<'n>(
        &self,
        file_name: &'n str,
    ) -> Option<(&Arc<TypeDescriptor>, &'n str)> {
        let (suffix, stem) = longest_suffix(file_name, self.by_suffix.keys().map(String::as_str))?;
        let ty = self.get_type_by_suffix(suffix)?;
        Some((ty, stem))
    }

    /// the folder type of a type, if any
    pub fn folder_type_of(&self, ty: &TypeDescriptor) -> Result<Option<&Arc<TypeDescriptor>>> {
        match &ty.folder_type {
            Some(name) => self.get_type_by_name(name).map(Some),
            None => Ok(None),
        }
    }

    /// child types of a decomposed type
    pub fn child_types(&self, ty: &TypeDescriptor) -> Result<Vec<&Arc<TypeDescriptor>>> {
        ty.children
            .iter()
            .map(|name| self.get_type_by_name(name))
            .collect()
    }

    /// all types sorted by name
    pub fn types(&self) -> Vec<&Arc<TypeDescriptor>> {
        let mut types: Vec<_> = self.types.values().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// pick the longest candidate suffix `s` such that `name` ends with `.s`
///
/// returns the suffix and the stem before the dot
pub(crate) fn longest_suffix<'a, 'n>(
    name: &'n str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<(&'a str, &'n str)> {
    candidates
        .into_iter()
        .filter_map(|suffix| {
            let stem = name.strip_suffix(suffix)?.strip_suffix('.')?;
            if stem.is_empty() {
                None
            } else {
                Some((suffix, stem))
            }
        })
        .max_by_key(|(suffix, _)| suffix.len())
}
