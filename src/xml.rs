//! xml document helpers shared by manifests, descriptors and transformers

use std::path::Path;

use quick_xml::events::{BytesDecl, Event};
use quick_xml::Writer;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// namespace carried by every metadata document
pub const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

/// deserialize an xml document, path names it in errors
pub fn from_xml<T: DeserializeOwned>(data: &[u8], path: &Path) -> Result<T> {
    let text = std::str::from_utf8(data).map_err(|e| Error::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    quick_xml::de::from_str(text).map_err(|e| Error::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// writer producing indented documents that start with an xml declaration
pub fn document_writer() -> Result<Writer<Vec<u8>>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| xml_write_error(&e))?;
    Ok(writer)
}

/// finish a document writer, appending the trailing newline
pub fn finish_document(writer: Writer<Vec<u8>>) -> Vec<u8> {
    let mut data = writer.into_inner();
    data.push(b'\n');
    data
}

pub(crate) fn xml_write_error(e: &dyn std::fmt::Display) -> Error {
    Error::Xml {
        path: "<generated>".into(),
        message: e.to_string(),
    }
}
