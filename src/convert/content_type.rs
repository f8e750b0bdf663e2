//! content types declared by resource descriptors

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Deserialize;

use crate::component::SourceComponent;
use crate::error::{Error, Result};

/// content types whose content may be an expanded directory
pub const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/jar",
];

/// extension used when no table knows a content type
pub const GENERIC_EXTENSION: &str = "bin";

/// common registered mime types
const REGISTERED: &[(&str, &str)] = &[
    ("application/json", "json"),
    ("application/octet-stream", "bin"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/jar", "jar"),
    ("application/java-archive", "jar"),
    ("application/javascript", "js"),
    ("application/xml", "xml"),
    ("application/msword", "doc"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/x-shockwave-flash", "swf"),
    ("audio/mpeg", "mp3"),
    ("font/woff", "woff"),
    ("font/woff2", "woff2"),
    ("image/bmp", "bmp"),
    ("image/gif", "gif"),
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/svg+xml", "svg"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/webp", "webp"),
    ("text/css", "css"),
    ("text/csv", "csv"),
    ("text/html", "html"),
    ("text/markdown", "md"),
    ("text/plain", "txt"),
    ("video/mp4", "mp4"),
];

/// legacy types missing from the registered table
const FALLBACK: &[(&str, &str)] = &[
    ("text/javascript", "js"),
    ("application/x-javascript", "js"),
    ("application/x-zip-compressed", "zip"),
    ("text/x-haml", "haml"),
    ("image/x-png", "png"),
    ("text/xml", "xml"),
];

static REGISTERED_EXTENSIONS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| REGISTERED.iter().copied().collect());

static FALLBACK_EXTENSIONS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| FALLBACK.iter().copied().collect());

/// lowercase essence of a content type, parameters dropped
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// is content_type one of the archive mime types
pub fn is_archive_type(content_type: &str) -> bool {
    ARCHIVE_MIME_TYPES.contains(&essence(content_type).as_str())
}

/// file extension for a content type, falling back to `bin`
pub fn extension_for(content_type: &str) -> &'static str {
    let key = essence(content_type);
    REGISTERED_EXTENSIONS
        .get(key.as_str())
        .or_else(|| FALLBACK_EXTENSIONS.get(key.as_str()))
        .copied()
        .unwrap_or(GENERIC_EXTENSION)
}

#[derive(Deserialize)]
struct ResourceDescriptor {
    #[serde(rename = "contentType")]
    content_type: Option<String>,
}

/// content type declared in the component's descriptor
pub fn declared_content_type(component: &SourceComponent) -> Result<String> {
    let descriptor: ResourceDescriptor = component.parse_descriptor()?;
    descriptor
        .content_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MissingContentType {
            component: component.to_string(),
            descriptor: component.xml().to_path_buf(),
        })
}

/// does the descriptor declare an archive type
pub fn is_archive(component: &SourceComponent) -> Result<bool> {
    Ok(is_archive_type(&declared_content_type(component)?))
}

/// expanded directory content is only valid for archive content types
pub fn check_expanded_archive(component: &SourceComponent) -> Result<()> {
    if !component.content_is_directory() {
        return Ok(());
    }
    let content_type = declared_content_type(component)?;
    if is_archive_type(&content_type) {
        Ok(())
    } else {
        Err(Error::ExpectedArchive {
            component: component.to_string(),
            content_type,
        })
    }
}
