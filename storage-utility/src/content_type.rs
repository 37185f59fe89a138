//! Fixed MIME type <-> file extension table
//!
//! The pairs are kept in order; when two types share an extension the first
//! listed type wins the extension -> type lookup.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::Path;

/// Ordered (content type, extension) pairs
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    ("audio/amr", ".amr"),
    ("audio/acc", ".mp4"),
    ("audio/mp4", ".mp4"),
    ("audio/mpeg", ".mp3"),
    ("audio/ogg", ".ogg"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("text/plain", ".txt"),
    ("text/rtf", ".rtf"),
    ("application/zip", ".zip"),
    ("application/pdf", ".pdf"),
    ("application/msword", ".doc"),
];

lazy_static! {
    static ref TYPE_TO_EXT: HashMap<&'static str, &'static str> =
        CONTENT_TYPES.iter().copied().collect();
    static ref EXT_TO_TYPE: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        for (content_type, ext) in CONTENT_TYPES {
            map.entry(*ext).or_insert(*content_type);
        }
        map
    };
}

/// Content type for an extension given with its leading dot (".png").
/// Matching is exact and case sensitive.
pub fn content_type(ext: &str) -> Option<&'static str> {
    EXT_TO_TYPE.get(ext).copied()
}

/// Extension (with leading dot) for a content type, or "" when unknown
pub fn content_ext(content_type: &str) -> &'static str {
    TYPE_TO_EXT.get(content_type).copied().unwrap_or("")
}

/// Content type inferred from the extension of an object name or file path
pub fn content_type_for_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?;
    content_type(&format!(".{}", ext))
}
