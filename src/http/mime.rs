//! MIME type lookup by file extension

use std::collections::HashMap;
use std::path::Path;

/// Type served when the extension is missing or unknown
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension to MIME type table
///
/// Extensions are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct MimeTable {
    types: HashMap<String, String>,
}

impl MimeTable {
    /// An empty table: everything is served as the default type
    pub fn empty() -> Self {
        MimeTable {
            types: HashMap::new(),
        }
    }

    /// Register `mime` for files ending in `.ext`
    pub fn insert(&mut self, ext: &str, mime: impl Into<String>) {
        self.types.insert(ext.to_ascii_lowercase(), mime.into());
    }

    /// MIME type for a path, by what follows the last `.` of its final
    /// component
    ///
    /// A dotfile such as `.html` counts as having that extension.
    pub fn lookup(&self, path: &Path) -> &str {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.rsplit_once('.'))
            .and_then(|(_, ext)| self.types.get(&ext.to_ascii_lowercase()))
            .map_or(DEFAULT_MIME_TYPE, |mime| mime.as_str())
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        let mut table = MimeTable::empty();
        table.insert("html", "text/html");
        table.insert("css", "text/css");
        table.insert("png", "image/png");
        table.insert("jpg", "image/jpg");
        table.insert("gif", "image/gif");
        table
    }
}
