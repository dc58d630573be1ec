use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::DocumentLoader;
use crate::types::Document;

/// Extensions [`PlainTextLoader`] accepts.
pub const TEXT_EXTENSIONS: [&str; 3] = ["txt", "text", "md"];

/// Loads UTF-8 text files. A form feed (`\x0C`) starts a new page, which is
/// how `pdftotext` and similar converters mark page breaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextLoader;

impl PlainTextLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| TEXT_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn read_file_content(path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| Error::Ingestion(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }
}

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        if !Self::supports(path) {
            return Err(Error::Ingestion(format!("unsupported file type: {}", path.display())));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Ingestion(format!("not a file path: {}", path.display())))?;
        let content = Self::read_file_content(path)?;
        let mut pages: Vec<&str> = content.split('\u{c}').collect();
        // converters end every page, the last one included, with a form feed
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        debug!(file = %path.display(), pages = pages.len(), "loaded text document");
        Document::from_pages(filename, &pages)
    }
}
