//! Text extraction from source files.
//!
//! Supported kinds are PDF, plain text, Markdown and HTML. The extension is
//! resolved to a `FileKind` at exactly one point; everything downstream
//! matches on the enum. Unknown extensions fail with `UnsupportedType`.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::tools::search::strip_html_tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
    Markdown,
    Html,
}

impl FileKind {
    /// The single extension-to-kind dispatch point.
    pub fn from_path(path: &Path) -> Result<Self, ApiError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "txt" => Ok(FileKind::Text),
            "md" | "markdown" => Ok(FileKind::Markdown),
            "html" | "htm" => Ok(FileKind::Html),
            other => Err(ApiError::UnsupportedType(if other.is_empty() {
                path.display().to_string()
            } else {
                other.to_string()
            })),
        }
    }
}

/// Result of extracting one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub tables: Vec<Value>,
    pub metadata: Value,
}

pub struct TextExtractor {
    title_re: Regex,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self {
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"),
        }
    }

    pub async fn extract(&self, path: &Path) -> Result<ExtractionResult, ApiError> {
        if !path.exists() {
            return Err(ApiError::NotFound(format!("file not found: {}", path.display())));
        }

        let kind = FileKind::from_path(path)?;
        tracing::info!("extracting {:?} file: {}", kind, path.display());

        match kind {
            FileKind::Pdf => self.extract_pdf(path).await,
            FileKind::Text | FileKind::Markdown => self.extract_plain(path).await,
            FileKind::Html => self.extract_html(path).await,
        }
    }

    async fn extract_pdf(&self, path: &Path) -> Result<ExtractionResult, ApiError> {
        let path = path.to_path_buf();
        // pdf parsing is CPU-bound; keep it off the async workers.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .map_err(ApiError::internal)?
            .map_err(|e| ApiError::Extraction(format!("pdf extraction failed: {}", e)))?;

        Ok(ExtractionResult {
            text: text.trim().to_string(),
            tables: Vec::new(),
            metadata: json!({}),
        })
    }

    async fn extract_plain(&self, path: &Path) -> Result<ExtractionResult, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Extraction(format!("read failed: {}", e)))?;
        let text = String::from_utf8_lossy(&bytes);

        Ok(ExtractionResult {
            text: text.trim().to_string(),
            tables: Vec::new(),
            metadata: json!({}),
        })
    }

    async fn extract_html(&self, path: &Path) -> Result<ExtractionResult, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Extraction(format!("read failed: {}", e)))?;
        let html = String::from_utf8_lossy(&bytes);

        let title = self
            .title_re
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        Ok(ExtractionResult {
            text: strip_html_tags(&html),
            tables: Vec::new(),
            metadata: json!({ "title": title }),
        })
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kind_dispatch() {
        assert_eq!(FileKind::from_path(Path::new("a.pdf")).unwrap(), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("a.txt")).unwrap(), FileKind::Text);
        assert_eq!(
            FileKind::from_path(Path::new("a.markdown")).unwrap(),
            FileKind::Markdown
        );
        assert_eq!(FileKind::from_path(Path::new("a.HTM")).unwrap(), FileKind::Html);

        let err = FileKind::from_path(Path::new("a.docx")).unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn extracts_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  line one\nline two  ").unwrap();

        let extractor = TextExtractor::new();
        let result = extractor.extract(&path).await.unwrap();
        assert_eq!(result.text, "line one\nline two");
    }

    #[tokio::test]
    async fn extracts_html_with_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(
            &path,
            "<html><head><title>My Page</title></head><body><p>Body text</p></body></html>",
        )
        .unwrap();

        let extractor = TextExtractor::new();
        let result = extractor.extract(&path).await.unwrap();
        assert!(result.text.contains("Body text"));
        assert_eq!(result.metadata["title"], "My Page");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let extractor = TextExtractor::new();
        let err = extractor
            .extract(Path::new("/nonexistent/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
