//! PDF decoder with a primary and a fallback text extractor

use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{DecodeProgress, Decoder};
use crate::error::{Error, Result};
use crate::types::ContentType;

/// Extracts raw text for every page of a PDF, in page order.
/// Pages without text may be returned as empty strings.
pub trait PageTextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>>;
}

/// Per-page extraction with `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractExtractor;

impl PageTextExtractor for PdfExtractExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        // pdf-extract panics on some malformed fonts
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(data)
        }));

        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(pdf_error(e.to_string())),
            Err(_) => Err(pdf_error("pdf-extract panicked")),
        }
    }
}

/// Per-page extraction with `lopdf`
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PageTextExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| pdf_error(format!("Failed to load PDF: {}", e)))?;

        let pages = doc
            .get_pages()
            .keys()
            .map(|&page_num| match doc.extract_text(&[page_num]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("Could not extract text for page {}: {}", page_num, e);
                    String::new()
                }
            })
            .collect();

        Ok(pages)
    }
}

/// Decodes PDF into `{page, content}` entries for every page with text
pub struct PdfDecoder {
    primary: Arc<dyn PageTextExtractor>,
    fallback: Arc<dyn PageTextExtractor>,
}

impl Default for PdfDecoder {
    fn default() -> Self {
        Self::new(Arc::new(PdfExtractExtractor), Arc::new(LopdfExtractor))
    }
}

impl PdfDecoder {
    pub fn new(primary: Arc<dyn PageTextExtractor>, fallback: Arc<dyn PageTextExtractor>) -> Self {
        Self { primary, fallback }
    }

    fn pages_with_text(raw: Vec<String>) -> Vec<(usize, String)> {
        raw.into_iter()
            .enumerate()
            .filter_map(|(i, text)| {
                let text = text.replace('\0', "").trim().to_string();
                (!text.is_empty()).then_some((i + 1, text))
            })
            .collect()
    }
}

impl Decoder for PdfDecoder {
    fn content_type(&self) -> ContentType {
        ContentType::Pdf
    }

    fn decode(&self, data: &[u8], progress: &dyn DecodeProgress) -> Result<Value> {
        let pages = match self.primary.extract_pages(data) {
            Ok(raw) => {
                let pages = Self::pages_with_text(raw);
                if pages.is_empty() {
                    tracing::warn!(
                        "{} found no text, trying {}",
                        self.primary.name(),
                        self.fallback.name()
                    );
                    progress.report(0.5);
                    self.extract_with_fallback(data)?
                } else {
                    pages
                }
            }
            Err(e) => {
                tracing::warn!("{} failed: {}, trying {}", self.primary.name(), e, self.fallback.name());
                progress.report(0.5);
                self.extract_with_fallback(data)?
            }
        };
        progress.report(1.0);

        let full_text = pages
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let page_values: Vec<Value> = pages
            .into_iter()
            .map(|(page, content)| json!({"page": page, "content": content}))
            .collect();

        Ok(json!({
            "total_pages": page_values.len(),
            "pages": page_values,
            "full_text": full_text,
        }))
    }
}

impl PdfDecoder {
    fn extract_with_fallback(&self, data: &[u8]) -> Result<Vec<(usize, String)>> {
        let raw = self.fallback.extract_pages(data).map_err(|e| {
            tracing::error!("Error parsing PDF: {}", e);
            e
        })?;
        Ok(Self::pages_with_text(raw))
    }
}

fn pdf_error(message: impl std::fmt::Display) -> Error {
    Error::decode(ContentType::Pdf, format!("Failed to parse PDF: {}", message))
}
