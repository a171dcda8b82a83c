//! Decoder capability and multi-format dispatch

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CsvDecoder, ExcelDecoder, PdfDecoder};
use crate::error::{Error, Result};
use crate::types::{ContentType, DecodedContent};

/// Receives incremental progress from a decoder as a fraction in `0.0..=1.0`
pub trait DecodeProgress: Send + Sync {
    fn report(&self, fraction: f32);
}

/// Progress sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DecodeProgress for NoProgress {
    fn report(&self, _fraction: f32) {}
}

/// One decoder per supported format.
///
/// Decoding is a pure function of the input bytes: it either returns the
/// structured payload or fails with `Error::Decode`, never panics on
/// malformed input.
pub trait Decoder: Send + Sync {
    /// Content type of the payload this decoder produces
    fn content_type(&self) -> ContentType;

    /// Decode raw bytes into a JSON payload
    fn decode(&self, data: &[u8], progress: &dyn DecodeProgress) -> Result<Value>;
}

/// Multi-format file parser
#[derive(Clone)]
pub struct FileParser {
    decoders: HashMap<ContentType, Arc<dyn Decoder>>,
}

impl Default for FileParser {
    fn default() -> Self {
        Self::empty()
            .with_decoder(Arc::new(CsvDecoder))
            .with_decoder(Arc::new(ExcelDecoder))
            .with_decoder(Arc::new(PdfDecoder::default()))
    }
}

impl FileParser {
    /// Parser with no decoders registered
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder, replacing any existing one for the same content type
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.insert(decoder.content_type(), decoder);
        self
    }

    /// Pick a content type by filename extension first, then by declared type.
    pub fn detect(filename: &str, declared_type: &str) -> ContentType {
        let filename = filename.to_lowercase();

        if filename.ends_with(".csv") {
            return ContentType::Csv;
        }
        if filename.ends_with(".xlsx") || filename.ends_with(".xls") {
            return ContentType::Excel;
        }
        if filename.ends_with(".pdf") {
            return ContentType::Pdf;
        }

        let declared_type = declared_type.to_lowercase();
        if declared_type.contains("csv") {
            ContentType::Csv
        } else if declared_type.contains("excel") || declared_type.contains("spreadsheet") {
            ContentType::Excel
        } else if declared_type.contains("pdf") {
            ContentType::Pdf
        } else {
            ContentType::Unknown
        }
    }

    /// Decode a file with the decoder matching its name or declared type
    pub fn decode(
        &self,
        data: &[u8],
        declared_type: &str,
        filename: &str,
        progress: &dyn DecodeProgress,
    ) -> Result<DecodedContent> {
        let content_type = Self::detect(filename, declared_type);

        let decoder = self.decoders.get(&content_type).ok_or_else(|| {
            Error::UnsupportedFileType(format!(
                "Unsupported file type: {}. Supported types: CSV, Excel (.xlsx, .xls), PDF",
                declared_type
            ))
        })?;

        tracing::debug!("Decoding '{}' as {}", filename, content_type);

        let content = decoder.decode(data, progress)?;
        Ok(DecodedContent {
            content,
            content_type,
        })
    }
}
