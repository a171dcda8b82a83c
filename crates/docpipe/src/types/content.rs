//! Parsed content types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of structured payload produced by a decoder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Comma-separated values
    Csv,
    /// Excel workbook (.xlsx, .xls)
    Excel,
    /// PDF document
    Pdf,
    /// No decoder matched
    Unknown,
}

impl ContentType {
    /// Tag stored alongside parsed content
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored tag; unrecognized tags map to `Unknown`
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "csv" => Self::Csv,
            "excel" => Self::Excel,
            "pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful decoder output
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedContent {
    /// Format-specific JSON payload
    pub content: Value,
    /// Which decoder produced it
    pub content_type: ContentType,
}

impl DecodedContent {
    /// Count rows (tabular) or pages with text (PDF) in the payload.
    ///
    /// Payloads with none of the known shapes count as 0.
    pub fn row_count(&self) -> u64 {
        count_rows(&self.content)
    }
}

/// Row/page count for a decoded payload
pub fn count_rows(content: &Value) -> u64 {
    if let Some(rows) = content.get("rows") {
        return rows.as_array().map(|r| r.len() as u64).unwrap_or(0);
    }
    if content.get("sheets").is_some() {
        return content.get("total_rows").and_then(Value::as_u64).unwrap_or(0);
    }
    if content.get("pages").is_some() {
        return content.get("total_pages").and_then(Value::as_u64).unwrap_or(0);
    }
    0
}
