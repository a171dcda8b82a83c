//! Format-specific decoders and dispatch

mod parser;
mod pdf;
mod tabular;

pub use parser::{DecodeProgress, Decoder, FileParser, NoProgress};
pub use pdf::{LopdfExtractor, PageTextExtractor, PdfDecoder, PdfExtractExtractor};
pub use tabular::{CsvDecoder, ExcelDecoder};
