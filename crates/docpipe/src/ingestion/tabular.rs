//! CSV and Excel decoders

use calamine::Reader;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;

use super::{DecodeProgress, Decoder};
use crate::error::{Error, Result};
use crate::types::ContentType;

/// Rows between two progress reports while scanning a CSV file
const CSV_PROGRESS_INTERVAL: usize = 256;

/// Decodes CSV into headers plus header -> value row maps
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvDecoder;

impl Decoder for CsvDecoder {
    fn content_type(&self) -> ContentType {
        ContentType::Csv
    }

    fn decode(&self, data: &[u8], progress: &dyn DecodeProgress) -> Result<Value> {
        let fail = |message: String| {
            tracing::error!("Error parsing CSV: {}", message);
            Error::decode(ContentType::Csv, format!("Failed to parse CSV: {}", message))
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data);

        let raw_headers = reader.headers().map_err(|e| fail(e.to_string()))?.clone();
        if raw_headers.is_empty() {
            return Err(fail("No columns to parse from file".to_string()));
        }
        let headers = dedupe_headers(raw_headers.iter());

        let total_bytes = data.len().max(1) as f32;
        let mut rows = Vec::new();

        for result in reader.records() {
            let record = result.map_err(|e| fail(e.to_string()))?;

            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, field)| (header.clone(), infer_value(field)))
                .collect();
            rows.push(Value::Object(row));

            if rows.len() % CSV_PROGRESS_INTERVAL == 0 {
                progress.report(record.position().map_or(0, |p| p.byte()) as f32 / total_bytes);
            }
        }
        progress.report(1.0);

        Ok(json!({
            "total_rows": rows.len(),
            "columns": headers.len(),
            "headers": headers,
            "rows": rows,
        }))
    }
}

/// Decodes Excel workbooks, one header + rows table per sheet
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelDecoder;

impl Decoder for ExcelDecoder {
    fn content_type(&self) -> ContentType {
        ContentType::Excel
    }

    fn decode(&self, data: &[u8], progress: &dyn DecodeProgress) -> Result<Value> {
        let fail = |message: String| {
            tracing::error!("Error parsing Excel: {}", message);
            Error::decode(ContentType::Excel, format!("Failed to parse Excel: {}", message))
        };

        let cursor = std::io::Cursor::new(data);
        let mut workbook =
            calamine::open_workbook_auto_from_rs(cursor).map_err(|e| fail(e.to_string()))?;

        let sheet_names = workbook.sheet_names().to_vec();
        let sheet_count = sheet_names.len().max(1) as f32;

        let mut sheets = Map::new();
        let mut kept_names = Vec::new();
        let mut total_rows = 0usize;

        for (index, sheet_name) in sheet_names.into_iter().enumerate() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| fail(format!("sheet '{}': {}", sheet_name, e)))?;

            let mut sheet_rows = range.rows();
            let Some(header_cells) = sheet_rows.next() else {
                progress.report((index + 1) as f32 / sheet_count);
                continue;
            };

            let headers = dedupe_headers(
                header_cells
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| header_name(cell, i)),
            );

            let rows: Vec<Value> = sheet_rows
                .map(|cells| {
                    let row: Map<String, Value> = headers
                        .iter()
                        .zip(cells.iter())
                        .map(|(header, cell)| (header.clone(), cell_value(cell)))
                        .collect();
                    Value::Object(row)
                })
                .collect();

            total_rows += rows.len();
            sheets.insert(
                sheet_name.clone(),
                json!({
                    "headers": headers,
                    "total_rows": rows.len(),
                    "rows": rows,
                }),
            );
            kept_names.push(sheet_name);

            progress.report((index + 1) as f32 / sheet_count);
        }

        Ok(json!({
            "sheets": sheets,
            "sheet_names": kept_names,
            "total_rows": total_rows,
        }))
    }
}

/// Suffix repeated column names with `.1`, `.2`, ... so no row value is lost.
/// A suffix already taken by a literal column is skipped.
fn dedupe_headers<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let name = name.as_ref().to_string();
            let unique = match seen.get(&name).copied() {
                None => name,
                Some(mut count) => loop {
                    count += 1;
                    let candidate = format!("{}.{}", name, count);
                    if !seen.contains_key(&candidate) {
                        seen.insert(name, count);
                        break candidate;
                    }
                },
            };
            seen.entry(unique.clone()).or_insert(0);
            unique
        })
        .collect()
}

/// Integer, float, or string; empty fields become null
fn infer_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(field.to_string())
}

fn header_name(cell: &calamine::Data, index: usize) -> String {
    match cell {
        calamine::Data::Empty => format!("column_{}", index + 1),
        calamine::Data::String(s) => s.clone(),
        other => match cell_value(other) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}

fn cell_value(cell: &calamine::Data) -> Value {
    match cell {
        calamine::Data::Empty => Value::Null,
        calamine::Data::String(s) => Value::String(s.clone()),
        calamine::Data::Int(i) => Value::from(*i),
        calamine::Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::from(*f as i64)
            } else {
                Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        calamine::Data::Bool(b) => Value::Bool(*b),
        calamine::Data::DateTime(dt) => Value::String(dt.to_string()),
        calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => Value::String(s.clone()),
        calamine::Data::Error(e) => Value::String(e.to_string()),
    }
}
