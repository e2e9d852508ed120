//! Decoding of uploaded spreadsheet files into raw cell grids.
//!
//! CSV is always available. Excel and OpenDocument workbooks need the `xlsx`
//! feature.

use crate::error::{Result, TrialBalanceError};
use crate::header::frame_from_rows;
use crate::schema::{CellValue, SheetFrame};
use log::{debug, info};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Every sheet of a decoded file, in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWorkbook {
    pub sheets: Vec<(String, Vec<Vec<CellValue>>)>,
}

impl RawWorkbook {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn has_data(rows: &[Vec<CellValue>]) -> bool {
        rows.iter().any(|r| r.iter().any(|c| !c.is_blank()))
    }

    /// The named sheet, or the first sheet holding any data.
    pub fn select_sheet(&self, name: Option<&str>) -> Result<(&str, &[Vec<CellValue>])> {
        let found = match name {
            Some(name) => self
                .sheets
                .iter()
                .find(|(sheet, _)| sheet == name)
                .ok_or_else(|| TrialBalanceError::SheetNotFound(name.to_string()))?,
            None => self
                .sheets
                .iter()
                .find(|(_, rows)| Self::has_data(rows))
                .ok_or(TrialBalanceError::EmptyWorkbook)?,
        };
        Ok((found.0.as_str(), found.1.as_slice()))
    }

    pub fn build_frame(&self, name: Option<&str>) -> Result<SheetFrame> {
        let (active, rows) = self.select_sheet(name)?;
        debug!("Building frame for sheet '{}' ({} raw rows)", active, rows.len());
        Ok(frame_from_rows(self.sheet_names(), active, rows))
    }
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Decodes a file by its extension.
pub fn decode_bytes(file_name: &str, bytes: &[u8]) -> Result<RawWorkbook> {
    let ext = extension(file_name);
    let workbook = match ext.as_str() {
        "csv" | "txt" => decode_csv(file_name, bytes)?,
        e if WORKBOOK_EXTENSIONS.contains(&e) => decode_workbook(bytes)?,
        _ => return Err(TrialBalanceError::UnsupportedFormat(file_name.to_string())),
    };
    info!(
        "Decoded '{}' into {} sheet(s)",
        file_name,
        workbook.sheets.len()
    );
    Ok(workbook)
}

/// A CSV file decodes to a single sheet named after the file stem.
pub fn decode_csv(file_name: &str, bytes: &[u8]) -> Result<RawWorkbook> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(CellValue::from).collect());
    }

    let name = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Sheet1")
        .to_string();
    Ok(RawWorkbook {
        sheets: vec![(name, rows)],
    })
}

#[cfg(feature = "xlsx")]
fn convert_cell(cell: &calamine::Data) -> CellValue {
    use calamine::Data;
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Error(_) => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(feature = "xlsx")]
fn decode_workbook(bytes: &[u8]) -> Result<RawWorkbook> {
    use calamine::Reader;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| TrialBalanceError::Workbook(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| TrialBalanceError::Workbook(format!("{}: {}", name, e)))?;
        let rows: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();
        sheets.push((name, rows));
    }
    Ok(RawWorkbook { sheets })
}

#[cfg(not(feature = "xlsx"))]
fn decode_workbook(_bytes: &[u8]) -> Result<RawWorkbook> {
    Err(TrialBalanceError::UnsupportedFormat(
        "workbook support requires the `xlsx` feature".to_string(),
    ))
}

/// Orders decode completions. Each decode takes a ticket from [`begin`]; a
/// result is accepted only if no newer decode has started since.
///
/// [`begin`]: DecodeGate::begin
#[derive(Debug, Default)]
pub struct DecodeGate {
    latest: AtomicU64,
}

impl DecodeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn accept<T>(&self, request_id: u64, value: T) -> Result<T> {
        let latest = self.latest();
        if request_id == latest {
            Ok(value)
        } else {
            debug!("Discarding decode {} (latest is {})", request_id, latest);
            Err(TrialBalanceError::StaleDecode { request_id, latest })
        }
    }
}
