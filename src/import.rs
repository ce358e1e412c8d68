use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::NewViolation;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("could not read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheet,
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("row {row}: {message}")]
    Row { row: usize, message: String },
    #[error("file contains no data rows")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Nis,
    Category,
    Description,
    Points,
    Date,
    Attachment,
    Note,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        let column = match header.trim().to_lowercase().as_str() {
            "nis" => Column::Nis,
            "tipe pelanggaran" | "tipe_pelanggaran" | "category" => Column::Category,
            "catatan" | "catatan tambahan" | "description" => Column::Description,
            "poin" | "points" => Column::Points,
            "tanggal" | "date" => Column::Date,
            "dokumentasi pendukung" | "attachment" => Column::Attachment,
            "keterangan" | "note" => Column::Note,
            _ => return None,
        };
        Some(column)
    }

    fn label(self) -> &'static str {
        match self {
            Column::Nis => "NIS",
            Column::Category => "Tipe Pelanggaran",
            Column::Description => "Catatan",
            Column::Points => "Poin",
            Column::Date => "Tanggal",
            Column::Attachment => "Dokumentasi Pendukung",
            Column::Note => "Keterangan",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => Some(text.clone()),
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        }
    }
}

/// Reads every data row of `path` into new violation records.
///
/// The whole file is parsed before anything is returned: a single bad row
/// rejects the import. Row numbers in errors count the header as row 1.
pub fn read_violations(path: &Path) -> Result<Vec<NewViolation>, ImportError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let (headers, rows) = match extension.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => read_workbook(path)?,
        other => return Err(ImportError::UnsupportedFormat(other.to_string())),
    };

    let violations = parse_rows(&headers, rows)?;
    tracing::debug!(path = %path.display(), rows = violations.len(), "parsed import file");
    Ok(violations)
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<Cell>>), ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    Ok((headers, rows))
}

fn read_workbook(path: &Path) -> Result<(Vec<String>, Vec<Vec<Cell>>), ImportError> {
    let mut workbook = open_workbook_auto(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::NoSheet)?;
    let range = workbook.worksheet_range(&first)?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| Cell::from(cell).as_text().unwrap_or_default())
            .collect(),
        None => return Err(ImportError::Empty),
    };
    let rows = rows
        .map(|row| row.iter().map(Cell::from).collect())
        .collect();
    Ok((headers, rows))
}

fn parse_rows(headers: &[String], rows: Vec<Vec<Cell>>) -> Result<Vec<NewViolation>, ImportError> {
    let mut columns: HashMap<Column, usize> = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        if let Some(column) = Column::from_header(header) {
            columns.entry(column).or_insert(index);
        }
    }
    for required in [Column::Nis, Column::Category, Column::Date] {
        if !columns.contains_key(&required) {
            return Err(ImportError::MissingColumn(required.label()));
        }
    }

    let mut parsed = Vec::new();
    for (offset, row) in rows.iter().enumerate() {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let row_number = offset + 2;
        let cell = |column: Column| cell_at(row, &columns, column);
        let fail = |message: String| ImportError::Row {
            row: row_number,
            message,
        };

        let nis = cell(Column::Nis)
            .as_text()
            .ok_or_else(|| fail("NIS is empty".to_string()))?;
        let category = cell(Column::Category)
            .as_text()
            .ok_or_else(|| fail("Tipe Pelanggaran is empty".to_string()))?;
        let occurred_on = parse_date(cell(Column::Date))
            .ok_or_else(|| fail(format!("unreadable date {:?}", cell(Column::Date))))?;
        let points = parse_points(cell(Column::Points)).map_err(fail)?;

        parsed.push(NewViolation {
            nis,
            category,
            description: cell(Column::Description).as_text().unwrap_or_default(),
            points,
            occurred_on,
            note: cell(Column::Note).as_text(),
            attachment: cell(Column::Attachment).as_text(),
        });
    }

    if parsed.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(parsed)
}

static EMPTY: Cell = Cell::Empty;

fn cell_at<'a>(row: &'a [Cell], columns: &HashMap<Column, usize>, column: Column) -> &'a Cell {
    columns
        .get(&column)
        .and_then(|&index| row.get(index))
        .unwrap_or(&EMPTY)
}

fn parse_points(cell: &Cell) -> Result<Option<u32>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX) => {
            Ok(Some(*n as u32))
        }
        Cell::Number(n) => Err(format!("invalid points {n}")),
        Cell::Text(text) => text
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("invalid points {text:?}")),
    }
}

fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Empty => None,
        Cell::Number(serial) => from_serial(*serial),
        Cell::Text(text) => {
            if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                return Some(date);
            }
            if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
                return Some(datetime.date());
            }
            if let Ok(date) = NaiveDate::parse_from_str(text, "%d/%m/%Y") {
                return Some(date);
            }
            text.parse::<f64>().ok().and_then(from_serial)
        }
    }
}

/// Spreadsheet day numbers count from 1899-12-30.
fn from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}
