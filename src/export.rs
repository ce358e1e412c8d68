use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::report::{class_label, dash_if_empty, render_html, MonthlyReport, ReportLine};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no data to export")]
    NoData,
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("pdf error: {0}")]
    Pdf(#[from] printpdf::Error),
    #[error("could not write file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Xlsx,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Html => "html",
        }
    }
}

pub const SHEET_NAME: &str = "Laporan";

pub const SHEET_COLUMNS: [&str; 11] = [
    "ID",
    "NIS",
    "Tipe Pelanggaran",
    "Catatan Tambahan",
    "Poin",
    "Tanggal",
    "Dokumentasi Pendukung",
    "Keterangan",
    "Nama Siswa",
    "Kelas",
    "Tingkat",
];

pub fn export(report: &MonthlyReport, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
    if report.is_empty() {
        return Err(ExportError::NoData);
    }
    match format {
        ExportFormat::Pdf => write_pdf(report, path)?,
        ExportFormat::Xlsx => write_xlsx(report, path)?,
        ExportFormat::Html => std::fs::write(path, render_html(report))?,
    }
    tracing::info!(path = %path.display(), rows = report.lines.len(), "report exported");
    Ok(())
}

fn write_xlsx(report: &MonthlyReport, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in SHEET_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (index, line) in report.lines.iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_number(row, 0, line.id as f64)?;
        sheet.write_string(row, 1, &line.nis)?;
        sheet.write_string(row, 2, &line.category)?;
        sheet.write_string(row, 3, dash_if_empty(&line.description))?;
        sheet.write_number(row, 4, f64::from(line.points))?;
        sheet.write_string(row, 5, line.occurred_on.format("%Y-%m-%d").to_string())?;
        sheet.write_string(row, 6, line.attachment.as_deref().unwrap_or("-"))?;
        sheet.write_string(row, 7, line.note.as_deref().unwrap_or("-"))?;
        sheet.write_string(row, 8, line.student_name.as_deref().unwrap_or("N/A"))?;
        sheet.write_string(row, 9, line.section.as_deref().unwrap_or("N/A"))?;
        match line.grade {
            Some(grade) => sheet.write_number(row, 10, f64::from(grade))?,
            None => sheet.write_string(row, 10, "N/A")?,
        };
    }
    sheet.autofit();

    workbook.save(path)?;
    Ok(())
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 12.0;
const LINE_HEIGHT: f32 = 5.5;

/// Column x offsets and character budgets for the PDF table.
const PDF_COLUMNS: [(&str, f32, usize); 8] = [
    ("Tanggal", 0.0, 10),
    ("NIS", 18.0, 9),
    ("Nama Siswa", 34.0, 18),
    ("Kelas", 68.0, 5),
    ("Tipe", 78.0, 13),
    ("Catatan", 104.0, 18),
    ("Keterangan", 138.0, 18),
    ("Poin", 176.0, 4),
];

struct PdfCursor {
    layer: PdfLayerReference,
    y: f32,
}

fn write_pdf(report: &MonthlyReport, path: &Path) -> Result<(), ExportError> {
    let title = format!("Laporan Pelanggaran {}", report.period());
    let (doc, page, layer) = PdfDocument::new(title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut cursor = PdfCursor {
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT - MARGIN,
    };

    cursor.layer.use_text(&title, 14.0, Mm(MARGIN), Mm(cursor.y), &bold);
    cursor.y -= LINE_HEIGHT * 2.0;

    for summary in &report.summary {
        cursor.layer.use_text(
            format!("{}: {}", summary.category, summary.count),
            9.0,
            Mm(MARGIN),
            Mm(cursor.y),
            &regular,
        );
        cursor.y -= LINE_HEIGHT;
    }
    cursor.y -= LINE_HEIGHT;
    table_header(&cursor, &bold);
    cursor.y -= LINE_HEIGHT;

    for line in &report.lines {
        if cursor.y < MARGIN {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            cursor.layer = doc.get_page(page).get_layer(layer);
            cursor.y = PAGE_HEIGHT - MARGIN;
            table_header(&cursor, &bold);
            cursor.y -= LINE_HEIGHT;
        }
        table_row(&cursor, &regular, line);
        cursor.y -= LINE_HEIGHT;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    doc.save(&mut writer)?;
    Ok(())
}

fn table_header(cursor: &PdfCursor, font: &IndirectFontRef) {
    for (label, offset, _) in PDF_COLUMNS {
        cursor
            .layer
            .use_text(label, 8.0, Mm(MARGIN + offset), Mm(cursor.y), font);
    }
}

fn table_row(cursor: &PdfCursor, font: &IndirectFontRef, line: &ReportLine) {
    let cells = [
        line.occurred_on.format("%d-%m-%Y").to_string(),
        line.nis.clone(),
        line.student_name.clone().unwrap_or_else(|| "N/A".to_string()),
        class_label(line),
        line.category.clone(),
        dash_if_empty(&line.description).to_string(),
        line.note.clone().unwrap_or_else(|| "-".to_string()),
        line.points.to_string(),
    ];
    for ((_, offset, width), text) in PDF_COLUMNS.iter().zip(cells) {
        cursor.layer.use_text(
            truncate(&text, *width),
            8.0,
            Mm(MARGIN + offset),
            Mm(cursor.y),
            font,
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('~');
    cut
}
