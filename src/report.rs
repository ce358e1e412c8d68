use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::models::{Student, ViolationRecord};
use crate::scoring::{self, resolve_points};
use crate::status::Status;

pub const MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Accepts an Indonesian month name (any case) or a number 1-12.
pub fn parse_month(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if let Ok(number) = trimmed.parse::<u32>() {
        return (1..=12).contains(&number).then_some(number);
    }
    MONTHS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(trimmed))
        .map(|index| index as u32 + 1)
}

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| MONTHS.get(index as usize))
        .copied()
        .unwrap_or("?")
}

/// First day of the month and first day of the following month.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub id: i64,
    pub nis: String,
    pub category: String,
    pub description: String,
    pub points: u32,
    pub occurred_on: NaiveDate,
    pub attachment: Option<String>,
    pub note: Option<String>,
    pub student_name: Option<String>,
    pub section: Option<String>,
    pub grade: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentTotal {
    pub nis: String,
    pub name: String,
    pub total_points: u32,
    pub status: String,
    #[serde(skip)]
    pub level: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub lines: Vec<ReportLine>,
    pub summary: Vec<CategorySummary>,
    pub students: Vec<StudentTotal>,
}

pub fn summarize_by_category(records: &[ViolationRecord]) -> Vec<CategorySummary> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.category.as_str()).or_insert(0) += 1;
    }

    let mut summaries: Vec<CategorySummary> = counts
        .into_iter()
        .map(|(category, count)| CategorySummary {
            category: category.to_string(),
            count,
        })
        .collect();
    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    summaries
}

impl MonthlyReport {
    pub fn build(
        year: i32,
        month: u32,
        records: &[ViolationRecord],
        students: &HashMap<String, Student>,
        catalog: &Catalog,
    ) -> Self {
        let mut lines: Vec<ReportLine> = records
            .iter()
            .map(|record| {
                let student = students.get(&record.nis);
                ReportLine {
                    id: record.id,
                    nis: record.nis.clone(),
                    category: record.category.clone(),
                    description: record.description.clone(),
                    points: resolve_points(record, catalog),
                    occurred_on: record.occurred_on,
                    attachment: record.attachment.clone(),
                    note: record.note.clone(),
                    student_name: student.map(|s| s.name.clone()),
                    section: student.map(|s| s.section.clone()),
                    grade: student.map(|s| s.grade),
                }
            })
            .collect();
        lines.sort_by(|a, b| a.occurred_on.cmp(&b.occurred_on).then(a.id.cmp(&b.id)));

        let students = scoring::score_students(records, students, catalog)
            .into_iter()
            .map(|score| StudentTotal {
                level: score.status(),
                status: score.status().label().to_string(),
                nis: score.nis,
                name: score.name,
                total_points: score.total_points,
            })
            .collect();

        Self {
            year,
            month,
            lines,
            summary: summarize_by_category(records),
            students,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn period(&self) -> String {
        format!("{} {}", month_name(self.month), self.year)
    }

    pub fn default_file_name(&self, extension: &str) -> String {
        format!(
            "Laporan_Pelanggaran_{}_{}.{extension}",
            month_name(self.month),
            self.year
        )
    }

    pub fn total_points(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |total, line| total.saturating_add(line.points))
    }
}

pub fn render_markdown(report: &MonthlyReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Laporan Pelanggaran {}", report.period());
    let _ = writeln!(
        output,
        "{} violations, {} points in total",
        report.lines.len(),
        report.total_points()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Ringkasan per Tipe");

    if report.summary.is_empty() {
        let _ = writeln!(output, "No violations recorded for this month.");
    } else {
        for summary in &report.summary {
            let _ = writeln!(output, "- {}: {}", summary.category, summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Siswa");

    if report.students.is_empty() {
        let _ = writeln!(output, "No students with violations this month.");
    } else {
        for student in &report.students {
            let _ = writeln!(
                output,
                "- {} ({}) {} points, {}",
                student.name, student.nis, student.total_points, student.status
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Detail");

    if report.lines.is_empty() {
        let _ = writeln!(output, "No violations recorded for this month.");
    } else {
        for line in &report.lines {
            let _ = writeln!(
                output,
                "- #{} {} {} ({}): {} / {} [{} points]",
                line.id,
                line.occurred_on,
                line.student_name.as_deref().unwrap_or("N/A"),
                line.nis,
                line.category,
                dash_if_empty(&line.description),
                line.points
            );
            if let Some(note) = line.note.as_deref().filter(|note| !note.trim().is_empty()) {
                let _ = writeln!(output, "  Keterangan: {note}");
            }
        }
    }

    output
}

pub fn render_html(report: &MonthlyReport) -> String {
    let mut output = String::new();
    let title = format!("Laporan Pelanggaran {}", report.period());

    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html lang=\"id\">");
    let _ = writeln!(output, "<head><meta charset=\"utf-8\"><title>{}</title></head>", escape(&title));
    let _ = writeln!(output, "<body>");
    let _ = writeln!(output, "<h1>{}</h1>", escape(&title));

    let _ = writeln!(output, "<h2>Ringkasan</h2>");
    let _ = writeln!(output, "<ul>");
    for summary in &report.summary {
        let _ = writeln!(
            output,
            "<li>{}: {}</li>",
            escape(&summary.category),
            summary.count
        );
    }
    let _ = writeln!(output, "</ul>");

    let _ = writeln!(output, "<h2>Status Siswa</h2>");
    let _ = writeln!(output, "<table>");
    let _ = writeln!(output, "<tr><th>NIS</th><th>Nama</th><th>Total Poin</th><th>Status</th></tr>");
    for student in &report.students {
        let _ = writeln!(
            output,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td><span class=\"{}\">{}</span></td></tr>",
            escape(&student.nis),
            escape(&student.name),
            student.total_points,
            student.level.severity().css_class(),
            escape(&student.status)
        );
    }
    let _ = writeln!(output, "</table>");

    let _ = writeln!(output, "<h2>Detail Pelanggaran</h2>");
    let _ = writeln!(output, "<table>");
    let _ = writeln!(
        output,
        "<tr><th>ID</th><th>Tanggal</th><th>NIS</th><th>Nama Siswa</th><th>Kelas</th><th>Tipe Pelanggaran</th><th>Catatan Tambahan</th><th>Keterangan</th><th>Poin</th><th>Dokumentasi Pendukung</th></tr>"
    );
    for line in &report.lines {
        let _ = writeln!(
            output,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            line.id,
            line.occurred_on,
            escape(&line.nis),
            escape(line.student_name.as_deref().unwrap_or("N/A")),
            escape(&class_label(line)),
            escape(&line.category),
            escape(dash_if_empty(&line.description)),
            escape(line.note.as_deref().unwrap_or("-")),
            line.points,
            escape(line.attachment.as_deref().unwrap_or("-"))
        );
    }
    let _ = writeln!(output, "</table>");
    let _ = writeln!(output, "</body>");
    let _ = writeln!(output, "</html>");

    output
}

pub(crate) fn class_label(line: &ReportLine) -> String {
    match (line.grade, line.section.as_deref()) {
        (Some(grade), Some(section)) => format!("{grade}{section}"),
        _ => "N/A".to_string(),
    }
}

pub(crate) fn dash_if_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
