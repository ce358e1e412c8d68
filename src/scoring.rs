use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::models::{Student, ViolationRecord};
use crate::status::{classify, Status};

const UNKNOWN_STUDENT: &str = "Nama Tidak Ditemukan";

/// Stored value wins; the catalog is only consulted when nothing was stored,
/// so catalog edits never rewrite historical totals.
pub fn resolve_points(record: &ViolationRecord, catalog: &Catalog) -> u32 {
    record
        .points
        .unwrap_or_else(|| catalog.points_for_label(&record.category, &record.description))
}

pub fn total_points<'a, I>(records: I, catalog: &Catalog) -> u32
where
    I: IntoIterator<Item = &'a ViolationRecord>,
{
    records
        .into_iter()
        .fold(0u32, |total, record| total.saturating_add(resolve_points(record, catalog)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredViolation {
    pub id: i64,
    pub category: String,
    pub description: String,
    pub stored_points: Option<u32>,
    pub resolved_points: u32,
    pub occurred_on: NaiveDate,
}

/// Per-student aggregate, rebuilt on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentScore {
    pub nis: String,
    pub name: String,
    pub grade: Option<i16>,
    pub section: Option<String>,
    pub total_points: u32,
    pub violations: Vec<ScoredViolation>,
}

impl StudentScore {
    pub fn status(&self) -> Status {
        classify(self.total_points)
    }
}

pub fn score_students(
    records: &[ViolationRecord],
    students: &HashMap<String, Student>,
    catalog: &Catalog,
) -> Vec<StudentScore> {
    let mut scores: HashMap<&str, StudentScore> = HashMap::new();

    for record in records {
        let resolved = resolve_points(record, catalog);
        let entry = scores.entry(record.nis.as_str()).or_insert_with(|| {
            let student = students.get(&record.nis);
            StudentScore {
                nis: record.nis.clone(),
                name: student
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| UNKNOWN_STUDENT.to_string()),
                grade: student.map(|s| s.grade),
                section: student.map(|s| s.section.clone()),
                total_points: 0,
                violations: Vec::new(),
            }
        });

        entry.total_points = entry.total_points.saturating_add(resolved);
        entry.violations.push(ScoredViolation {
            id: record.id,
            category: record.category.clone(),
            description: record.description.clone(),
            stored_points: record.points,
            resolved_points: resolved,
            occurred_on: record.occurred_on,
        });
    }

    let mut values: Vec<StudentScore> = scores.into_values().collect();
    for score in &mut values {
        score
            .violations
            .sort_by(|a, b| b.occurred_on.cmp(&a.occurred_on).then(a.id.cmp(&b.id)));
    }
    values.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.nis.cmp(&b.nis))
    });
    values
}

/// Filters applied to the grouped monitoring view.
#[derive(Debug, Clone, Default)]
pub struct MonitoringFilter {
    pub search: Option<String>,
    pub section: Option<String>,
    pub grade: Option<i16>,
    pub category: Option<String>,
}

impl MonitoringFilter {
    pub fn matches(&self, score: &StudentScore) -> bool {
        let name_ok = self.search.as_deref().is_none_or(|needle| {
            score
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let section_ok = self
            .section
            .as_deref()
            .is_none_or(|section| score.section.as_deref() == Some(section));
        let grade_ok = self.grade.is_none_or(|grade| score.grade == Some(grade));
        let category_ok = self.category.as_deref().is_none_or(|category| {
            score.violations.iter().any(|v| v.category == category)
        });
        name_ok && section_ok && grade_ok && category_ok
    }
}
