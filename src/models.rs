use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GRADE_LEVELS: [i16; 3] = [7, 8, 9];
pub const CLASS_SECTIONS: [&str; 11] = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub nis: String,
    pub name: String,
    pub gender: Option<String>,
    pub grade: i16,
    pub section: String,
}

impl Student {
    pub fn class(&self) -> ClassRef {
        ClassRef {
            grade: self.grade,
            section: self.section.clone(),
        }
    }
}

/// A grade level plus section, e.g. 8 C.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassRef {
    pub grade: i16,
    pub section: String,
}

impl std::fmt::Display for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.grade, self.section)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationRecord {
    pub id: i64,
    pub nis: String,
    /// Free-text label, matched exactly against the catalog.
    pub category: String,
    pub description: String,
    /// Stored value; `None` when the record was created without one.
    pub points: Option<u32>,
    pub occurred_on: NaiveDate,
    pub note: Option<String>,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewViolation {
    pub nis: String,
    pub category: String,
    pub description: String,
    pub points: Option<u32>,
    pub occurred_on: NaiveDate,
    pub note: Option<String>,
    pub attachment: Option<String>,
}

/// Field-wise update; `None` leaves the stored value untouched. For the
/// optional `note` and `attachment`, `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationPatch {
    pub category: Option<String>,
    pub description: Option<String>,
    pub points: Option<u32>,
    pub occurred_on: Option<NaiveDate>,
    pub note: Option<Option<String>>,
    pub attachment: Option<Option<String>>,
}

impl ViolationPatch {
    pub fn touches_scoring_key(&self) -> bool {
        self.category.is_some() || self.description.is_some()
    }

    pub fn apply(&self, record: &mut ViolationRecord) {
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(points) = self.points {
            record.points = Some(points);
        }
        if let Some(occurred_on) = self.occurred_on {
            record.occurred_on = occurred_on;
        }
        if let Some(note) = &self.note {
            record.note = note.clone();
        }
        if let Some(attachment) = &self.attachment {
            record.attachment = attachment.clone();
        }
    }
}

/// Date window for record reads. `until` is exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub nis: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ViolationRecord) -> bool {
        self.from.is_none_or(|from| record.occurred_on >= from)
            && self.until.is_none_or(|until| record.occurred_on < until)
            && self.nis.as_deref().is_none_or(|nis| record.nis == nis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}
