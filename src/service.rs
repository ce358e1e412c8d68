use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::auth::{Principal, Role, SessionContext};
use crate::catalog::{Catalog, ViolationCategory, MAX_POINTS};
use crate::error::AppError;
use crate::import;
use crate::models::{
    ClassRef, NewViolation, RecordFilter, Student, ViolationPatch, ViolationRecord,
};
use crate::remote;
use crate::report::{self, MonthlyReport};
use crate::routing::{authorize, Screen};
use crate::scoring::{self, resolve_points, MonitoringFilter, StudentScore};
use crate::status::classify;
use crate::store::{StoreError, ViolationStore};

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentViolation {
    pub id: i64,
    pub nis: String,
    pub student_name: Option<String>,
    pub class: Option<String>,
    pub category: String,
    pub description: String,
    pub points: u32,
    pub occurred_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_violations: usize,
    pub students_involved: usize,
    pub this_month: usize,
    pub recent: Vec<RecentViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentRow {
    pub nis: String,
    pub name: String,
    pub grade: i16,
    pub section: String,
    pub violation_count: usize,
    pub total_points: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentOverview {
    pub grade: Option<i16>,
    pub section: Option<String>,
    pub students_in_filter: usize,
    /// Only students with at least one recorded violation.
    pub rows: Vec<StudentRow>,
    pub total_points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeroomDashboard {
    pub class: ClassRef,
    pub overview: StudentOverview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub homeroom: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    /// Rows whose category is not in the catalog; they score zero unless
    /// the file carried explicit points.
    pub unrecognised_categories: usize,
}

/// Screen-level operations over the violation store for the signed-in user.
///
/// Every call checks the session's role first, then talks to the store under
/// the session's timeout and lifetime token. Nothing is cached between calls.
pub struct TrackerService {
    store: Arc<dyn ViolationStore>,
    catalog: Arc<Catalog>,
    session: Arc<SessionContext>,
}

impl TrackerService {
    pub fn new(
        store: Arc<dyn ViolationStore>,
        catalog: Arc<Catalog>,
        session: Arc<SessionContext>,
    ) -> Self {
        Self {
            store,
            catalog,
            session,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub async fn dashboard(&self, today: NaiveDate) -> Result<DashboardStats, AppError> {
        self.principal_for(Screen::DashboardStats).await?;
        let records = self
            .read(self.store.list_violations(&RecordFilter::default()))
            .await?;
        let students = self.student_index().await?;

        let students_involved = records
            .iter()
            .map(|r| r.nis.as_str())
            .collect::<HashSet<_>>()
            .len();
        let this_month = records
            .iter()
            .filter(|r| {
                r.occurred_on.year() == today.year() && r.occurred_on.month() == today.month()
            })
            .count();

        let mut recent: Vec<&ViolationRecord> = records.iter().collect();
        recent.sort_by(|a, b| b.occurred_on.cmp(&a.occurred_on).then(b.id.cmp(&a.id)));
        let recent = recent
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|record| {
                let student = students.get(&record.nis);
                RecentViolation {
                    id: record.id,
                    nis: record.nis.clone(),
                    student_name: student.map(|s| s.name.clone()),
                    class: student.map(|s| s.class().to_string()),
                    category: record.category.clone(),
                    description: record.description.clone(),
                    points: resolve_points(record, &self.catalog),
                    occurred_on: record.occurred_on,
                }
            })
            .collect();

        Ok(DashboardStats {
            total_violations: records.len(),
            students_involved,
            this_month,
            recent,
        })
    }

    pub async fn monitoring(&self, filter: &MonitoringFilter) -> Result<Vec<StudentScore>, AppError> {
        self.principal_for(Screen::Monitoring).await?;
        let records = self
            .read(self.store.list_violations(&RecordFilter::default()))
            .await?;
        let students = self.student_index().await?;

        let scores = scoring::score_students(&records, &students, &self.catalog)
            .into_iter()
            .filter(|score| filter.matches(score))
            .collect();
        Ok(scores)
    }

    pub async fn student_overview(
        &self,
        grade: Option<i16>,
        section: Option<String>,
    ) -> Result<StudentOverview, AppError> {
        let principal = self.principal_for(Screen::Students).await?;
        let (grade, section) = match principal.role {
            Some(Role::WaliKelas) => {
                let class = homeroom_of(&principal)?;
                let wants_other = grade.is_some_and(|g| g != class.grade)
                    || section.as_deref().is_some_and(|s| s != class.section);
                if wants_other {
                    return Err(AppError::AccessDenied {
                        role: principal.role.clone(),
                        screen: Screen::Students,
                    });
                }
                (Some(class.grade), Some(class.section.clone()))
            }
            _ => (grade, section),
        };
        self.overview(grade, section).await
    }

    pub async fn homeroom_dashboard(&self) -> Result<HomeroomDashboard, AppError> {
        let principal = self.principal_for(Screen::HomeroomDashboard).await?;
        let class = homeroom_of(&principal)?.clone();
        let overview = self
            .overview(Some(class.grade), Some(class.section.clone()))
            .await?;
        Ok(HomeroomDashboard { class, overview })
    }

    pub async fn add_violation(&self, new: NewViolation) -> Result<ViolationRecord, AppError> {
        let principal = self.principal_for(Screen::AddViolation).await?;
        let category = parse_category(&new.category)?;
        let description = new.description.trim().to_string();
        if description.is_empty() {
            return Err(AppError::Validation("description must not be empty".to_string()));
        }
        check_points(new.points)?;

        let nis = new.nis.trim().to_string();
        if self.read(self.store.get_student(&nis)).await?.is_none() {
            return Err(AppError::Validation(format!("no student with NIS {nis}")));
        }

        let points = new
            .points
            .unwrap_or_else(|| self.catalog.points(category, &description));
        let record = self
            .write(self.store.insert_violation(NewViolation {
                nis,
                category: category.label().to_string(),
                description,
                points: Some(points),
                ..new
            }))
            .await?;

        tracing::info!(
            id = record.id,
            nis = %record.nis,
            points,
            by = %principal.user.email,
            "violation recorded"
        );
        Ok(record)
    }

    /// Loads a single record for the full edit page.
    pub async fn violation(&self, id: i64) -> Result<ViolationRecord, AppError> {
        self.principal_for(Screen::EditViolation).await?;
        self.read(self.store.get_violation(id)).await
    }

    /// Applies `patch` to record `id`. When the category or description
    /// changes and no explicit points are given, the stored points are
    /// re-read from the catalog for the new pair.
    pub async fn edit_violation(
        &self,
        id: i64,
        mut patch: ViolationPatch,
    ) -> Result<ViolationRecord, AppError> {
        let principal = self.principal_for(Screen::Monitoring).await?;
        if let Some(category) = &patch.category {
            patch.category = Some(parse_category(category)?.label().to_string());
        }
        if let Some(description) = &patch.description {
            let trimmed = description.trim();
            if trimmed.is_empty() {
                return Err(AppError::Validation("description must not be empty".to_string()));
            }
            patch.description = Some(trimmed.to_string());
        }
        check_points(patch.points)?;

        if patch.points.is_none() && patch.touches_scoring_key() {
            let mut merged = self.read(self.store.get_violation(id)).await?;
            patch.apply(&mut merged);
            patch.points = Some(
                self.catalog
                    .points_for_label(&merged.category, &merged.description),
            );
        }

        let record = self.write(self.store.update_violation(id, patch)).await?;
        tracing::info!(id, by = %principal.user.email, "violation updated");
        Ok(record)
    }

    pub async fn delete_violation(&self, id: i64) -> Result<(), AppError> {
        let principal = self.principal_for(Screen::Monitoring).await?;
        self.write(self.store.delete_violation(id)).await?;
        tracing::info!(id, by = %principal.user.email, "violation deleted");
        Ok(())
    }

    pub async fn monthly_report(&self, year: i32, month: u32) -> Result<MonthlyReport, AppError> {
        self.principal_for(Screen::Reports).await?;
        let (from, until) = report::month_range(year, month)
            .ok_or_else(|| AppError::Validation(format!("invalid month {month}/{year}")))?;
        let filter = RecordFilter {
            from: Some(from),
            until: Some(until),
            nis: None,
        };
        let records = self.read(self.store.list_violations(&filter)).await?;
        let students = self.student_index().await?;
        Ok(MonthlyReport::build(year, month, &records, &students, &self.catalog))
    }

    /// Parses the whole file, then inserts every row in one transaction.
    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, AppError> {
        let principal = self.principal_for(Screen::Reports).await?;
        if principal.role != Some(Role::Admin) {
            return Err(AppError::AccessDenied {
                role: principal.role.clone(),
                screen: Screen::Reports,
            });
        }

        let rows = import::read_violations(path)?;
        let unrecognised_categories = rows
            .iter()
            .filter(|row| row.category.parse::<ViolationCategory>().is_err())
            .count();
        if unrecognised_categories > 0 {
            tracing::warn!(unrecognised_categories, "import contains categories outside the catalog");
        }

        let inserted = self.write(self.store.insert_violations(rows)).await?;
        tracing::info!(inserted, path = %path.display(), by = %principal.user.email, "import committed");
        Ok(ImportSummary {
            inserted,
            unrecognised_categories,
        })
    }

    pub async fn profile(&self) -> Result<Profile, AppError> {
        let principal = self.principal_for(Screen::Profile).await?;
        Ok(Profile {
            email: principal.user.email,
            display_name: principal.user.display_name,
            role: principal.role.map(|role| role.name().to_string()),
            homeroom: principal.homeroom.map(|class| class.to_string()),
        })
    }

    async fn principal_for(&self, screen: Screen) -> Result<Principal, AppError> {
        let state = self.session.settled().await?;
        let principal = state.principal().ok_or(AppError::NotAuthenticated)?;
        if !authorize(principal.role.as_ref(), screen) {
            tracing::debug!(%screen, role = ?principal.role, "access denied");
            return Err(AppError::AccessDenied {
                role: principal.role.clone(),
                screen,
            });
        }
        Ok(principal.clone())
    }

    async fn overview(
        &self,
        grade: Option<i16>,
        section: Option<String>,
    ) -> Result<StudentOverview, AppError> {
        let students = self.read(self.store.list_students()).await?;
        let records = self
            .read(self.store.list_violations(&RecordFilter::default()))
            .await?;

        let in_filter: Vec<&Student> = students
            .iter()
            .filter(|s| grade.is_none_or(|g| s.grade == g))
            .filter(|s| section.as_deref().is_none_or(|c| s.section == c))
            .collect();

        let mut by_student: HashMap<&str, Vec<&ViolationRecord>> = HashMap::new();
        for record in &records {
            by_student.entry(record.nis.as_str()).or_default().push(record);
        }

        let mut rows: Vec<StudentRow> = in_filter
            .iter()
            .filter_map(|student| {
                let own = by_student.get(student.nis.as_str())?;
                let total = scoring::total_points(own.iter().copied(), &self.catalog);
                Some(StudentRow {
                    nis: student.nis.clone(),
                    name: student.name.clone(),
                    grade: student.grade,
                    section: student.section.clone(),
                    violation_count: own.len(),
                    total_points: total,
                    status: classify(total).label().to_string(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.nis.cmp(&b.nis))
        });

        let total_points = rows
            .iter()
            .fold(0u32, |total, row| total.saturating_add(row.total_points));
        Ok(StudentOverview {
            grade,
            section,
            students_in_filter: in_filter.len(),
            rows,
            total_points,
        })
    }

    async fn student_index(&self) -> Result<HashMap<String, Student>, AppError> {
        let students = self.read(self.store.list_students()).await?;
        Ok(students
            .into_iter()
            .map(|student| (student.nis.clone(), student))
            .collect())
    }

    async fn read<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.bounded(fut).await?.map_err(AppError::read)
    }

    async fn write<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.bounded(fut).await?.map_err(AppError::write)
    }

    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, AppError> {
        let lifetime = self.session.lifetime();
        Ok(remote::bounded(self.session.request_timeout(), &lifetime, fut).await?)
    }
}

fn homeroom_of(principal: &Principal) -> Result<&ClassRef, AppError> {
    principal
        .homeroom
        .as_ref()
        .ok_or_else(|| AppError::NotFound("homeroom class assignment".to_string()))
}

fn parse_category(label: &str) -> Result<ViolationCategory, AppError> {
    label
        .trim()
        .parse::<ViolationCategory>()
        .map_err(|_| AppError::Validation(format!("unknown violation category {label:?}")))
}

fn check_points(points: Option<u32>) -> Result<(), AppError> {
    match points {
        Some(points) if points > MAX_POINTS => Err(AppError::Validation(format!(
            "points must be between 0 and {MAX_POINTS}, got {points}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{FakeIdentity, FakeRoles, MemoryStore};

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn student(nis: &str, name: &str, grade: i16, section: &str) -> Student {
        Student {
            nis: nis.to_string(),
            name: name.to_string(),
            gender: None,
            grade,
            section: section.to_string(),
        }
    }

    fn new_violation(nis: &str, category: &str, description: &str, on: NaiveDate) -> NewViolation {
        NewViolation {
            nis: nis.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            points: None,
            occurred_on: on,
            note: None,
            attachment: None,
        }
    }

    async fn service_as(role: Option<&str>) -> (TrackerService, Arc<MemoryStore>) {
        let identity = Arc::new(FakeIdentity::with_user("staf@sekolah.id", "pw"));
        let roles = Arc::new(FakeRoles::default());
        if let Some(role) = role {
            roles.assign(identity.user_id(), 1, role);
            roles.set_homeroom(
                identity.user_id(),
                ClassRef {
                    grade: 8,
                    section: "C".to_string(),
                },
            );
        }
        let session = Arc::new(SessionContext::new(
            identity,
            roles,
            Duration::from_secs(2),
        ));
        session.sign_in("staf@sekolah.id", "pw").await.unwrap();

        let store = Arc::new(MemoryStore::with_students(vec![
            student("8001", "Budi Santoso", 8, "C"),
            student("8002", "Citra Lestari", 8, "C"),
            student("7001", "Dewi Anggraini", 7, "A"),
        ]));
        let service = TrackerService::new(store.clone(), Arc::new(Catalog::builtin()), session);
        (service, store)
    }

    #[tokio::test]
    async fn add_stores_catalog_points_at_creation() {
        let (service, store) = service_as(Some("guru_bk")).await;
        let record = service
            .add_violation(new_violation("8001", "Kedisiplinan", "Datang terlambat", date(3, 4)))
            .await
            .unwrap();
        assert_eq!(record.points, Some(5));
        assert_eq!(store.records()[0].category, "Kedisiplinan");

        let aliased = service
            .add_violation(new_violation(
                "8001",
                "Pornografi/Pornoaksi",
                "Menunjukkan gestur/simbol porno",
                date(3, 5),
            ))
            .await
            .unwrap();
        assert_eq!(aliased.category, "Pornografi");
        assert_eq!(aliased.points, Some(10));
    }

    #[tokio::test]
    async fn add_rejects_bad_input() {
        let (service, _) = service_as(Some("admin")).await;

        let unknown = service
            .add_violation(new_violation("9999", "Kedisiplinan", "Tidur", date(3, 4)))
            .await;
        assert!(matches!(unknown, Err(AppError::Validation(_))));

        let category = service
            .add_violation(new_violation("8001", "Olahraga", "Tidur", date(3, 4)))
            .await;
        assert!(matches!(category, Err(AppError::Validation(_))));

        let blank = service
            .add_violation(new_violation("8001", "Kesopanan", "   ", date(3, 4)))
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn homeroom_teacher_cannot_add() {
        let (service, store) = service_as(Some("wali_kelas")).await;
        let err = service
            .add_violation(new_violation("8001", "Kedisiplinan", "Tidur", date(3, 4)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::AccessDenied {
                screen: Screen::AddViolation,
                ..
            }
        ));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn edit_recomputes_points_only_when_key_changes() {
        let (service, _) = service_as(Some("admin")).await;
        let record = service
            .add_violation(new_violation("8001", "Kedisiplinan", "Datang terlambat", date(3, 4)))
            .await
            .unwrap();

        let noted = service
            .edit_violation(
                record.id,
                ViolationPatch {
                    note: Some(Some("orang tua dihubungi".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(noted.points, Some(5));
        assert_eq!(noted.note.as_deref(), Some("orang tua dihubungi"));

        let cleared = service
            .edit_violation(
                record.id,
                ViolationPatch {
                    note: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.note, None);
        assert_eq!(cleared.description, "Datang terlambat");

        let moved = service
            .edit_violation(
                record.id,
                ViolationPatch {
                    description: Some("Absen 3 hari berturut-turut (alpa)".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.points, Some(30));

        let explicit = service
            .edit_violation(
                record.id,
                ViolationPatch {
                    category: Some("Kesopanan".to_string()),
                    description: Some("Tidur".to_string()),
                    points: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(explicit.points, Some(2));
    }

    #[tokio::test]
    async fn delete_missing_record_is_not_found() {
        let (service, _) = service_as(Some("guru_bk")).await;
        assert!(matches!(service.delete_violation(42).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn monitoring_groups_and_filters() {
        let (service, _) = service_as(Some("admin")).await;
        for (nis, category, description) in [
            ("8001", "Kedisiplinan", "Datang terlambat"),
            ("8001", "Bullying", "Verbal"),
            ("7001", "Kedisiplinan", "Tidur"),
        ] {
            service
                .add_violation(new_violation(nis, category, description, date(3, 4)))
                .await
                .unwrap();
        }

        let all = service.monitoring(&MonitoringFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].nis, "8001");
        assert_eq!(all[0].total_points, 55);
        assert_eq!(all[0].status(), crate::status::Status::Sp1);

        let bullying = service
            .monitoring(&MonitoringFilter {
                category: Some("Bullying".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(bullying.len(), 1);
    }

    #[tokio::test]
    async fn homeroom_teacher_sees_only_own_class() {
        let (admin, store) = service_as(Some("admin")).await;
        admin
            .add_violation(new_violation("8001", "Kedisiplinan", "Tidur", date(3, 4)))
            .await
            .unwrap();
        admin
            .add_violation(new_violation("7001", "Kedisiplinan", "Tidur", date(3, 4)))
            .await
            .unwrap();

        let (wali, _) = service_as(Some("wali_kelas")).await;
        let wali = TrackerService::new(store, Arc::new(Catalog::builtin()), wali.session().clone());

        let overview = wali.student_overview(None, None).await.unwrap();
        assert_eq!(overview.grade, Some(8));
        assert_eq!(overview.section.as_deref(), Some("C"));
        assert_eq!(overview.students_in_filter, 2);
        assert_eq!(overview.rows.len(), 1);
        assert_eq!(overview.total_points, 5);

        assert!(matches!(
            wali.student_overview(Some(7), None).await,
            Err(AppError::AccessDenied { .. })
        ));
        assert_eq!(wali.homeroom_dashboard().await.unwrap().class.to_string(), "8C");
    }

    #[tokio::test]
    async fn dashboard_counts_and_recent_order() {
        let (service, _) = service_as(Some("guru_bk")).await;
        for day in 1..=7 {
            service
                .add_violation(new_violation("8001", "Kedisiplinan", "Tidur", date(2, day)))
                .await
                .unwrap();
        }
        service
            .add_violation(new_violation("7001", "Kedisiplinan", "Tidur", date(3, 1)))
            .await
            .unwrap();

        let stats = service.dashboard(date(3, 15)).await.unwrap();
        assert_eq!(stats.total_violations, 8);
        assert_eq!(stats.students_involved, 2);
        assert_eq!(stats.this_month, 1);
        assert_eq!(stats.recent.len(), 5);
        assert_eq!(stats.recent[0].occurred_on, date(3, 1));
        assert_eq!(stats.recent[0].class.as_deref(), Some("7A"));
        assert_eq!(stats.recent[1].occurred_on, date(2, 7));
    }

    #[tokio::test]
    async fn monthly_report_uses_half_open_window() {
        let (service, _) = service_as(Some("admin")).await;
        for on in [date(1, 31), date(2, 1), date(2, 28), date(3, 1)] {
            service
                .add_violation(new_violation("8001", "Kedisiplinan", "Tidur", on))
                .await
                .unwrap();
        }
        let report = service.monthly_report(2025, 2).await.unwrap();
        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.summary[0].count, 2);
        assert_eq!(report.lines[0].student_name.as_deref(), Some("Budi Santoso"));
    }

    #[tokio::test]
    async fn reports_are_admin_only() {
        let (service, _) = service_as(Some("guru_bk")).await;
        assert!(matches!(
            service.monthly_report(2025, 2).await,
            Err(AppError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let (service, store) = service_as(Some("admin")).await;
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(
            b"NIS,Tipe Pelanggaran,Catatan,Poin,Tanggal\n\
              8001,Kedisiplinan,Tidur,5,2025-03-04\n\
              8002,Kedisiplinan,Tidur,5,\n",
        )
        .unwrap();
        assert!(matches!(
            service.import_file(file.path()).await,
            Err(AppError::Import(import::ImportError::Row { row: 3, .. }))
        ));
        assert!(store.records().is_empty());

        let mut good = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        good.write_all(
            b"NIS,Tipe Pelanggaran,Catatan,Poin,Tanggal\n\
              8001,Kedisiplinan,Tidur,,2025-03-04\n\
              8002,Lain-lain,Tidur,7,2025-03-05\n",
        )
        .unwrap();
        let summary = service.import_file(good.path()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                inserted: 2,
                unrecognised_categories: 1
            }
        );
        assert_eq!(store.records()[0].points, None);
    }

    #[tokio::test]
    async fn store_failures_map_to_remote_errors() {
        let (service, store) = service_as(Some("admin")).await;
        store.fail_reads();
        assert!(matches!(
            service.monitoring(&MonitoringFilter::default()).await,
            Err(AppError::RemoteRead(_))
        ));
        store.fail_writes();
        assert!(matches!(
            service.delete_violation(1).await,
            Err(AppError::RemoteWrite(_))
        ));
    }

    #[tokio::test]
    async fn unknown_role_sees_only_profile() {
        let (service, _) = service_as(Some("kepala_sekolah")).await;
        let profile = service.profile().await.unwrap();
        assert_eq!(profile.role.as_deref(), Some("kepala_sekolah"));
        assert!(matches!(
            service.student_overview(None, None).await,
            Err(AppError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn signed_out_user_is_rejected() {
        let (service, _) = service_as(Some("admin")).await;
        service.session().sign_out().await.unwrap();
        assert!(matches!(service.profile().await, Err(AppError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn operations_wait_for_session_refresh() {
        let identity = Arc::new(FakeIdentity::with_user("admin@sekolah.id", "pw"));
        let roles = Arc::new(FakeRoles::default());
        roles.assign(identity.user_id(), 1, "admin");
        let session = Arc::new(SessionContext::new(
            identity.clone(),
            roles,
            Duration::from_secs(2),
        ));
        session.sign_in("admin@sekolah.id", "pw").await.unwrap();
        let store = Arc::new(MemoryStore::with_students(vec![student("8001", "Budi Santoso", 8, "C")]));
        let service = TrackerService::new(store, Arc::new(Catalog::builtin()), session.clone());

        identity.slow_lookups(Duration::from_millis(300));
        let refreshing = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.state().is_loading());

        let rows = service.monitoring(&MonitoringFilter::default()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(service.profile().await.unwrap().role.as_deref(), Some("admin"));
        assert!(refreshing.await.unwrap().principal().is_some());
    }
}
