use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::auth::RoleDirectory;
use crate::identity;
use crate::models::{
    ClassRef, NewViolation, RecordFilter, Student, ViolationPatch, ViolationRecord,
};
use crate::store::{StoreError, ViolationStore};

const RECORD_COLUMNS: &str =
    "id, nis, tipe_pelanggaran, deskripsi, poin, tanggal, catatan, dokumentasi";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed violation store and role directory.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn points_to_db(points: Option<u32>) -> Result<Option<i32>, StoreError> {
    points
        .map(|p| i32::try_from(p).map_err(|_| StoreError::Corrupt(format!("points {p} out of range"))))
        .transpose()
}

fn record_from_row(row: &PgRow) -> Result<ViolationRecord, StoreError> {
    let points: Option<i32> = row.try_get("poin")?;
    let points = points
        .map(|p| u32::try_from(p).map_err(|_| StoreError::Corrupt(format!("negative points {p}"))))
        .transpose()?;

    Ok(ViolationRecord {
        id: row.try_get("id")?,
        nis: row.try_get("nis")?,
        category: row.try_get("tipe_pelanggaran")?,
        description: row.try_get("deskripsi")?,
        points,
        occurred_on: row.try_get("tanggal")?,
        note: row.try_get("catatan")?,
        attachment: row.try_get("dokumentasi")?,
    })
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    Ok(Student {
        nis: row.try_get("nis")?,
        name: row.try_get("nama")?,
        gender: row.try_get("jenis_kelamin")?,
        grade: row.try_get("tingkat")?,
        section: row.try_get("kelas")?,
    })
}

#[async_trait]
impl ViolationStore for PgStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query(
            "SELECT nis, nama, jenis_kelamin, tingkat, kelas FROM tatib.siswa \
             ORDER BY tingkat, kelas, nama",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(student_from_row).collect()
    }

    async fn get_student(&self, nis: &str) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(
            "SELECT nis, nama, jenis_kelamin, tingkat, kelas FROM tatib.siswa WHERE nis = $1",
        )
        .bind(nis)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn list_violations(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM tatib.pelanggaran WHERE TRUE"
        ));
        if let Some(from) = filter.from {
            query.push(" AND tanggal >= ").push_bind(from);
        }
        if let Some(until) = filter.until {
            query.push(" AND tanggal < ").push_bind(until);
        }
        if let Some(nis) = &filter.nis {
            query.push(" AND nis = ").push_bind(nis.clone());
        }
        query.push(" ORDER BY tanggal DESC, id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_violation(&self, id: i64) -> Result<ViolationRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM tatib.pelanggaran WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("violation {id}")))?;
        record_from_row(&row)
    }

    async fn insert_violation(&self, new: NewViolation) -> Result<ViolationRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tatib.pelanggaran
            (nis, tipe_pelanggaran, deskripsi, poin, tanggal, catatan, dokumentasi)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(&new.nis)
        .bind(&new.category)
        .bind(&new.description)
        .bind(points_to_db(new.points)?)
        .bind(new.occurred_on)
        .bind(&new.note)
        .bind(&new.attachment)
        .fetch_one(&self.pool)
        .await?;
        record_from_row(&row)
    }

    async fn insert_violations(&self, rows: Vec<NewViolation>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for new in rows {
            sqlx::query(
                r#"
                INSERT INTO tatib.pelanggaran
                (nis, tipe_pelanggaran, deskripsi, poin, tanggal, catatan, dokumentasi)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&new.nis)
            .bind(&new.category)
            .bind(&new.description)
            .bind(points_to_db(new.points)?)
            .bind(new.occurred_on)
            .bind(&new.note)
            .bind(&new.attachment)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_violation(
        &self,
        id: i64,
        patch: ViolationPatch,
    ) -> Result<ViolationRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tatib.pelanggaran SET
                tipe_pelanggaran = COALESCE($2, tipe_pelanggaran),
                deskripsi = COALESCE($3, deskripsi),
                poin = COALESCE($4, poin),
                tanggal = COALESCE($5, tanggal),
                catatan = CASE WHEN $8 THEN $6 ELSE catatan END,
                dokumentasi = CASE WHEN $9 THEN $7 ELSE dokumentasi END
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.category)
        .bind(&patch.description)
        .bind(points_to_db(patch.points)?)
        .bind(patch.occurred_on)
        .bind(patch.note.clone().flatten())
        .bind(patch.attachment.clone().flatten())
        .bind(patch.note.is_some())
        .bind(patch.attachment.is_some())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("violation {id}")))?;
        record_from_row(&row)
    }

    async fn delete_violation(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tatib.pelanggaran WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("violation {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleDirectory for PgStore {
    async fn role_id_for_user(&self, user_id: Uuid) -> Result<Option<i32>, StoreError> {
        let row = sqlx::query(
            "SELECT role_id FROM tatib.user_roles WHERE user_id = $1 ORDER BY role_id LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.try_get("role_id")).transpose()?)
    }

    async fn role_name(&self, role_id: i32) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT role_name FROM tatib.roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("role_name")).transpose()?)
    }

    async fn homeroom_class(&self, user_id: Uuid) -> Result<Option<ClassRef>, StoreError> {
        let row = sqlx::query(
            "SELECT tingkat, kelas FROM tatib.homeroom_assignments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok::<_, StoreError>(ClassRef {
                grade: row.try_get("tingkat")?,
                section: row.try_get("kelas")?,
            })
        })
        .transpose()
    }
}

/// Demo accounts created by `seed`, one per role.
pub const SEED_ACCOUNTS: [(&str, &str, &str); 3] = [
    ("admin@smpn1.sch.id", "admin-tatib", "admin"),
    ("bk@smpn1.sch.id", "bk-tatib", "guru_bk"),
    ("wali8c@smpn1.sch.id", "wali-tatib", "wali_kelas"),
];

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("2024001", "Ahmad Fauzi", "L", 7, "A"),
        ("2024002", "Siti Rahmawati", "P", 7, "B"),
        ("2023001", "Budi Santoso", "L", 8, "C"),
        ("2023002", "Dewi Lestari", "P", 8, "C"),
        ("2022001", "Rizky Pratama", "L", 9, "A"),
    ];

    for (nis, name, gender, grade, section) in students {
        sqlx::query(
            r#"
            INSERT INTO tatib.siswa (nis, nama, jenis_kelamin, tingkat, kelas)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (nis) DO UPDATE
            SET nama = EXCLUDED.nama, tingkat = EXCLUDED.tingkat, kelas = EXCLUDED.kelas
            "#,
        )
        .bind(nis)
        .bind(name)
        .bind(gender)
        .bind(grade as i16)
        .bind(section)
        .execute(pool)
        .await?;
    }

    for (email, password, role) in SEED_ACCOUNTS {
        let hash = identity::hash_password(password)
            .map_err(|e| anyhow::anyhow!("password hash error: {e}"))?;
        let user_id: Uuid = sqlx::query(
            r#"
            INSERT INTO tatib.app_users (id, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET password_hash = EXCLUDED.password_hash
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hash)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO tatib.user_roles (user_id, role_id)
            SELECT $1, id FROM tatib.roles WHERE role_name = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;

        if role == "wali_kelas" {
            sqlx::query(
                r#"
                INSERT INTO tatib.homeroom_assignments (user_id, tingkat, kelas)
                VALUES ($1, 8, 'C')
                ON CONFLICT (user_id) DO UPDATE SET tingkat = EXCLUDED.tingkat, kelas = EXCLUDED.kelas
                "#,
            )
            .bind(user_id)
            .execute(pool)
            .await?;
        }
    }

    let existing: i64 = sqlx::query("SELECT COUNT(*) AS total FROM tatib.pelanggaran")
        .fetch_one(pool)
        .await?
        .get("total");
    if existing > 0 {
        return Ok(());
    }

    let violations = vec![
        ("2023001", "Kedisiplinan", "Datang terlambat", Some(5), (2025, 1, 6)),
        ("2023001", "Kedisiplinan", "Datang terlambat", Some(5), (2025, 1, 13)),
        ("2023001", "Kenakalan", "Merokok/membawa rokok/vape", Some(50), (2025, 1, 20)),
        ("2023002", "Kesopanan", "Menggunakan hp saat guru bicara", Some(5), (2025, 2, 3)),
        ("2022001", "Bullying", "Verbal", None, (2025, 2, 10)),
        ("2024001", "Kedisiplinan", "Atribut tidak lengkap", Some(10), (2025, 2, 17)),
    ];

    for (nis, category, description, points, (year, month, day)) in violations {
        let occurred_on =
            NaiveDate::from_ymd_opt(year, month, day).context("invalid seed date")?;
        sqlx::query(
            r#"
            INSERT INTO tatib.pelanggaran (nis, tipe_pelanggaran, deskripsi, poin, tanggal)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(nis)
        .bind(category)
        .bind(description)
        .bind(points)
        .bind(occurred_on)
        .execute(pool)
        .await?;
    }

    Ok(())
}
