//! In-memory stand-ins for the database-backed collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::{AuthError, AuthEvent, AuthSession, IdentityProvider, RoleDirectory};
use crate::models::{
    ClassRef, NewViolation, RecordFilter, Student, UserIdentity, ViolationPatch, ViolationRecord,
};
use crate::store::{StoreError, ViolationStore};

pub struct FakeIdentity {
    user: Option<(UserIdentity, String)>,
    session: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    lookup_delay: Mutex<Option<std::time::Duration>>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            user: None,
            session: Mutex::new(None),
            events,
            lookup_delay: Mutex::new(None),
        }
    }
}

impl FakeIdentity {
    pub fn with_user(email: &str, password: &str) -> Self {
        let user = UserIdentity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: None,
        };
        Self {
            user: Some((user, password.to_string())),
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user.as_ref().map(|(user, _)| user.id).unwrap_or_default()
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// Makes every `get_user` call take `delay`.
    pub fn slow_lookups(&self, delay: std::time::Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    /// Drops the session server-side without notifying listeners.
    pub fn revoke(&self) {
        *self.session.lock().unwrap() = None;
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let Some((user, expected)) = &self.user else {
            return Err(AuthError::InvalidCredentials);
        };
        if user.email != email || expected != password {
            return Err(AuthError::InvalidCredentials);
        }
        let session = AuthSession {
            access_token: Uuid::new_v4(),
            user_id: user.id,
            expires_at: Utc::now() + Duration::hours(1),
        };
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn);
        Ok(session)
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<UserIdentity>, AuthError> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let signed_in = self.session.lock().unwrap().is_some();
        Ok(self
            .user
            .as_ref()
            .filter(|_| signed_in)
            .map(|(user, _)| user.clone()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.revoke();
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct FakeRoles {
    assignments: Mutex<HashMap<Uuid, i32>>,
    names: Mutex<HashMap<i32, String>>,
    homerooms: Mutex<HashMap<Uuid, ClassRef>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl FakeRoles {
    pub fn assign(&self, user_id: Uuid, role_id: i32, role_name: &str) {
        self.assignments.lock().unwrap().insert(user_id, role_id);
        self.names
            .lock()
            .unwrap()
            .insert(role_id, role_name.to_string());
    }

    pub fn set_homeroom(&self, user_id: Uuid, class: ClassRef) {
        self.homerooms.lock().unwrap().insert(user_id, class);
    }

    pub fn fail_lookups(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Number of role-table round trips made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("role table offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleDirectory for FakeRoles {
    async fn role_id_for_user(&self, user_id: Uuid) -> Result<Option<i32>, StoreError> {
        self.check()?;
        Ok(self.assignments.lock().unwrap().get(&user_id).copied())
    }

    async fn role_name(&self, role_id: i32) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.names.lock().unwrap().get(&role_id).cloned())
    }

    async fn homeroom_class(&self, user_id: Uuid) -> Result<Option<ClassRef>, StoreError> {
        Ok(self.homerooms.lock().unwrap().get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    students: Mutex<Vec<Student>>,
    records: Mutex<Vec<ViolationRecord>>,
    next_id: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_students(students: Vec<Student>) -> Self {
        Self {
            students: Mutex::new(students),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ViolationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn read_guard(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn materialize(&self, new: NewViolation) -> ViolationRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        ViolationRecord {
            id,
            nis: new.nis,
            category: new.category,
            description: new.description,
            points: new.points,
            occurred_on: new.occurred_on,
            note: new.note,
            attachment: new.attachment,
        }
    }
}

#[async_trait]
impl ViolationStore for MemoryStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        self.read_guard()?;
        Ok(self.students.lock().unwrap().clone())
    }

    async fn get_student(&self, nis: &str) -> Result<Option<Student>, StoreError> {
        self.read_guard()?;
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.nis == nis)
            .cloned())
    }

    async fn list_violations(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        self.read_guard()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get_violation(&self, id: i64) -> Result<ViolationRecord, StoreError> {
        self.read_guard()?;
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("violation {id}")))
    }

    async fn insert_violation(&self, new: NewViolation) -> Result<ViolationRecord, StoreError> {
        self.write_guard()?;
        let record = self.materialize(new);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn insert_violations(&self, rows: Vec<NewViolation>) -> Result<usize, StoreError> {
        self.write_guard()?;
        let count = rows.len();
        let records: Vec<ViolationRecord> =
            rows.into_iter().map(|row| self.materialize(row)).collect();
        self.records.lock().unwrap().extend(records);
        Ok(count)
    }

    async fn update_violation(
        &self,
        id: i64,
        patch: ViolationPatch,
    ) -> Result<ViolationRecord, StoreError> {
        self.write_guard()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("violation {id}")))?;
        patch.apply(record);
        Ok(record.clone())
    }

    async fn delete_violation(&self, id: i64) -> Result<(), StoreError> {
        self.write_guard()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(format!("violation {id}")));
        }
        Ok(())
    }
}
