use std::path::PathBuf;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::{AuthError, AuthEvent, AuthSession, IdentityProvider};
use crate::models::UserIdentity;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    access_token: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl From<&StoredSession> for AuthSession {
    fn from(stored: &StoredSession) -> Self {
        AuthSession {
            access_token: stored.access_token,
            user_id: stored.user_id,
            expires_at: stored.expires_at,
        }
    }
}

/// Password sign-in against `tatib.app_users`, with the active session token
/// kept in a local JSON file between CLI invocations.
pub struct PgIdentity {
    pool: PgPool,
    session_file: PathBuf,
    ttl: Duration,
    events: broadcast::Sender<AuthEvent>,
}

impl PgIdentity {
    pub fn new(pool: PgPool, session_file: PathBuf, ttl_minutes: i64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            pool,
            session_file,
            ttl: Duration::minutes(ttl_minutes.max(1)),
            events,
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    async fn read_session_file(&self) -> Result<Option<StoredSession>, AuthError> {
        match tokio::fs::read(&self.session_file).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(stored) => Ok(Some(stored)),
                Err(err) => {
                    tracing::warn!(path = %self.session_file.display(), error = %err, "discarding unreadable session file");
                    self.clear_session_file().await?;
                    Ok(None)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_session_file(&self, stored: &StoredSession) -> Result<(), AuthError> {
        if let Some(parent) = self.session_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(stored)
            .map_err(|e| AuthError::Backend(format!("session encode error: {e}")))?;
        tokio::fs::write(&self.session_file, bytes).await?;
        Ok(())
    }

    async fn clear_session_file(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.session_file).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The stored session if the server still knows it and it has not
    /// expired. With `extend`, sessions past half their lifetime are renewed.
    async fn active_session(&self, extend: bool) -> Result<Option<StoredSession>, AuthError> {
        let Some(mut stored) = self.read_session_file().await? else {
            return Ok(None);
        };

        let row = sqlx::query("SELECT user_id, expires_at FROM tatib.sessions WHERE token = $1")
            .bind(stored.access_token)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            self.clear_session_file().await?;
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let now = Utc::now();
        if expires_at <= now {
            sqlx::query("DELETE FROM tatib.sessions WHERE token = $1")
                .bind(stored.access_token)
                .execute(&self.pool)
                .await?;
            self.clear_session_file().await?;
            return Ok(None);
        }

        stored.user_id = row.try_get("user_id")?;
        stored.expires_at = expires_at;

        if extend && expires_at - now < self.ttl / 2 {
            let renewed = now + self.ttl;
            sqlx::query("UPDATE tatib.sessions SET expires_at = $2 WHERE token = $1")
                .bind(stored.access_token)
                .bind(renewed)
                .execute(&self.pool)
                .await?;
            stored.expires_at = renewed;
            self.write_session_file(&stored).await?;
            tracing::debug!("session extended");
            self.emit(AuthEvent::TokenRefreshed);
        }

        Ok(Some(stored))
    }
}

#[async_trait]
impl IdentityProvider for PgIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let row = sqlx::query(
            "SELECT id, password_hash FROM tatib.app_users WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        let user_id: Uuid = row.try_get("id")?;
        let hash: String = row.try_get("password_hash")?;
        let is_valid = verify_password(password, &hash)
            .map_err(|e| AuthError::Backend(format!("password verify error: {e}")))?;
        if !is_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let stored = StoredSession {
            access_token: Uuid::new_v4(),
            user_id,
            expires_at: Utc::now() + self.ttl,
        };
        sqlx::query("INSERT INTO tatib.sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(stored.access_token)
            .bind(stored.user_id)
            .bind(stored.expires_at)
            .execute(&self.pool)
            .await?;
        self.write_session_file(&stored).await?;

        self.emit(AuthEvent::SignedIn);
        Ok(AuthSession::from(&stored))
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.active_session(true).await?.as_ref().map(AuthSession::from))
    }

    async fn get_user(&self) -> Result<Option<UserIdentity>, AuthError> {
        let Some(stored) = self.active_session(false).await? else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT id, email, display_name FROM tatib.app_users WHERE id = $1")
            .bind(stored.user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok::<_, AuthError>(UserIdentity {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
                display_name: row.try_get("display_name")?,
            })
        })
        .transpose()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(stored) = self.read_session_file().await? {
            sqlx::query("DELETE FROM tatib.sessions WHERE token = $1")
                .bind(stored.access_token)
                .execute(&self.pool)
                .await?;
        }
        self.clear_session_file().await?;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("rahasia-123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("rahasia-123", &hash).unwrap());
        assert!(!verify_password("rahasia-124", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
