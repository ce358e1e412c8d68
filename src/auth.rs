use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ClassRef, UserIdentity};
use crate::remote;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity backend error: {0}")]
    Backend(String),
    #[error("session file error: {0}")]
    SessionFile(#[from] std::io::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Backend(err.to_string())
    }
}

/// Staff role. Names outside the known set are kept as `Unknown` so callers
/// must handle them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    GuruBk,
    WaliKelas,
    Unknown(String),
}

impl Role {
    pub fn from_name(name: &str) -> Self {
        match name {
            "admin" => Role::Admin,
            "guru_bk" => Role::GuruBk,
            "wali_kelas" => Role::WaliKelas,
            other => Role::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::GuruBk => "guru_bk",
            Role::WaliKelas => "wali_kelas",
            Role::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    TokenRefreshed,
    SignedOut,
    UserUpdated,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError>;
    async fn get_user(&self) -> Result<Option<UserIdentity>, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Role assignment lookups. A role is resolved in two round trips: user to
/// role id, then role id to role name.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_id_for_user(&self, user_id: Uuid) -> Result<Option<i32>, StoreError>;
    async fn role_name(&self, role_id: i32) -> Result<Option<String>, StoreError>;
    async fn homeroom_class(&self, user_id: Uuid) -> Result<Option<ClassRef>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: UserIdentity,
    /// `None` when the account has no role assignment or the lookup failed.
    pub role: Option<Role>,
    pub homeroom: Option<ClassRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Loading,
    Authenticated(Principal),
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }
}

/// Holds the signed-in identity for the lifetime of the application.
///
/// Starts in `Loading`, resolves on `initialize`, re-resolves from scratch on
/// every identity-provider event once `spawn_listener` runs, and stops
/// listening on `shutdown`.
pub struct SessionContext {
    identity: Arc<dyn IdentityProvider>,
    roles: Arc<dyn RoleDirectory>,
    state: watch::Sender<AuthState>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl SessionContext {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        roles: Arc<dyn RoleDirectory>,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            identity,
            roles,
            state,
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current state once any in-flight resolution has finished. Waits at
    /// most one request timeout.
    pub async fn settled(&self) -> Result<AuthState, AppError> {
        let mut rx = self.state.subscribe();
        let resolved = remote::bounded(self.timeout, &self.shutdown, async move {
            rx.wait_for(|state| !state.is_loading())
                .await
                .map(|state| state.clone())
        })
        .await?;
        resolved.map_err(|_| AppError::Cancelled)
    }

    /// Token that fires when the context is torn down. Work tied to the
    /// session should stop when it does.
    pub fn lifetime(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn initialize(&self) -> AuthState {
        tracing::debug!("initializing session");
        self.refresh().await
    }

    pub async fn refresh(&self) -> AuthState {
        self.state.send_replace(AuthState::Loading);
        let next = self.resolve().await;
        self.state.send_replace(next.clone());
        next
    }

    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        let mut events = ctx.identity.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            tracing::debug!(?event, "auth state changed");
                            ctx.refresh().await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "auth events lagged, resolving again");
                            ctx.refresh().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthState, AppError> {
        self.state.send_replace(AuthState::Loading);
        let outcome = remote::bounded(
            self.timeout,
            &self.shutdown,
            self.identity.sign_in_with_password(email, password),
        )
        .await;

        match outcome {
            Ok(Ok(_session)) => {
                let next = self.resolve().await;
                self.state.send_replace(next.clone());
                Ok(next)
            }
            Ok(Err(err)) => {
                tracing::info!(email, error = %err, "sign-in rejected");
                self.state.send_replace(AuthState::Unauthenticated);
                Err(AppError::Authentication(err))
            }
            Err(interrupted) => {
                self.state.send_replace(AuthState::Unauthenticated);
                Err(interrupted.into())
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        let outcome =
            remote::bounded(self.timeout, &self.shutdown, self.identity.sign_out()).await;
        self.state.send_replace(AuthState::Unauthenticated);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(AppError::Authentication(err)),
            Err(interrupted) => Err(interrupted.into()),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn resolve(&self) -> AuthState {
        let Some(Some(_session)) = self.attempt("get_session", self.identity.get_session()).await
        else {
            return AuthState::Unauthenticated;
        };
        let Some(Some(user)) = self.attempt("get_user", self.identity.get_user()).await else {
            return AuthState::Unauthenticated;
        };

        let role = self.resolve_role(user.id).await;
        let homeroom = match role {
            Some(Role::WaliKelas) => self
                .attempt("homeroom_class", self.roles.homeroom_class(user.id))
                .await
                .flatten(),
            _ => None,
        };

        tracing::info!(email = %user.email, role = ?role.as_ref().map(Role::name), "session resolved");
        AuthState::Authenticated(Principal {
            user,
            role,
            homeroom,
        })
    }

    async fn resolve_role(&self, user_id: Uuid) -> Option<Role> {
        let role_id = self
            .attempt("role_id_for_user", self.roles.role_id_for_user(user_id))
            .await
            .flatten()?;
        let name = self
            .attempt("role_name", self.roles.role_name(role_id))
            .await
            .flatten()?;
        Some(Role::from_name(&name))
    }

    async fn attempt<T, E, F>(&self, step: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match remote::bounded(self.timeout, &self.shutdown, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                tracing::warn!(step, error = %err, "session resolution step failed");
                None
            }
            Err(interrupted) => {
                tracing::warn!(step, ?interrupted, "session resolution step interrupted");
                None
            }
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
