use crate::auth::{AuthError, Role};
use crate::catalog::CatalogError;
use crate::export::ExportError;
use crate::import::ImportError;
use crate::routing::Screen;
use crate::store::StoreError;

/// Application-level error surfaced to the user. Nothing here is fatal: every
/// variant is recoverable by retrying or navigating elsewhere.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected sign-in, shown inline next to the credentials.
    #[error("sign-in failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("access denied: {} cannot open {screen}", role_label(.role))]
    AccessDenied { role: Option<Role>, screen: Screen },
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to load data: {0}")]
    RemoteRead(StoreError),
    #[error("failed to save changes: {0}")]
    RemoteWrite(StoreError),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

fn role_label(role: &Option<Role>) -> String {
    role.as_ref()
        .map(|role| role.name().to_string())
        .unwrap_or_else(|| "an account without a role".to_string())
}

impl AppError {
    pub fn read(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::RemoteRead(other),
        }
    }

    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::RemoteWrite(other),
        }
    }

    /// Short machine-readable code, used in logs and `--json` output.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "AUTHENTICATION_FAILED",
            AppError::NotAuthenticated => "NOT_AUTHENTICATED",
            AppError::AccessDenied { .. } => "ACCESS_DENIED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RemoteRead(_) => "REMOTE_READ_FAILED",
            AppError::RemoteWrite(_) => "REMOTE_WRITE_FAILED",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Cancelled => "CANCELLED",
            AppError::Catalog(_) => "CATALOG_ERROR",
            AppError::Import(_) => "IMPORT_FAILED",
            AppError::Export(_) => "EXPORT_FAILED",
        }
    }
}
