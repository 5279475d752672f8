use crate::core::models::{Session, User};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// PostgREST's code for "single row requested, zero returned".
pub const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Expected absence: a single-row select matched nothing.
    #[error("No rows returned")]
    NoRows,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Pushed by the backend client whenever its session changes.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn user(&self) -> Option<User> {
        self.session.as_ref().map(|s| s.user.clone())
    }
}

#[derive(Serialize, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Account creation result. `session` is `None` when the backend gates
/// new accounts behind email confirmation.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// The hosted auth/database service, as consumed by this crate.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Current session, refreshed first if the persisted one has expired.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Fresh user lookup against the backend, bypassing cached state.
    async fn get_user(&self) -> Result<Option<User>, BackendError>;

    async fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<SignUpResponse, BackendError>;

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Subscribes to session changes (sign-in, sign-out, refresh).
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;

    /// Exactly one matching row, or [`BackendError::NoRows`].
    async fn select_single(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
    ) -> Result<Value, BackendError>;

    async fn select(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, BackendError>;

    /// Inserts `row` and returns the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, BackendError>;
}
