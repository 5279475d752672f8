//! In-memory backend for unit tests. Counts every call by name.

use crate::core::backend::{
    AuthEvent, AuthEventKind, Backend, BackendError, Credentials, Filter, Order, SignUpResponse,
};
use crate::core::models::{Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

const CLOCK_START: i64 = 1_743_840_000;

pub(crate) struct FakeBackend {
    accounts: Mutex<HashMap<String, (String, User)>>,
    session: Mutex<Option<Session>>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<&'static str>>,
    failure: Mutex<Option<BackendError>>,
    confirmation: AtomicBool,
    sign_in_gate: Mutex<Option<Arc<Notify>>>,
    clock: AtomicI64,
    events: broadcast::Sender<AuthEvent>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            tables: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            confirmation: AtomicBool::new(false),
            sign_in_gate: Mutex::new(None),
            clock: AtomicI64::new(CLOCK_START),
            events,
        }
    }

    pub(crate) fn register(&self, email: &str, password: &str) -> User {
        let user = user_for(email);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Pretends a previous run left `user` signed in.
    pub(crate) fn restore_session(&self, user: &User) {
        *self.session.lock().unwrap() = Some(session_for(user));
    }

    pub(crate) fn require_confirmation(&self, on: bool) {
        self.confirmation.store(on, Ordering::SeqCst);
    }

    /// The next sign-in waits for the returned gate before answering.
    pub(crate) fn hold_sign_in(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sign_in_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// The next backend call fails with `err`.
    pub(crate) fn fail_next(&self, err: BackendError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub(crate) fn push(&self, kind: AuthEventKind, user: Option<&User>) {
        let _ = self.events.send(AuthEvent {
            kind,
            session: user.map(session_for),
        });
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, call: &'static str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn tick(&self) -> DateTime<Utc> {
        let secs = self.clock.fetch_add(60, Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).unwrap()
    }
}

fn user_for(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        role: Some("authenticated".into()),
        email_confirmed_at: None,
        created_at: None,
        user_metadata: Value::Null,
    }
}

fn session_for(user: &User) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        token_type: "bearer".into(),
        expires_in: Some(3600),
        expires_at: None,
        refresh_token: format!("refresh-{}", user.id),
        user: user.clone(),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|f| row.get(&f.column).map(text).as_deref() == Some(f.value.as_str()))
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.enter("get_session")?;
        Ok(self.session.lock().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        self.enter("get_user")?;
        Ok(self.session.lock().unwrap().as_ref().map(|s| s.user.clone()))
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        _redirect_to: Option<&str>,
    ) -> Result<SignUpResponse, BackendError> {
        self.enter("sign_up")?;
        let user = self.register(&credentials.email, &credentials.password);
        let session = if self.confirmation.load(Ordering::SeqCst) {
            None
        } else {
            Some(session_for(&user))
        };
        Ok(SignUpResponse {
            user: Some(user),
            session,
        })
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError> {
        self.enter("sign_in_with_password")?;
        let gate = self.sign_in_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let account = self.accounts.lock().unwrap().get(&credentials.email).cloned();
        match account {
            Some((password, user)) if password == credentials.password => {
                let session = session_for(&user);
                *self.session.lock().unwrap() = Some(session.clone());
                self.push(AuthEventKind::SignedIn, Some(&user));
                Ok(session)
            }
            _ => Err(BackendError::Api {
                status: 400,
                code: Some("invalid_credentials".into()),
                message: "Invalid login credentials".into(),
            }),
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.enter("sign_out")?;
        *self.session.lock().unwrap() = None;
        self.push(AuthEventKind::SignedOut, None);
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn select_single(
        &self,
        table: &str,
        _columns: &str,
        filters: &[Filter],
    ) -> Result<Value, BackendError> {
        self.enter("select_single")?;
        let found: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| row_matches(row, filters))
            .collect();
        match found.len() {
            0 => Err(BackendError::NoRows),
            1 => Ok(found.into_iter().next().unwrap()),
            n => Err(BackendError::Api {
                status: 406,
                code: Some("PGRST116".into()),
                message: format!("{n} rows returned"),
            }),
        }
    }

    async fn select(
        &self,
        table: &str,
        _columns: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, BackendError> {
        self.enter("select")?;
        let mut found: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| row_matches(row, filters))
            .collect();
        if let Some(order) = order {
            found.sort_by_key(|row| row.get(&order.column).map(text).unwrap_or_default());
            if !order.ascending {
                found.reverse();
            }
        }
        Ok(found)
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Vec<Value>, BackendError> {
        self.enter("insert")?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        row["id"] = json!(rows.len() as i64 + 1);
        row["created_at"] = json!(self.tick().to_rfc3339());
        rows.push(row.clone());
        Ok(vec![row])
    }
}
