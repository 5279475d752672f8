use crate::core::backend::{
    AuthEvent, AuthEventKind, Backend, BackendError, Credentials, Filter, NO_ROWS_CODE, Order,
    SignUpResponse,
};
use crate::core::models::{Session, User};
use crate::core::storage::SessionStorage;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

// ── Error bodies ─────────────────────────────────────────────────

/// Union of the auth (GoTrue) and table (PostgREST) error shapes.
#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

fn api_error(status: StatusCode, text: &str) -> BackendError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let code = body.error_code.or(body.code.map(|c| match c {
        Value::String(s) => s,
        other => other.to_string(),
    }));

    // PGRST116 also covers "more than one row"; only zero rows is the sentinel.
    if code.as_deref() == Some(NO_ROWS_CODE)
        && body.details.as_deref().is_none_or(|d| d.contains("0 rows"))
    {
        return BackendError::NoRows;
    }

    let message = body
        .msg
        .or(body.error_description)
        .or(body.message)
        .or(body.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    BackendError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

fn network(e: reqwest::Error) -> BackendError {
    BackendError::Network(e.to_string())
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(api_error(status, &text));
    }
    resp.json().await.map_err(|e| BackendError::Parse(e.to_string()))
}

fn from_json<T: DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn table_query(columns: &str, filters: &[Filter], order: Option<&Order>) -> Vec<(String, String)> {
    let mut query = vec![("select".to_string(), columns.to_string())];
    query.extend(
        filters
            .iter()
            .map(|f| (f.column.clone(), format!("eq.{}", f.value))),
    );
    if let Some(order) = order {
        let direction = if order.ascending { "asc" } else { "desc" };
        query.push(("order".into(), format!("{}.{direction}", order.column)));
    }
    query
}

// ── Client ───────────────────────────────────────────────────────

/// `loaded` separates "storage not read yet" from "signed out".
#[derive(Default)]
struct SessionSlot {
    loaded: bool,
    session: Option<Session>,
}

/// Handle to the hosted auth/database service.
///
/// Holds the active session in memory, mirrors it into `storage`, and
/// broadcasts an [`AuthEvent`] whenever it changes.
pub struct SupabaseClient {
    http: Client,
    url: String,
    key: String,
    session: Mutex<SessionSlot>,
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(url: &str, key: &str, storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            session: Mutex::new(SessionSlot::default()),
            storage,
            events,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    fn request(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", self.key.as_str())
            .bearer_auth(bearer)
    }

    /// In-memory session, falling back to whatever storage holds.
    async fn current(&self) -> Option<Session> {
        let mut slot = self.session.lock().await;
        if !slot.loaded {
            slot.session = match self.storage.load() {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(error = %e, "could not read persisted session");
                    None
                }
            };
            slot.loaded = true;
        }
        slot.session.clone()
    }

    /// Row requests run as the signed-in user when there is one.
    async fn bearer(&self) -> String {
        match self.get_session().await {
            Ok(Some(session)) => session.access_token,
            _ => self.key.clone(),
        }
    }

    async fn adopt(&self, session: Session, kind: AuthEventKind) -> Session {
        let session = session.with_expiry_from(now());
        *self.session.lock().await = SessionSlot {
            loaded: true,
            session: Some(session.clone()),
        };
        if let Err(e) = self.storage.save(&session) {
            warn!(error = %e, "could not persist session");
        }
        let _ = self.events.send(AuthEvent {
            kind,
            session: Some(session.clone()),
        });
        session
    }

    async fn forget(&self) {
        *self.session.lock().await = SessionSlot {
            loaded: true,
            session: None,
        };
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "could not clear persisted session");
        }
        let _ = self.events.send(AuthEvent {
            kind: AuthEventKind::SignedOut,
            session: None,
        });
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let resp = self
            .request(Method::POST, &self.auth_url("/token"), &self.key)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(network)?;
        read_json(resp).await
    }
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.current().await else {
            return Ok(None);
        };
        if !session.is_expired_at(now()) {
            return Ok(Some(session));
        }

        debug!("session expired, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => Ok(Some(self.adopt(fresh, AuthEventKind::TokenRefreshed).await)),
            // The backend rejected the refresh token: the session is dead.
            Err(BackendError::Api { message, .. }) => {
                warn!(%message, "session refresh rejected");
                self.forget().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        let resp = self
            .request(Method::GET, &self.auth_url("/user"), &session.access_token)
            .send()
            .await
            .map_err(network)?;

        if matches!(
            resp.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(status = %resp.status(), "access token rejected, dropping session");
            self.forget().await;
            return Ok(None);
        }
        read_json(resp).await.map(Some)
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<SignUpResponse, BackendError> {
        let mut req = self
            .request(Method::POST, &self.auth_url("/signup"), &self.key)
            .json(credentials);
        if let Some(redirect) = redirect_to {
            req = req.query(&[("redirect_to", redirect)]);
        }
        let body: Value = read_json(req.send().await.map_err(network)?).await?;

        // With confirmation off the backend answers with a full session,
        // otherwise with the bare (unconfirmed) user.
        if body.get("access_token").is_some() {
            let session: Session = from_json(body)?;
            info!(user = %session.user.id, "account created");
            return Ok(SignUpResponse {
                user: Some(session.user.clone()),
                session: Some(session.with_expiry_from(now())),
            });
        }

        let user_json = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        let user: User = from_json(user_json)?;
        info!(user = %user.id, "account created, awaiting email confirmation");
        Ok(SignUpResponse {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError> {
        let resp = self
            .request(Method::POST, &self.auth_url("/token"), &self.key)
            .query(&[("grant_type", "password")])
            .json(credentials)
            .send()
            .await
            .map_err(network)?;
        let session: Session = read_json(resp).await?;
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.current().await {
            let resp = self
                .request(Method::POST, &self.auth_url("/logout"), &session.access_token)
                .send()
                .await
                .map_err(network)?;

            let status = resp.status();
            // Already-invalid tokens mean the session is over anyway.
            let gone = matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            );
            if !status.is_success() && !gone {
                let text = resp.text().await.unwrap_or_default();
                return Err(api_error(status, &text));
            }
        }
        self.forget().await;
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn select_single(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
    ) -> Result<Value, BackendError> {
        let bearer = self.bearer().await;
        let resp = self
            .request(Method::GET, &self.rest_url(table), &bearer)
            .header(ACCEPT, SINGLE_OBJECT)
            .query(&table_query(columns, filters, None))
            .send()
            .await
            .map_err(network)?;
        read_json(resp).await
    }

    async fn select(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, BackendError> {
        let bearer = self.bearer().await;
        let resp = self
            .request(Method::GET, &self.rest_url(table), &bearer)
            .query(&table_query(columns, filters, order))
            .send()
            .await
            .map_err(network)?;
        read_json(resp).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, BackendError> {
        let bearer = self.bearer().await;
        let resp = self
            .request(Method::POST, &self.rest_url(table), &bearer)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&row)
            .send()
            .await
            .map_err(network)?;
        read_json(resp).await
    }
}
