use crate::core::backend::{Backend, BackendError, Filter, Order};
use crate::core::models::{ListRecord, MediaItem, MediaType};
use crate::core::session::SessionStore;
use crate::core::status::{Status, StatusTracker};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Favorites,
    Watchlist,
}

impl ListKind {
    pub fn table(self) -> &'static str {
        match self {
            ListKind::Favorites => "favorites",
            ListKind::Watchlist => "watchlist",
        }
    }
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(ListRecord),
    AlreadyExists(ListRecord),
}

impl AddOutcome {
    pub fn record(&self) -> &ListRecord {
        match self {
            AddOutcome::Added(r) | AddOutcome::AlreadyExists(r) => r,
        }
    }

    pub fn already_exists(&self) -> bool {
        matches!(self, AddOutcome::AlreadyExists(_))
    }
}

#[derive(Serialize)]
struct NewRecord<'a> {
    user_id: Uuid,
    movie_id: i64,
    movie_type: MediaType,
    title: &'a str,
    poster_path: Option<&'a str>,
}

/// Favorites and watchlist, scoped to the session's current user.
pub struct ListManager {
    backend: Arc<dyn Backend>,
    session: Arc<SessionStore>,
    status: StatusTracker<ListError>,
}

impl ListManager {
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionStore>) -> Self {
        Self {
            backend,
            session,
            status: StatusTracker::new(),
        }
    }

    pub async fn add_favorite(&self, item: &MediaItem) -> Result<AddOutcome, ListError> {
        self.add(ListKind::Favorites, item).await
    }

    pub async fn add_to_watchlist(&self, item: &MediaItem) -> Result<AddOutcome, ListError> {
        self.add(ListKind::Watchlist, item).await
    }

    pub async fn favorites(&self) -> Result<Vec<ListRecord>, ListError> {
        self.list(ListKind::Favorites).await
    }

    pub async fn watchlist(&self) -> Result<Vec<ListRecord>, ListError> {
        self.list(ListKind::Watchlist).await
    }

    /// Inserts `item` unless the user already has it in `kind`.
    pub async fn add(&self, kind: ListKind, item: &MediaItem) -> Result<AddOutcome, ListError> {
        let op = self.status.begin();
        let result = match self.session.user() {
            Some(user) => self.insert_if_absent(kind, user.id, item).await,
            None => Err(ListError::NotAuthenticated),
        };

        if let Err(e) = &result {
            error!(list = kind.table(), error = %e, "Error adding list item");
        }
        op.finish(result)
    }

    /// The user's records in `kind`, newest first.
    pub async fn list(&self, kind: ListKind) -> Result<Vec<ListRecord>, ListError> {
        let op = self.status.begin();
        let result = match self.session.user() {
            Some(user) => self.fetch_all(kind, user.id).await,
            None => Err(ListError::NotAuthenticated),
        };

        if let Err(e) = &result {
            error!(list = kind.table(), error = %e, "Error fetching list");
        }
        op.finish(result)
    }

    pub fn status(&self) -> Status<ListError> {
        self.status.snapshot()
    }

    pub fn loading(&self) -> bool {
        self.status.loading()
    }

    pub fn error(&self) -> Option<ListError> {
        self.status.error()
    }

    async fn insert_if_absent(
        &self,
        kind: ListKind,
        user_id: Uuid,
        item: &MediaItem,
    ) -> Result<AddOutcome, ListError> {
        let table = kind.table();
        let filters = [
            Filter::eq("user_id", user_id),
            Filter::eq("movie_id", item.movie_id),
            Filter::eq("movie_type", item.movie_type),
        ];

        match self.backend.select_single(table, "*", &filters).await {
            Ok(existing) => {
                debug!(table, movie_id = item.movie_id, "item already listed");
                return Ok(AddOutcome::AlreadyExists(parse_record(existing)?));
            }
            Err(BackendError::NoRows) => {}
            Err(e) => return Err(e.into()),
        }

        let row = serde_json::to_value(NewRecord {
            user_id,
            movie_id: item.movie_id,
            movie_type: item.movie_type,
            title: &item.title,
            poster_path: item.poster_path.as_deref(),
        })
        .map_err(|e| BackendError::Parse(e.to_string()))?;

        let inserted = self
            .backend
            .insert(table, row)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Parse("insert returned no rows".into()))?;

        Ok(AddOutcome::Added(parse_record(inserted)?))
    }

    async fn fetch_all(&self, kind: ListKind, user_id: Uuid) -> Result<Vec<ListRecord>, ListError> {
        let rows = self
            .backend
            .select(
                kind.table(),
                "*",
                &[Filter::eq("user_id", user_id)],
                Some(&Order::desc("created_at")),
            )
            .await?;

        rows.into_iter().map(parse_record).collect()
    }
}

fn parse_record(row: Value) -> Result<ListRecord, ListError> {
    serde_json::from_value(row).map_err(|e| BackendError::Parse(e.to_string()).into())
}
