use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sessions are treated as expired this many seconds before `expires_at`.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// Identity owned by the backend. Only ever built from backend responses.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(at) => at - EXPIRY_MARGIN_SECS <= now,
            None => false,
        }
    }

    /// Fills `expires_at` from `expires_in` when the backend omitted it.
    pub fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now + secs);
        }
        self
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a catalog entry, copied verbatim into list records.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub movie_id: i64,
    pub movie_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// Row ids are whatever the table declares: bigint or uuid/text.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{i}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// A favorites or watchlist row. Reads the table's snake_case columns,
/// writes camelCase for API consumers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub id: RecordId,
    #[serde(alias = "user_id")]
    pub user_id: Uuid,
    #[serde(alias = "movie_id")]
    pub movie_id: i64,
    #[serde(alias = "movie_type")]
    pub movie_type: MediaType,
    pub title: String,
    #[serde(default, alias = "poster_path")]
    pub poster_path: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
}
