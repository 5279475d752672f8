//! Runtime configuration read from environment variables.

use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SESSION_FILE: &str = "data/session.json";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TmdbConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    /// `None` disables catalog browsing.
    pub tmdb: Option<TmdbConfig>,
    pub port: u16,
    pub app_origin: String,
    pub session_file: PathBuf,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Required: `SUPABASE_URL`, `SUPABASE_KEY`.
    /// Optional: `TMDB_API_KEY`, `TMDB_BASE_URL`, `PORT`, `APP_ORIGIN`, `SESSION_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let supabase_url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "SUPABASE_URL",
                reason: format!("expected an http(s) URL, got {supabase_url:?}"),
            });
        }
        let supabase_key = get("SUPABASE_KEY").ok_or(ConfigError::Missing("SUPABASE_KEY"))?;

        let tmdb = get("TMDB_API_KEY").map(|api_key| TmdbConfig {
            api_key,
            base_url: get("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_TMDB_BASE_URL.into()),
        });

        let port = match get("PORT") {
            Some(p) => p.parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let app_origin = get("APP_ORIGIN").unwrap_or_else(|| format!("http://localhost:{port}"));
        let session_file = get("SESSION_FILE")
            .unwrap_or_else(|| DEFAULT_SESSION_FILE.into())
            .into();

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_key,
            tmdb,
            port,
            app_origin: app_origin.trim_end_matches('/').to_string(),
            session_file,
        })
    }

    /// Where confirmation emails send new accounts.
    pub fn email_redirect_to(&self) -> String {
        format!("{}/login", self.app_origin)
    }

    /// Logs what is configured without leaking secrets.
    pub fn log_summary(&self) {
        let url: String = self.supabase_url.chars().take(20).collect();
        info!(
            url = %format!("{url}..."),
            key = "exists (hidden)",
            catalog = self.tmdb.is_some(),
            port = self.port,
            "Using Supabase config"
        );
    }
}
