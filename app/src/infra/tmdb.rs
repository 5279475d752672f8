use crate::core::catalog::{
    CatalogError, CatalogProvider, MovieDetails, MovieSummary, TimeWindow, TvDetails, TvSummary,
};
use crate::core::config::TmdbConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize)]
struct PagedResponse<T> {
    results: Vec<T>,
}

// ── Client ───────────────────────────────────────────────────────

pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &TmdbConfig) -> Self {
        Self::new(&config.api_key, &config.base_url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        page: Option<u32>,
    ) -> Result<T, CatalogError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, ?page, "catalog request");

        let mut req = self.client.get(&url).query(&[("api_key", &self.api_key)]);
        if let Some(page) = page {
            req = req.query(&[("page", page)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CatalogError::Status(resp.status().as_u16()));
        }
        resp.json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CatalogProvider for TmdbClient {
    fn name(&self) -> &str {
        "TMDB"
    }

    async fn trending_movies(
        &self,
        window: TimeWindow,
        page: u32,
    ) -> Result<Vec<MovieSummary>, CatalogError> {
        let path = format!("/trending/movie/{}", window.as_str());
        let resp: PagedResponse<MovieSummary> = self.get(&path, Some(page)).await?;
        Ok(resp.results)
    }

    async fn trending_tv(
        &self,
        window: TimeWindow,
        page: u32,
    ) -> Result<Vec<TvSummary>, CatalogError> {
        let path = format!("/trending/tv/{}", window.as_str());
        let resp: PagedResponse<TvSummary> = self.get(&path, Some(page)).await?;
        Ok(resp.results)
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails, CatalogError> {
        self.get(&format!("/movie/{id}"), None).await
    }

    async fn tv_details(&self, id: i64) -> Result<TvDetails, CatalogError> {
        self.get(&format!("/tv/{id}"), None).await
    }
}
