use crate::core::catalog::{
    CatalogError, CatalogProvider, MovieDetails, MovieSummary, TimeWindow, TvDetails, TvSummary,
};
use crate::core::status::{Status, StatusTracker};
use std::sync::Arc;
use tracing::error;

/// Catalog reads with shared loading/error tracking. Failures never
/// escape: listings come back empty and details come back `None`, with
/// the error left in [`MetadataClient::error`].
pub struct MetadataClient {
    provider: Arc<dyn CatalogProvider>,
    status: StatusTracker<CatalogError>,
}

impl MetadataClient {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self {
            provider,
            status: StatusTracker::new(),
        }
    }

    pub async fn trending_movies(&self, window: TimeWindow, page: u32) -> Vec<MovieSummary> {
        let op = self.status.begin();
        match self.provider.trending_movies(window, page).await {
            Ok(results) => results,
            Err(e) => {
                error!(provider = self.provider.name(), error = %e, "Error fetching trending movies");
                op.fail(&e);
                Vec::new()
            }
        }
    }

    pub async fn trending_tv(&self, window: TimeWindow, page: u32) -> Vec<TvSummary> {
        let op = self.status.begin();
        match self.provider.trending_tv(window, page).await {
            Ok(results) => results,
            Err(e) => {
                error!(provider = self.provider.name(), error = %e, "Error fetching trending TV shows");
                op.fail(&e);
                Vec::new()
            }
        }
    }

    pub async fn movie_details(&self, id: i64) -> Option<MovieDetails> {
        let op = self.status.begin();
        match self.provider.movie_details(id).await {
            Ok(details) => Some(details),
            Err(e) => {
                error!(provider = self.provider.name(), id, error = %e, "Error fetching movie details");
                op.fail(&e);
                None
            }
        }
    }

    pub async fn tv_details(&self, id: i64) -> Option<TvDetails> {
        let op = self.status.begin();
        match self.provider.tv_details(id).await {
            Ok(details) => Some(details),
            Err(e) => {
                error!(provider = self.provider.name(), id, error = %e, "Error fetching TV show details");
                op.fail(&e);
                None
            }
        }
    }

    pub fn status(&self) -> Status<CatalogError> {
        self.status.snapshot()
    }

    pub fn loading(&self) -> bool {
        self.status.loading()
    }

    pub fn error(&self) -> Option<CatalogError> {
        self.status.error()
    }
}
