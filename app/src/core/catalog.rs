use crate::core::models::{MediaItem, MediaType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MovieSummary {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TvSummary {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MovieDetails {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub imdb_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TvDetails {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub last_air_date: Option<String>,
    #[serde(default)]
    pub number_of_seasons: Option<u32>,
    #[serde(default)]
    pub number_of_episodes: Option<u32>,
    #[serde(default)]
    pub episode_run_time: Vec<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

pub fn poster_url(path: Option<&str>) -> Option<String> {
    path.map(|p| format!("{POSTER_BASE}{p}"))
}

impl MovieSummary {
    pub fn to_media_item(&self) -> MediaItem {
        MediaItem {
            movie_id: self.id,
            movie_type: MediaType::Movie,
            title: self.title.clone(),
            poster_path: self.poster_path.clone(),
        }
    }
}

impl TvSummary {
    pub fn to_media_item(&self) -> MediaItem {
        MediaItem {
            movie_id: self.id,
            movie_type: MediaType::Tv,
            title: self.name.clone(),
            poster_path: self.poster_path.clone(),
        }
    }
}

impl MovieDetails {
    pub fn to_media_item(&self) -> MediaItem {
        MediaItem {
            movie_id: self.id,
            movie_type: MediaType::Movie,
            title: self.title.clone(),
            poster_path: self.poster_path.clone(),
        }
    }
}

impl TvDetails {
    pub fn to_media_item(&self) -> MediaItem {
        MediaItem {
            movie_id: self.id,
            movie_type: MediaType::Tv,
            title: self.name.clone(),
            poster_path: self.poster_path.clone(),
        }
    }
}

/// Read-only movie/TV catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn trending_movies(
        &self,
        window: TimeWindow,
        page: u32,
    ) -> Result<Vec<MovieSummary>, CatalogError>;

    async fn trending_tv(&self, window: TimeWindow, page: u32)
    -> Result<Vec<TvSummary>, CatalogError>;

    async fn movie_details(&self, id: i64) -> Result<MovieDetails, CatalogError>;

    async fn tv_details(&self, id: i64) -> Result<TvDetails, CatalogError>;
}
