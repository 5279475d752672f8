pub mod app;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod guard;
pub mod lists;
pub mod metadata;
pub mod models;
pub mod session;
pub mod status;
pub mod storage;

#[cfg(test)]
pub(crate) mod fake;
