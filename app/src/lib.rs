pub mod core;
pub mod infra;
