pub mod session_file;
pub mod supabase;
pub mod tmdb;
pub mod web;
