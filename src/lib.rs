pub mod api;
pub mod auth;
pub mod blog;
pub mod config;
pub mod hitcount;
pub mod models;
pub mod request;
pub mod storage;
