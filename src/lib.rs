pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod mirror;
pub mod models;
pub mod observability;
pub mod profile;
pub mod state;
pub mod store;
