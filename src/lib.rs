//! Library lending server
//!
//! Users request loans of books, administrators approve, decline or close
//! them. Loans, book counters and per-user loan indexes are kept consistent
//! on top of a plain key-value store.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn repository::kv::KeyValueStore>) -> Self {
        let services = services::Services::new(store, &config.loans);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
