//! Application state.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::source::ImageFetcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub fetcher: ImageFetcher,
}

impl AppState {
    pub fn new(config: Config, engine: EngineHandle, fetcher: ImageFetcher) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            fetcher,
        }
    }
}
