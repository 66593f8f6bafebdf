//! glimpsed — HTTP daemon serving CLIP embeddings, similarity and
//! human presence detection.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod source;
pub mod state;

pub use config::{Config, ConfigError};
pub use engine::{spawn_engine, ClipBackend, EngineError, EngineHandle};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use source::{ImageFetcher, ImageSource, SourceError};
pub use state::AppState;
