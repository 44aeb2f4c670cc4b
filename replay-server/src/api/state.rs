use std::sync::Arc;

use crate::cache::FrameCache;
use crate::session::load::{LoadOptions, SessionProvider};
use crate::session::registry::SessionRegistry;

/// Shared application state available to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions, keyed by `(year, round, session_type)`.
    pub registry: Arc<SessionRegistry>,
    /// Opens a telemetry source for a session key.
    pub provider: Arc<dyn SessionProvider>,
    /// On-disk cache of processed sessions.
    pub cache: Arc<FrameCache>,
    /// Load timeout and pre-encoding limit.
    pub load_options: LoadOptions,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn SessionProvider>,
        cache: Arc<FrameCache>,
        load_options: LoadOptions,
    ) -> Self {
        Self {
            registry,
            provider,
            cache,
            load_options,
        }
    }
}
