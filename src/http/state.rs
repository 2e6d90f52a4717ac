use crate::config::Config;
use crate::recognition::RecognitionBackend;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Process-wide recognition backend; holds configuration only
    pub backend: Arc<dyn RecognitionBackend>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}
