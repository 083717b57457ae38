//! Application state for the API server

use crate::{Config, ZipperService};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the service facade and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The service facade the handlers delegate to
    pub service: Arc<ZipperService>,

    /// Configuration (read access)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<ZipperService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}
