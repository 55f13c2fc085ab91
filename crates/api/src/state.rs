use std::sync::Arc;

use gateway::SessionManager;

/// Shared application state available to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}
