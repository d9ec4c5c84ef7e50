//! Shared application state.

use crate::adapter::HookAdapter;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub adapter: HookAdapter,
}

impl AppState {
    pub fn new(adapter: HookAdapter) -> Self {
        Self { adapter }
    }
}
