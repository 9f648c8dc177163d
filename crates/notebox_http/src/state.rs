//! Shared router state.

use std::sync::Arc;

use crate::{config::AppConfig, store::NoteStore};

#[derive(Clone)]
pub struct AppState {
    pub store: NoteStore,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: NoteStore, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}
