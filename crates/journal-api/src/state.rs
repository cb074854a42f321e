//! Shared application state handed to every handler.

use std::sync::Arc;

use journal_db::StorageBackend;

use crate::services::{AudioConcatenator, IngestionOrchestrator};

/// Process-wide handles, constructed once at startup and read-shared by all
/// requests.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub concatenator: Arc<AudioConcatenator>,
    pub blobs: Arc<dyn StorageBackend>,
}
