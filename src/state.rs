use std::sync::Arc;

use crate::gallery::GalleryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gallery: Arc<GalleryService>,
}

impl AppState {
    pub fn new(gallery: GalleryService) -> Self {
        Self {
            gallery: Arc::new(gallery),
        }
    }
}
