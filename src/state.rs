use gallery_backend::search::SearchEngine;

/// Shared application state / 应用共享状态
pub struct AppState {
    pub engine: SearchEngine,
}

impl AppState {
    pub fn new(engine: SearchEngine) -> Self {
        Self { engine }
    }
}
