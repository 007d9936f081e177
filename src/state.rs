use std::sync::Arc;

use crate::gateway::registry::Registry;
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub stores: Stores,
}

impl AppState {
    pub fn new(stores: Stores) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            stores,
        }
    }
}
