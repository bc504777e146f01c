use std::sync::Arc;

use application::NodeService;

#[derive(Clone)]
pub struct AppState {
    pub node_service: Arc<NodeService>,
}

impl AppState {
    pub fn new(node_service: Arc<NodeService>) -> Self {
        Self { node_service }
    }
}
