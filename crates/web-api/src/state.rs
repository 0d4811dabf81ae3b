use std::sync::Arc;

use config::RealtimeConfig;
use infrastructure::{Collaborators, Hub};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub collaborators: Collaborators,
    pub realtime: RealtimeConfig,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, collaborators: Collaborators, realtime: RealtimeConfig) -> Self {
        Self {
            hub,
            collaborators,
            realtime,
        }
    }
}
