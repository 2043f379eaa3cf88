use axum::extract::FromRef;

use crate::identify::IdentifyManager;
use std::sync::Arc;
use std::time::Instant;

pub type GuardedIdentifyManager = Arc<IdentifyManager>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub manager: GuardedIdentifyManager,
}

impl ServerState {
    pub fn new(manager: GuardedIdentifyManager) -> Self {
        Self {
            start_time: Instant::now(),
            manager,
        }
    }
}

impl FromRef<ServerState> for GuardedIdentifyManager {
    fn from_ref(input: &ServerState) -> Self {
        input.manager.clone()
    }
}
