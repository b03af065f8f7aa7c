use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::correlator::Correlator;
use crate::events::EventBus;
use crate::logs::LogBuffer;
use crate::session::PeerSession;

/// The project this bridge serves. One bridge per project.
pub struct ProjectContext {
    pub id: String,
    pub root: PathBuf,
}

/// Shared application state, cloneable via Arc internals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub project: Arc<ProjectContext>,
    pub session: Arc<PeerSession>,
    pub correlator: Arc<Correlator>,
    pub events: EventBus,
    pub logs: Arc<LogBuffer>,
}

impl AppState {
    pub fn new(config: BridgeConfig, project_id: String, project_root: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            project: Arc::new(ProjectContext {
                id: project_id,
                root: project_root,
            }),
            session: Arc::new(PeerSession::new()),
            correlator: Arc::new(Correlator::new()),
            events: EventBus::new(),
            logs: Arc::new(LogBuffer::new()),
        }
    }
}
