pub mod bot;
pub mod config;
pub mod matching;
pub mod models;
pub mod profile;
pub mod routes;
pub mod schema;
pub mod session;
pub mod store;
pub mod transport;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::matching::Matcher;
use crate::profile::ProfileWizard;
use crate::session::SessionManager;
use crate::store::{ProfileStore, SessionStore};
use crate::transport::Transport;

pub struct AppState {
    pub config: AppConfig,
    pub profiles: Arc<dyn ProfileStore>,
    pub wizard: ProfileWizard,
    pub matcher: Matcher,
    pub sessions: Arc<SessionManager>,
    pub transport: Arc<dyn Transport>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        profiles: Arc<dyn ProfileStore>,
        sessions: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let wizard = ProfileWizard::new(profiles.clone());
        let matcher = Matcher::new(profiles.clone(), config.max_search_results);
        let max_message_length = config.max_message_length.min(bot::messages::relay_capacity());
        let sessions = Arc::new(SessionManager::new(sessions, max_message_length));
        Self {
            config,
            profiles,
            wizard,
            matcher,
            sessions,
            transport,
            metrics_handle,
        }
    }
}
