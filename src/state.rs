use std::sync::Arc;
use std::time::Instant;

use crate::classifier;
use crate::config::Config;
use crate::device;
use crate::history::MoodHistory;
use crate::session::{SessionManager, SessionSettings};

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionManager>,
    config: Arc<Config>,
    started_at: Instant,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, config: &Config) -> Self {
        Self {
            sessions,
            config: Arc::new(config.clone()),
            started_at: Instant::now(),
        }
    }

    /// Wires the configured device and classifier backends into a fresh manager.
    pub fn from_config(config: &Config) -> Self {
        let sessions = Arc::new(SessionManager::new(
            device::from_config(&config.capture.device),
            classifier::from_config(&config.classifier),
            Arc::new(MoodHistory::new()),
            SessionSettings::from_config(config),
        ));
        Self::new(sessions, config)
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn history(&self) -> &MoodHistory {
        self.sessions.history()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_state_is_idle_and_neutral() {
        let state = AppState::from_config(&Config::from_env());

        assert!(!state.sessions().is_running());
        assert_eq!(state.history().current_emotion().await, "Neutral");
        assert!(state.history().is_empty().await);
    }

    #[tokio::test]
    async fn clones_share_one_session_manager() {
        let state = AppState::from_config(&Config::from_env());
        let clone = state.clone();

        clone.history().record("happy").await;
        assert_eq!(state.history().current_emotion().await, "happy");
        assert!(Arc::ptr_eq(state.sessions(), clone.sessions()));
    }
}
