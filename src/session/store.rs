//! In-memory session registry
//!
//! Sessions live until deleted or left idle past the configured timeout.
//! Each session sits behind its own async mutex, held for a whole cycle, so
//! cycles of one session never overlap.

use std::sync::Arc;

use mini_moka::sync::Cache;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatModel, SessionState};
use crate::config::{ChatConfig, OpenAiConfig, SessionConfig};

/// Shared handle to one session's state
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Idle-expiring map of session id to state
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, SessionHandle>,
    system_prompt: Arc<str>,
    default_model: ChatModel,
    default_api_key: Option<Arc<str>>,
}

impl SessionStore {
    /// Create a store with explicit defaults for new sessions
    #[must_use]
    pub fn new(config: &SessionConfig, system_prompt: &str, default_model: ChatModel) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(config.max_sessions)
                .time_to_idle(config.idle_timeout)
                .build(),
            system_prompt: Arc::from(system_prompt),
            default_model,
            default_api_key: None,
        }
    }

    /// Create a store from the service configuration
    #[must_use]
    pub fn from_config(session: &SessionConfig, chat: &ChatConfig, openai: &OpenAiConfig) -> Self {
        Self::new(session, &chat.system_prompt, chat.default_model)
            .with_default_api_key(openai.api_key.as_deref())
    }

    /// Seed new sessions with a process-level credential
    #[must_use]
    pub fn with_default_api_key(mut self, api_key: Option<&str>) -> Self {
        self.default_api_key = api_key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }

    /// Create a fresh session and return its id and handle
    pub fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let mut state = SessionState::new(&*self.system_prompt).with_model(self.default_model);
        if let Some(key) = &self.default_api_key {
            state.set_credential(key);
        }

        let handle = Arc::new(Mutex::new(state));
        self.sessions.insert(id, Arc::clone(&handle));
        tracing::info!(session = %id, "session created");
        (id, handle)
    }

    /// Look up a live session, refreshing its idle timer
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id)
    }

    /// Drop a session; returns whether it existed
    pub fn remove(&self, id: &Uuid) -> bool {
        let existed = self.sessions.get(id).is_some();
        self.sessions.invalidate(id);
        if existed {
            tracing::info!(session = %id, "session removed");
        }
        existed
    }

    /// Approximate number of live sessions
    #[must_use]
    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    /// Whether no sessions are live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(
            &SessionConfig {
                idle_timeout: Duration::from_secs(60),
                max_sessions: 16,
            },
            "prompt",
            ChatModel::Gpt4Turbo,
        )
    }

    #[tokio::test]
    async fn create_uses_defaults() {
        let store = store();
        let (id, handle) = store.create();

        let state = handle.lock().await;
        assert_eq!(state.system_prompt(), "prompt");
        assert_eq!(state.selected_model, ChatModel::Gpt4Turbo);
        assert!(!state.has_credential());
        drop(state);

        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn default_api_key_seeds_sessions() {
        let store = store().with_default_api_key(Some("sk-env"));
        let (_, handle) = store.create();

        assert_eq!(handle.lock().await.api_key(), "sk-env");
    }

    #[test]
    fn empty_default_api_key_is_ignored() {
        let store = store().with_default_api_key(Some(""));
        assert!(store.default_api_key.is_none());
    }

    #[test]
    fn remove_reports_existence() {
        let store = store();
        let (id, _) = store.create();

        assert!(store.remove(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.remove(&id));
    }

    #[test]
    fn sessions_are_independent() {
        let store = store();
        let (a, _) = store.create();
        let (b, _) = store.create();

        assert_ne!(a, b);
        assert!(!Arc::ptr_eq(&store.get(&a).unwrap(), &store.get(&b).unwrap()));
    }
}
