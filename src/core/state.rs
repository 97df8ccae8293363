//! Application state owner.
//!
//! [`StateStore`] holds agents, settings and theme in memory and writes the
//! corresponding blob back through a [`BlobStore`] after every mutation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use agent_core::{Credential, ModelId};

use super::agent::Agent;
use super::storage::{BlobStore, read_json, write_json};
use super::{Error, Result};

/// Blob holding every agent.
pub const AGENTS_BLOB: &str = "agents";
/// Blob holding [`Settings`].
pub const SETTINGS_BLOB: &str = "settings";
/// Blob holding the [`Theme`].
pub const THEME_BLOB: &str = "theme";

/// User settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Stored API key (lowest-priority credential source).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model preselected for new agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<ModelId>,
}

impl Settings {
    /// Stored credential, if any.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.api_key.clone().and_then(Credential::new)
    }

    /// Chosen model, or `fallback` if none was chosen.
    #[must_use]
    pub fn model_or(&self, fallback: ModelId) -> ModelId {
        self.default_model.unwrap_or(fallback)
    }
}

/// Display theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Dark => "dark",
            Self::Light => "light",
        })
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(Error::Config(format!("unknown theme '{other}'"))),
        }
    }
}

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    settings: Settings,
    theme: Theme,
}

/// In-memory owner of persisted application state.
pub struct StateStore {
    store: Arc<dyn BlobStore>,
    state: Mutex<State>,
}

/// Read a blob, falling back to the default when it is missing or unreadable.
fn load_or_default<T>(store: &dyn BlobStore, name: &str) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    match read_json(store, name) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(blob = name, error = %e, "discarding unreadable blob");
            T::default()
        }
    }
}

impl StateStore {
    /// Load state from a blob store.
    #[must_use]
    pub fn load(store: Arc<dyn BlobStore>) -> Self {
        let state = State {
            agents: load_or_default(&*store, AGENTS_BLOB),
            settings: load_or_default(&*store, SETTINGS_BLOB),
            theme: load_or_default(&*store, THEME_BLOB),
        };
        tracing::debug!(agents = state.agents.len(), "state loaded");

        Self {
            store,
            state: Mutex::new(state),
        }
    }

    /// All agents, newest first.
    #[must_use]
    pub fn agents(&self) -> Vec<Agent> {
        self.state.lock().agents.clone()
    }

    /// Snapshot of one agent.
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.state.lock().agents.iter().find(|a| a.id == id).cloned()
    }

    /// Snapshot of one agent, or [`Error::AgentNotFound`].
    ///
    /// # Errors
    ///
    /// Returns error if no agent has this ID.
    pub fn require_agent(&self, id: &str) -> Result<Agent> {
        self.agent(id)
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))
    }

    /// Add an agent at the front of the list.
    ///
    /// # Errors
    ///
    /// Returns error if the agents blob cannot be written.
    pub fn insert_agent(&self, agent: Agent) -> Result<()> {
        let mut state = self.state.lock();
        state.agents.insert(0, agent);
        write_json(&*self.store, AGENTS_BLOB, &state.agents)?;
        Ok(())
    }

    /// Remove an agent. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the agents blob cannot be written.
    pub fn remove_agent(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.agents.len();
        state.agents.retain(|a| a.id != id);
        if state.agents.len() == before {
            return Ok(false);
        }
        write_json(&*self.store, AGENTS_BLOB, &state.agents)?;
        Ok(true)
    }

    /// Mutate an agent in place and persist the agents blob.
    ///
    /// Returns `None` without writing anything if the agent no longer exists.
    ///
    /// # Errors
    ///
    /// Returns error if the agents blob cannot be written.
    pub fn update_agent<F, T>(&self, id: &str, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Agent) -> T,
    {
        let mut state = self.state.lock();
        let Some(agent) = state.agents.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        let out = f(agent);
        write_json(&*self.store, AGENTS_BLOB, &state.agents)?;
        Ok(Some(out))
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    /// Replace settings.
    ///
    /// # Errors
    ///
    /// Returns error if the settings blob cannot be written.
    pub fn set_settings(&self, settings: Settings) -> Result<()> {
        let mut state = self.state.lock();
        write_json(&*self.store, SETTINGS_BLOB, &settings)?;
        state.settings = settings;
        Ok(())
    }

    /// Current theme.
    #[must_use]
    pub fn theme(&self) -> Theme {
        self.state.lock().theme
    }

    /// Replace the theme.
    ///
    /// # Errors
    ///
    /// Returns error if the theme blob cannot be written.
    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        let mut state = self.state.lock();
        write_json(&*self.store, THEME_BLOB, &theme)?;
        state.theme = theme;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentStatus;
    use crate::core::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, StateStore) {
        let blobs = Arc::new(MemoryStorage::new());
        let state = StateStore::load(blobs.clone());
        (blobs, state)
    }

    #[test]
    fn empty_store_uses_defaults() {
        let (_, state) = store();
        assert!(state.agents().is_empty());
        assert_eq!(state.settings(), Settings::default());
        assert_eq!(state.theme(), Theme::Dark);
    }

    #[test]
    fn agents_survive_reload() {
        let (blobs, state) = store();
        let agent = Agent::new("write a song", ModelId::Mistral7b).unwrap();
        let id = agent.id.clone();
        state.insert_agent(agent).unwrap();

        let reloaded = StateStore::load(blobs);
        assert_eq!(reloaded.require_agent(&id).unwrap().model, ModelId::Mistral7b);
    }

    #[test]
    fn newest_agent_first() {
        let (_, state) = store();
        let first = Agent::new("one", ModelId::default()).unwrap();
        let second = Agent::new("two", ModelId::default()).unwrap();
        state.insert_agent(first).unwrap();
        state.insert_agent(second).unwrap();
        assert_eq!(state.agents()[0].goal, "two");
    }

    #[test]
    fn update_missing_agent_writes_nothing() {
        let (blobs, state) = store();
        let result = state
            .update_agent("agt_missing", |a| a.status = AgentStatus::Running)
            .unwrap();
        assert!(result.is_none());
        assert!(blobs.get(AGENTS_BLOB).unwrap().is_none());
    }

    #[test]
    fn removing_last_agent_is_persisted() {
        let (blobs, state) = store();
        let agent = Agent::new("one", ModelId::default()).unwrap();
        let id = agent.id.clone();
        state.insert_agent(agent).unwrap();
        assert!(state.remove_agent(&id).unwrap());
        assert!(!state.remove_agent(&id).unwrap());
        assert_eq!(blobs.get(AGENTS_BLOB).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn corrupt_blob_falls_back() {
        let blobs = Arc::new(MemoryStorage::new());
        blobs.set(THEME_BLOB, "not json").unwrap();
        let state = StateStore::load(blobs);
        assert_eq!(state.theme(), Theme::Dark);
    }

    #[test]
    fn settings_credential_ignores_blank_key() {
        let settings = Settings {
            api_key: Some("  ".to_string()),
            ..Settings::default()
        };
        assert!(settings.credential().is_none());
    }

    #[test]
    fn settings_model_falls_back() {
        let mut settings = Settings::default();
        assert_eq!(settings.model_or(ModelId::GeminiFlash), ModelId::GeminiFlash);
        settings.default_model = Some(ModelId::Phi3Mini);
        assert_eq!(settings.model_or(ModelId::GeminiFlash), ModelId::Phi3Mini);

        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"default_model":"phi-3-mini"}"#);
    }

    #[test]
    fn theme_parsing() {
        assert_eq!("Light".parse::<Theme>().unwrap(), Theme::Light);
        assert!("sepia".parse::<Theme>().is_err());
    }
}
