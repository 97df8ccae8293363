//! Offline cache controller.
//!
//! Sits between client views and the application origin. Once active it
//! answers every same-origin `GET`: page loads go to the network and fall back
//! to the cached shell, API calls fall back to a synthesized `503`, and
//! everything else is served cache-first.
//!
//! Lifecycle: `Uninstalled -> Installing -> Installed -> Activating -> Active`.

mod cache;
mod fetch;
mod request;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Url;
use serde::Serialize;
use thiserror::Error;

pub use cache::CacheStorage;
pub use fetch::{Fetcher, HttpFetcher, NetworkError};
pub use request::{Destination, Request, RequestMode, Response, Route, cache_key, classify};

/// Page served for failed navigations when no shell is cached.
pub const OFFLINE_PAGE: &str = include_str!("offline.html");

/// Body of the plain-text fallback for uncached subresources.
pub const OFFLINE_TEXT: &str = "Offline - Resource unavailable";

/// Status of every synthesized offline response.
pub const OFFLINE_STATUS: u16 = 503;

/// JSON body returned for API calls that cannot reach the network.
#[must_use]
pub fn offline_api_body() -> serde_json::Value {
    serde_json::json!({
        "error": "Offline - API unavailable",
        "message": "BeastMode is currently offline. Please check your connection.",
        "offline": true,
    })
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    #[default]
    Uninstalled,
    Installing,
    /// Installed and waiting to take over.
    Installed,
    Activating,
    /// Intercepting requests.
    Active,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
        })
    }
}

/// Lifecycle transition attempted from the wrong state.
#[derive(Debug, Error)]
#[error("cannot {action} while {state}")]
pub struct LifecycleError {
    pub action: &'static str,
    pub state: ControllerState,
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Tag of the generation this controller installs and serves.
    pub generation: String,
    /// Application origin requests are matched against.
    pub origin: Url,
    /// Paths cached at install.
    pub manifest: Vec<String>,
    /// Cached page served when navigation fails and `/` is not cached.
    pub offline_path: String,
    /// Path fragment identifying API calls.
    pub api_prefix: String,
    /// Cached image served when an image cannot be fetched.
    pub placeholder_icon: String,
}

/// Messages client views send to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Activate an installed generation without waiting.
    SkipWaiting,
}

impl FromStr for ClientMessage {
    type Err = String;

    /// Parse the message `type` field.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SKIP_WAITING" => Ok(Self::SkipWaiting),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}

/// Result of an install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub generation: String,
    /// Manifest paths now cached.
    pub cached: Vec<String>,
    /// Manifest paths that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl InstallReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Result of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub generation: String,
    /// Generations that were purged.
    pub deleted: Vec<String>,
    /// Whether open client views are now controlled.
    pub claimed: bool,
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the request goes to the network untouched.
    Bypass,
    /// Answer with this response.
    Respond(Response),
}

/// Lifecycle events delivered by the host.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(ClientMessage),
}

/// Outcome of a dispatched [`LifecycleEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    /// The message was handled; holds the activation it triggered, if any.
    Acknowledged(Option<ActivateReport>),
}

/// Versioned offline cache in front of the application origin.
pub struct CacheController {
    config: ControllerConfig,
    cache: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<ControllerState>,
    skip_waiting: AtomicBool,
}

impl CacheController {
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        cache: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            cache,
            fetcher,
            state: RwLock::new(ControllerState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    /// Whether activation was requested without waiting.
    #[must_use]
    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    fn transition(
        &self,
        from: &[ControllerState],
        to: ControllerState,
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        if !from.contains(&*state) {
            return Err(LifecycleError { action, state: *state });
        }
        tracing::debug!(from = %*state, to = %to, "controller transition");
        *state = to;
        Ok(())
    }

    /// Fetch every manifest path into the current generation.
    ///
    /// Paths that fail or return a non-success status are skipped. A complete
    /// install also requests activation without waiting.
    ///
    /// # Errors
    ///
    /// Returns error unless the controller is uninstalled or already installed.
    pub async fn install(&self) -> Result<InstallReport, LifecycleError> {
        self.transition(
            &[ControllerState::Uninstalled, ControllerState::Installed],
            ControllerState::Installing,
            "install",
        )?;
        let generation = &self.config.generation;
        tracing::info!(generation = %generation, entries = self.config.manifest.len(), "installing");

        let fetches = self.config.manifest.iter().map(|path| async move {
            let url = self
                .config
                .origin
                .join(path)
                .map_err(|e| format!("invalid path: {e}"))?;
            let response = self
                .fetcher
                .fetch(&Request::get(url.clone()))
                .await
                .map_err(|e| e.to_string())?;
            if !response.is_success() {
                return Err(format!("status {}", response.status));
            }
            Ok((url, response))
        });
        let results = join_all(fetches).await;

        let mut report = InstallReport {
            generation: generation.clone(),
            ..InstallReport::default()
        };
        for (path, result) in self.config.manifest.iter().zip(results) {
            match result {
                Ok((url, response)) => {
                    self.cache.put(generation, &cache_key(&url), response);
                    report.cached.push(path.clone());
                }
                Err(reason) => {
                    tracing::warn!(generation = %generation, path = %path, reason = %reason, "skipping manifest entry");
                    report.skipped.push((path.clone(), reason));
                }
            }
        }

        if report.is_complete() {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }
        *self.state.write() = ControllerState::Installed;
        tracing::info!(
            generation = %generation,
            cached = report.cached.len(),
            skipped = report.skipped.len(),
            "install finished"
        );
        Ok(report)
    }

    /// Purge every other generation and start intercepting.
    ///
    /// # Errors
    ///
    /// Returns error unless the controller is installed.
    pub fn activate(&self) -> Result<ActivateReport, LifecycleError> {
        self.transition(
            &[ControllerState::Installed],
            ControllerState::Activating,
            "activate",
        )?;
        let generation = &self.config.generation;

        let mut deleted = Vec::new();
        for tag in self.cache.generations() {
            if tag != *generation && self.cache.delete(&tag) {
                tracing::info!(generation = %tag, "deleted old generation");
                deleted.push(tag);
            }
        }

        *self.state.write() = ControllerState::Active;
        tracing::info!(generation = %generation, "activated, clients claimed");
        Ok(ActivateReport {
            generation: generation.clone(),
            deleted,
            claimed: true,
        })
    }

    /// Handle a message from a client view.
    ///
    /// `SKIP_WAITING` activates an installed generation immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the triggered activation fails.
    pub fn handle_message(
        &self,
        message: ClientMessage,
    ) -> Result<Option<ActivateReport>, LifecycleError> {
        match message {
            ClientMessage::SkipWaiting => {
                tracing::info!("skip waiting requested");
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state() == ControllerState::Installed {
                    return self.activate().map(Some);
                }
                Ok(None)
            }
        }
    }

    /// Decide how to answer a request.
    ///
    /// Until the controller is active every request is bypassed.
    pub async fn intercept(&self, request: &Request) -> FetchOutcome {
        if self.state() != ControllerState::Active {
            return FetchOutcome::Bypass;
        }

        match classify(request, &self.config.origin, &self.config.api_prefix) {
            Route::Bypass => FetchOutcome::Bypass,
            Route::Navigation => FetchOutcome::Respond(self.navigate(request).await),
            Route::Api => FetchOutcome::Respond(self.api(request).await),
            Route::Asset => FetchOutcome::Respond(self.asset(request).await),
        }
    }

    /// Send a request to the network without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns error if the network cannot produce a response.
    pub async fn pass_through(&self, request: &Request) -> Result<Response, NetworkError> {
        self.fetcher.fetch(request).await
    }

    /// Route a lifecycle event to its handler.
    ///
    /// # Errors
    ///
    /// Returns error if the event is not valid in the current state.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome, LifecycleError> {
        match event {
            LifecycleEvent::Install => self.install().await.map(EventOutcome::Installed),
            LifecycleEvent::Activate => self.activate().map(EventOutcome::Activated),
            LifecycleEvent::Fetch(request) => {
                Ok(EventOutcome::Fetched(self.intercept(&request).await))
            }
            LifecycleEvent::Message(message) => {
                self.handle_message(message).map(EventOutcome::Acknowledged)
            }
        }
    }

    /// Cached response for a same-origin path in the current generation.
    fn cached_path(&self, path: &str) -> Option<Response> {
        let url = self.config.origin.join(path).ok()?;
        self.cache.get(&self.config.generation, &cache_key(&url))
    }

    async fn navigate(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(url = %request.url, error = %e, "navigation offline, serving cached shell");
                self.cached_path("/")
                    .or_else(|| self.cached_path(&self.config.offline_path))
                    .unwrap_or_else(|| Response::html(OFFLINE_STATUS, OFFLINE_PAGE))
            }
        }
    }

    async fn api(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(url = %request.url, error = %e, "api offline");
                Response::json(OFFLINE_STATUS, &offline_api_body())
            }
        }
    }

    async fn asset(&self, request: &Request) -> Response {
        let generation = &self.config.generation;
        let key = request.cache_key();
        if let Some(hit) = self.cache.get(generation, &key) {
            tracing::trace!(url = %request.url, "cache hit");
            return hit;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.cache.put(generation, &key, response.clone());
                }
                response
            }
            Err(e) => {
                tracing::info!(url = %request.url, error = %e, "asset offline");
                let placeholder = if request.destination == Destination::Image {
                    self.cached_path(&self.config.placeholder_icon)
                } else {
                    None
                };
                placeholder.unwrap_or_else(|| Response::text(OFFLINE_STATUS, OFFLINE_TEXT))
            }
        }
    }
}
