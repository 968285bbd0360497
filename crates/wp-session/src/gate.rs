//! Session gate: decides whether protected portal content may render.
//!
//! ```text
//! Checking ──link token──▶ Linking ──bridged──▶ Ready
//!    │                        └──failed──▶ Error(reason)
//!    ├──stored session──▶ Ready
//!    └──nothing──▶ Error(MISSING_SESSION_MESSAGE)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::bridge::SessionBridge;
use crate::location::{PageLocation, extract_link_token};
use crate::store::TokenStore;

/// Shown when the portal is opened without a link and without a session
pub const MISSING_SESSION_MESSAGE: &str = "No active wallet session. Open the wallet portal from the companion app or use a valid wallet link.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Checking,
    Linking,
    Ready,
    Error(String),
}

impl GateState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Access to the page location
pub trait Navigator: Send + Sync {
    fn location(&self) -> PageLocation;

    /// Replace the current location without reloading the page
    fn replace(&self, location: &PageLocation);
}

/// Navigator holding the location in memory
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    current: RwLock<PageLocation>,
    replacements: AtomicU64,
}

impl MemoryNavigator {
    pub fn new(location: PageLocation) -> Self {
        Self {
            current: RwLock::new(location),
            replacements: AtomicU64::new(0),
        }
    }

    /// Simulate the user (or the app) moving to another location
    pub fn set(&self, location: PageLocation) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = location;
    }

    /// Number of `replace` calls made by the gate
    pub fn replacements(&self) -> u64 {
        self.replacements.load(Ordering::SeqCst)
    }
}

impl Navigator for MemoryNavigator {
    fn location(&self) -> PageLocation {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, location: &PageLocation) {
        self.set(location.clone());
        self.replacements.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct SessionGate {
    bridge: Arc<dyn SessionBridge>,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<GateState>,
    generation: AtomicU64,
    established: AtomicBool,
}

impl SessionGate {
    pub fn new(
        bridge: Arc<dyn SessionBridge>,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(GateState::Checking);
        Self {
            bridge,
            store,
            navigator,
            state,
            generation: AtomicU64::new(0),
            established: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Run the decision procedure for the current location.
    ///
    /// Call on mount and on every location change. A run superseded by a
    /// later one leaves state and location untouched.
    #[instrument(skip(self))]
    pub async fn run(&self) -> GateState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(GateState::Checking);
        let location = self.navigator.location();

        let Some(link) = extract_link_token(&location) else {
            if self.established.load(Ordering::SeqCst) || self.store.get().is_some() {
                debug!("Using existing wallet session");
                self.established.store(true, Ordering::SeqCst);
                self.state.send_replace(GateState::Ready);
            } else {
                debug!("No link token and no stored session");
                self.store.clear();
                self.state
                    .send_replace(GateState::Error(MISSING_SESSION_MESSAGE.to_string()));
            }
            return self.state();
        };

        self.state.send_replace(GateState::Linking);
        let outcome = self.bridge.bridge(&link.token).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Location changed while bridging, discarding outcome");
            return self.state();
        }

        // The link token is single-use: drop it from the URL whatever the outcome
        self.navigator.replace(&link.cleaned_location(&location));

        match outcome {
            Ok(_) => {
                self.established.store(true, Ordering::SeqCst);
                info!(target_path = %link.target_path, "Wallet session ready");
                self.state.send_replace(GateState::Ready);
            }
            Err(e) => {
                warn!("Session bridge failed: {}", e);
                self.state.send_replace(GateState::Error(e.to_string()));
            }
        }

        self.state()
    }

    /// User-triggered retry: re-extract and re-bridge from scratch
    pub async fn retry(&self) -> GateState {
        self.run().await
    }
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate")
            .field("state", &*self.state.borrow())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}
