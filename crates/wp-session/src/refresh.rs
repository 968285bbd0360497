use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::session::SessionResponse;
use crate::store::TokenStore;

type PendingRefresh = Arc<OnceCell<Option<String>>>;

/// Coalesces concurrent access-token refreshes into one network call.
///
/// Each coordinator owns its in-flight slot, so separate clients never share
/// a pending refresh.
pub struct RefreshCoordinator {
    http: Client,
    endpoint: Url,
    store: TokenStore,
    inflight: Mutex<Option<PendingRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(http: Client, endpoint: Url, store: TokenStore) -> Self {
        Self {
            http,
            endpoint,
            store,
            inflight: Mutex::new(None),
        }
    }

    /// Obtain a new access token, joining a refresh already in flight.
    ///
    /// Returns `None` when the refresh fails; the token store is cleared in
    /// that case.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Option<String> {
        // Check-and-set happens before the first await
        let pending = {
            let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight session refresh");
                    Arc::clone(pending)
                }
                None => {
                    let pending = PendingRefresh::default();
                    *slot = Some(Arc::clone(&pending));
                    pending
                }
            }
        };

        pending
            .get_or_init(|| async {
                let _settle = SettleGuard::new(self, &pending);
                self.exchange().await
            })
            .await
            .clone()
    }

    /// True while a refresh call is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn settle(&self, pending: &PendingRefresh) {
        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, pending)) {
            *slot = None;
        }
    }

    async fn exchange(&self) -> Option<String> {
        debug!("Refreshing wallet session");
        let response = match self
            .http
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Session refresh request failed: {}", e);
                self.store.clear();
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Session refresh rejected with status {}", response.status());
            self.store.clear();
            return None;
        }

        let token = match response.json::<SessionResponse>().await {
            Ok(body) => {
                debug!(refreshed = body.refreshed, "Session refresh answered");
                body.token().map(str::to_string)
            }
            Err(e) => {
                warn!("Invalid session refresh response: {}", e);
                None
            }
        };

        match token {
            Some(token) => {
                self.store.set(&token);
                Some(token)
            }
            None => {
                warn!("Session refresh returned no access token");
                self.store.clear();
                None
            }
        }
    }
}

/// Clears the in-flight slot once the refresh settles, or when the caller
/// driving it is dropped mid-flight.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    pending: &'a PendingRefresh,
}

impl<'a> SettleGuard<'a> {
    fn new(coordinator: &'a RefreshCoordinator, pending: &'a PendingRefresh) -> Self {
        // A joined caller taking over after the driver was dropped
        // registers the refresh again
        let mut slot = coordinator
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(Arc::clone(pending));
        }
        drop(slot);

        Self {
            coordinator,
            pending,
        }
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.settle(self.pending);
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("endpoint", &self.endpoint.as_str())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
