//! Session bridging and authenticated requests for the wallet portal
//!
//! The portal is opened from the companion app through a deep link carrying a
//! one-time link credential. This crate turns that credential into a durable
//! session and keeps every later request authenticated.
//!
//! # Flow
//!
//! 1. [`extract_link_token`] finds the credential in the query string or the
//!    hash route and strips it from the URL
//! 2. [`HttpSessionBridge`] exchanges it once for an access token
//! 3. [`TokenStore`] persists the token
//! 4. [`PortalClient`] attaches it to requests and, on a 401, refreshes it
//!    through a [`RefreshCoordinator`] that allows one refresh in flight
//! 5. [`SessionGate`] sequences the above and exposes a [`GateState`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wp_session::{
//!     HttpSessionBridge, MemoryNavigator, PageLocation, PortalClient, PortalConfig,
//!     SessionGate, TokenStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = TokenStore::in_memory();
//!     let client = PortalClient::new(PortalConfig::default(), store.clone())?;
//!
//!     let location = PageLocation::parse("https://wallet.example.com/?token=abc")?;
//!     let gate = SessionGate::new(
//!         Arc::new(HttpSessionBridge::new(client.clone())),
//!         store,
//!         Arc::new(MemoryNavigator::new(location)),
//!     );
//!
//!     if gate.run().await.is_ready() {
//!         let ledger = client.get("/wallet-portal/ledger").await?;
//!         println!("{ledger}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Token Storage
//!
//! Storage never fails outward: a backend error reads as "no session".
//!
//! ```
//! use wp_session::TokenStore;
//!
//! let store = TokenStore::in_memory();
//! store.set("access-token");
//! assert_eq!(store.get().as_deref(), Some("access-token"));
//! store.clear();
//! assert_eq!(store.get(), None);
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod errors;
pub mod file_store;
pub mod gate;
pub mod location;
pub mod refresh;
pub mod session;
pub mod store;

// Re-export main types
pub use bridge::{HttpSessionBridge, SessionBridge};
pub use client::{PortalClient, RequestOptions};
pub use config::{HttpTimeouts, PortalConfig};
pub use errors::{BridgeError, ConfigError, NormalizedError, RequestError, Result, StorageError};
pub use file_store::FileStorage;
pub use gate::{GateState, MISSING_SESSION_MESSAGE, MemoryNavigator, Navigator, SessionGate};
pub use location::{LinkToken, PageLocation, extract_link_token};
pub use refresh::RefreshCoordinator;
pub use session::Session;
pub use store::{MemoryStorage, StorageBackend, TokenStore};
