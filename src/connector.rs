//! Browser entry point tying the session manager to `window.ethereum` and
//! `window.localStorage`.

use std::{cell::RefCell, rc::Rc};

use wasm_bindgen_futures::spawn_local;

use crate::{
    display,
    error::ProviderError,
    ffi,
    provider::{EventSubscription, InjectedProvider, ProviderEvent},
    session::{SessionConfig, SessionManager, SessionPhase, WalletSession},
    store::BrowserStorage,
};

/// How long the "address copied" feedback stays on.
const COPY_FEEDBACK_MILLIS: i32 = 2_000;

/// A [`SessionManager`] wired to the injected provider, local storage and
/// the provider's event stream.
///
/// Exactly one pair of `accountsChanged`/`chainChanged` listeners is
/// registered per connector, lazily when wallet functionality first reaches
/// the connected state, and released when the connector is dropped. A
/// transient disconnect/reconnect does not churn listeners.
pub struct Connector {
    manager: Rc<SessionManager<InjectedProvider, BrowserStorage>>,
    events: RefCell<Option<EventSubscription>>,
}

impl Connector {
    /// Connect the session manager to `window.ethereum`, with the default
    /// configuration (Ethereum Mainnet, etherscan links).
    ///
    /// Fails with [`ProviderError::Unavailable`] when no wallet extension
    /// is injected (offer the user an installation path rather than retry)
    /// and with [`ProviderError::StorageUnavailable`] when local storage
    /// cannot be opened.
    pub fn detect() -> Result<Self, ProviderError> {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Result<Self, ProviderError> {
        let provider = InjectedProvider::detect().ok_or(ProviderError::Unavailable)?;
        let storage = BrowserStorage::open().ok_or(ProviderError::StorageUnavailable)?;

        Ok(Self {
            manager: Rc::new(SessionManager::new(provider, storage, config)),
            events: RefCell::new(None),
        })
    }

    /// Register the callback invoked after every observable state change.
    pub fn on_change(&self, callback: impl Fn(&WalletSession) + 'static) {
        self.manager.on_change(callback);
    }

    pub fn session(&self) -> WalletSession {
        self.manager.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.manager.phase()
    }

    /// Hydrate from the cached session, see [`SessionManager::initialize`].
    /// Call once at startup.
    pub async fn initialize(&self) {
        self.manager.initialize().await;
        if self.manager.phase() == SessionPhase::Connected {
            self.ensure_events();
        }
    }

    /// User-initiated connect, see [`SessionManager::connect`].
    pub async fn connect(&self) -> Result<(), ProviderError> {
        let result = self.manager.connect().await;
        if self.manager.phase() == SessionPhase::Connected {
            self.ensure_events();
        }
        result
    }

    /// Local disconnect. The event listeners deliberately stay registered:
    /// they are released with the connector, not per session.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Switch the provider to the configured expected chain.
    pub async fn switch_network(&self) -> Result<(), ProviderError> {
        self.manager.switch_network(None).await
    }

    pub async fn switch_network_to(&self, chain_id: &str) -> Result<(), ProviderError> {
        self.manager.switch_network(Some(chain_id)).await
    }

    /// Copy the active address to the clipboard and raise the transient
    /// feedback flag; it clears itself after 2 seconds.
    pub fn copy_address(&self) {
        let Some(address) = self.manager.snapshot().address else {
            return;
        };
        display::copy_to_clipboard(&address);
        self.manager.set_copy_feedback(true);

        let manager = Rc::clone(&self.manager);
        spawn_local(async move {
            ffi::sleep(COPY_FEEDBACK_MILLIS).await;
            manager.set_copy_feedback(false);
        });
    }

    /// Block-explorer page of the active address, if connected.
    pub fn explorer_url(&self) -> Option<String> {
        self.manager.explorer_url()
    }

    fn ensure_events(&self) {
        if self.events.borrow().is_some() {
            return;
        }

        let manager = Rc::clone(&self.manager);
        let sink = Rc::new(move |event: ProviderEvent| {
            let manager = Rc::clone(&manager);
            spawn_local(async move {
                match event {
                    ProviderEvent::AccountsChanged(accounts) => {
                        manager.accounts_changed(accounts).await
                    }
                    ProviderEvent::ChainChanged(chain_id) => {
                        manager.chain_changed(chain_id).await
                    }
                }
            });
        });

        match self.manager.subscribe_events(sink) {
            Ok(subscription) => *self.events.borrow_mut() = Some(subscription),
            Err(error) => log::warn!("failed to subscribe to provider events: {error}"),
        }
    }
}
