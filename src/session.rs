//! The wallet session state machine.
//!
//! [`SessionManager`] orchestrates connect/disconnect/switch-network and the
//! provider-pushed account and chain change events, composing the gateway,
//! the resolver and the durable session store. It owns the single live
//! [`WalletSession`] and reports every mutation through an `on_change`
//! callback so the UI layer can re-render whatever it reports.
//!
//! Everything runs on the single browser thread; the only correctness
//! mechanism against interleaved events is the staleness guard: a refresh
//! result is applied only if the address it was fetched for is still the
//! active one when the response lands.

use std::cell::{Cell, RefCell};

use crate::{
    display,
    error::ProviderError,
    network,
    provider::{EventSink, ProviderGateway},
    store::{KeyValueStore, SessionStore},
};

/// Where the manager currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Disconnected,
    /// `eth_requestAccounts` is pending in the wallet UI.
    Connecting,
    Connected,
    /// A chain switch was accepted by the provider and we are waiting for
    /// the `chainChanged` event confirming it.
    SwitchingNetwork,
}

/// The observable session state, one live instance per page.
///
/// `address` is `Some` if and only if `connected` is true; the derived
/// display fields (`balance`, `network_name`) are only meaningful while
/// connected and are cleared on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub connected: bool,
    /// Hex account identifier of the active account.
    pub address: Option<String>,
    /// Ether balance with 4 fractional digits. Derived, not authoritative.
    pub balance: Option<String>,
    /// Hex-encoded chain id, as reported by the provider.
    pub chain_id: Option<String>,
    pub network_name: Option<String>,
    /// True iff the active chain is the configured one. Defaults to true
    /// while the chain is unknown so the UI does not nag prematurely.
    pub expected_network: bool,
    /// Transient "address copied" flag, auto-cleared by the browser glue.
    pub copy_feedback: bool,
}

impl Default for WalletSession {
    fn default() -> Self {
        Self {
            connected: false,
            address: None,
            balance: None,
            chain_id: None,
            network_name: None,
            expected_network: true,
            copy_feedback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The chain the application is built for; `"0x1"` (Ethereum Mainnet)
    /// unless configured otherwise.
    pub expected_chain_id: String,
    /// Block explorer the address link points at.
    pub explorer_base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: "0x1".to_owned(),
            explorer_base_url: "https://etherscan.io".to_owned(),
        }
    }
}

pub struct SessionManager<G, K> {
    gateway: G,
    store: SessionStore<K>,
    config: SessionConfig,
    phase: Cell<SessionPhase>,
    state: RefCell<WalletSession>,
    on_change: RefCell<Option<Box<dyn Fn(&WalletSession)>>>,
}

impl<G, K> SessionManager<G, K>
where
    G: ProviderGateway,
    K: KeyValueStore,
{
    pub fn new(gateway: G, backend: K, config: SessionConfig) -> Self {
        Self {
            gateway,
            store: SessionStore::new(backend),
            config,
            phase: Cell::new(SessionPhase::Disconnected),
            state: RefCell::new(WalletSession::default()),
            on_change: RefCell::new(None),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    pub fn snapshot(&self) -> WalletSession {
        self.state.borrow().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register the callback invoked after every observable state change.
    pub fn on_change(&self, callback: impl Fn(&WalletSession) + 'static) {
        *self.on_change.borrow_mut() = Some(Box::new(callback));
    }

    /// Block-explorer page of the active address, if connected.
    pub fn explorer_url(&self) -> Option<String> {
        let state = self.state.borrow();
        let address = state.address.as_deref()?;
        Some(display::explorer_address_url(
            &self.config.explorer_base_url,
            address,
        ))
    }

    /// Hydrate from the persisted session, then validate it.
    ///
    /// A cached address is adopted optimistically without re-requesting
    /// account permission: the state reads connected immediately, and the
    /// follow-up refresh fills in balance and chain. With nothing cached
    /// (or no provider) the manager stays disconnected.
    pub async fn initialize(&self) {
        if self.phase.get() != SessionPhase::Disconnected {
            return;
        }
        let Some(address) = self.store.load() else {
            return;
        };
        if !self.gateway.is_available() {
            return;
        }

        self.adopt(&address);
        self.refresh(&address).await;
    }

    /// User-initiated connect, valid from `Disconnected` only.
    ///
    /// Asks the provider for its accounts, adopts the first one and caches
    /// it. An error leaves the manager disconnected:
    /// [`ProviderError::Rejected`] means the user declined (non-fatal, no
    /// retry), and the caller decides what remediation to show for the rest.
    pub async fn connect(&self) -> Result<(), ProviderError> {
        if self.phase.get() != SessionPhase::Disconnected {
            return Ok(());
        }
        self.phase.set(SessionPhase::Connecting);

        let accounts = match self.gateway.request_accounts().await {
            Ok(accounts) => accounts,
            Err(error) => {
                self.phase.set(SessionPhase::Disconnected);
                return Err(error);
            }
        };
        let Some(address) = accounts.into_iter().next() else {
            self.phase.set(SessionPhase::Disconnected);
            return Err(ProviderError::NoAccounts);
        };

        self.adopt(&address);
        self.persist(&address);
        self.refresh(&address).await;
        Ok(())
    }

    /// Reset to empty and drop the cached session.
    ///
    /// Purely local: EIP-1193 has no disconnect primitive, so the wallet's
    /// own authorization is not revoked.
    pub fn disconnect(&self) {
        self.store.clear();
        self.phase.set(SessionPhase::Disconnected);
        self.mutate(|state| *state = WalletSession::default());
    }

    /// Ask the provider to switch to `target` (the configured expected
    /// chain when `None`). Valid from `Connected` only, and a no-op when
    /// the active chain already is the target.
    ///
    /// On success the manager stays in `SwitchingNetwork` until the
    /// provider confirms through `chainChanged`; the switch is never
    /// assumed to be immediate. [`ProviderError::ChainNotRegistered`] and
    /// [`ProviderError::Rejected`] return to `Connected` on the old chain.
    pub async fn switch_network(&self, target: Option<&str>) -> Result<(), ProviderError> {
        if self.phase.get() != SessionPhase::Connected {
            return Ok(());
        }
        let target = target.unwrap_or(&self.config.expected_chain_id).to_owned();
        // already on the target chain: the provider would resolve the
        // request without ever emitting `chainChanged`, stranding us in
        // `SwitchingNetwork`
        let already_on_target = {
            let state = self.state.borrow();
            state
                .chain_id
                .as_deref()
                .is_some_and(|chain_id| network::is_expected(chain_id, &target))
        };
        if already_on_target {
            return Ok(());
        }
        self.phase.set(SessionPhase::SwitchingNetwork);

        match self.gateway.switch_chain(&target).await {
            Ok(()) => Ok(()),
            Err(error) => {
                // a wallet-side disconnect may have landed while the prompt
                // was open; only a still-pending switch returns to
                // `Connected`
                if self.phase.get() == SessionPhase::SwitchingNetwork {
                    self.phase.set(SessionPhase::Connected);
                }
                Err(error)
            }
        }
    }

    /// Handle a provider `accountsChanged` event.
    ///
    /// An empty list is the wallet-side disconnect and behaves exactly like
    /// [`SessionManager::disconnect`]. A new first account is adopted,
    /// persisted and refreshed; in-flight refreshes for the old address die
    /// against the staleness guard.
    pub async fn accounts_changed(&self, accounts: Vec<String>) {
        if !self.state.borrow().connected {
            return;
        }

        let Some(address) = accounts.into_iter().next() else {
            self.disconnect();
            return;
        };
        if self.state.borrow().address.as_deref() == Some(address.as_str()) {
            return;
        }

        self.adopt(&address);
        self.persist(&address);
        self.refresh(&address).await;
    }

    /// Handle a provider `chainChanged` event.
    ///
    /// Re-resolves the network name and expected-network verdict in place
    /// (no page reload, no account re-fetch) and refreshes the balance,
    /// which differs per chain. Also completes a pending network switch.
    pub async fn chain_changed(&self, chain_id: String) {
        if !self.state.borrow().connected {
            return;
        }

        let name = network::network_name(&chain_id);
        let expected = network::is_expected(&chain_id, &self.config.expected_chain_id);
        self.mutate(|state| {
            state.chain_id = Some(chain_id);
            state.network_name = Some(name);
            state.expected_network = expected;
        });
        if self.phase.get() == SessionPhase::SwitchingNetwork {
            self.phase.set(SessionPhase::Connected);
        }

        let address = self.state.borrow().address.clone();
        if let Some(address) = address {
            self.refresh_balance(&address).await;
        }
    }

    /// Delegate an event subscription to the gateway. The caller owns the
    /// returned handle; one pair of listeners per page lifetime is enough.
    pub fn subscribe_events(&self, sink: EventSink) -> Result<G::Subscription, ProviderError> {
        self.gateway.subscribe(sink)
    }

    pub fn set_copy_feedback(&self, active: bool) {
        if self.state.borrow().copy_feedback == active {
            return;
        }
        self.mutate(|state| state.copy_feedback = active);
    }

    /// Make `address` the active connected account.
    fn adopt(&self, address: &str) {
        self.phase.set(SessionPhase::Connected);
        self.mutate(|state| {
            state.connected = true;
            state.address = Some(address.to_owned());
        });
    }

    /// Best-effort write-through to the durable store.
    fn persist(&self, address: &str) {
        if let Err(error) = self.store.save(address) {
            log::warn!("failed to cache the session: {error}");
        }
    }

    /// Fetch balance and chain for `address` and fold them into the state.
    ///
    /// Transient fetch errors are logged and leave the previous display
    /// values in place; they never fail the surrounding operation.
    async fn refresh(&self, address: &str) {
        self.refresh_balance(address).await;
        self.refresh_chain(address).await;
    }

    async fn refresh_balance(&self, address: &str) {
        let fetched = self.gateway.balance_of(address).await;
        if !self.is_active(address) {
            log::debug!(
                "discarding stale balance for {}",
                display::truncate_address(address)
            );
            return;
        }
        match fetched.and_then(|wei_hex| {
            display::format_balance(&wei_hex)
                .map_err(|error| ProviderError::Response(error.to_string()))
        }) {
            Ok(balance) => self.mutate(|state| state.balance = Some(balance)),
            Err(error) => log::warn!(
                "failed to refresh the balance of {}: {error}",
                display::truncate_address(address)
            ),
        }
    }

    async fn refresh_chain(&self, address: &str) {
        let fetched = self.gateway.chain_id().await;
        if !self.is_active(address) {
            log::debug!("discarding stale chain id for a previous address");
            return;
        }
        match fetched {
            Ok(chain_id) => {
                let name = network::network_name(&chain_id);
                let expected = network::is_expected(&chain_id, &self.config.expected_chain_id);
                self.mutate(|state| {
                    state.chain_id = Some(chain_id);
                    state.network_name = Some(name);
                    state.expected_network = expected;
                });
            }
            Err(error) => log::warn!("failed to refresh the chain id: {error}"),
        }
    }

    /// The staleness guard: is `address` still the active account?
    fn is_active(&self, address: &str) -> bool {
        let state = self.state.borrow();
        state.connected && state.address.as_deref() == Some(address)
    }

    fn mutate(&self, f: impl FnOnce(&mut WalletSession)) {
        f(&mut self.state.borrow_mut());
        let snapshot = self.state.borrow().clone();
        if let Some(callback) = &*self.on_change.borrow() {
            callback(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::HashMap,
        future::Future,
        pin::Pin,
        rc::Rc,
        task::{Context, Poll},
    };

    use async_trait::async_trait;
    use futures::executor::block_on;

    use super::*;
    use crate::{
        provider::ProviderEvent,
        store::{ADDRESS_KEY, CONNECTED_KEY, MemoryStore},
    };

    const ALICE: &str = "0xAA1111111111111111111111111111111111AA11";
    const BOB: &str = "0xBB2222222222222222222222222222222222BB22";
    const ONE_ETH: &str = "0xde0b6b3a7640000";
    const TWO_ETH: &str = "0x1bc16d674ec80000";

    /// A balance response is either ready or held back behind a gate the
    /// test resolves by hand, to interleave events with an in-flight fetch.
    enum Balance {
        Ready(String),
        Gated(Rc<Cell<Option<String>>>),
    }

    struct Gate<T>(Rc<Cell<Option<T>>>);

    impl<T> Future for Gate<T> {
        type Output = T;

        // polled by hand in the tests, no waker bookkeeping needed
        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            match self.0.take() {
                Some(value) => Poll::Ready(value),
                None => Poll::Pending,
            }
        }
    }

    type SwitchGate = Rc<Cell<Option<Result<(), ProviderError>>>>;

    #[derive(Default)]
    struct FakeGateway {
        accounts: RefCell<Option<Result<Vec<String>, ProviderError>>>,
        balances: RefCell<HashMap<String, Balance>>,
        chain: RefCell<String>,
        switch_error: RefCell<Option<ProviderError>>,
        switch_gate: RefCell<Option<SwitchGate>>,
        switch_calls: Cell<u32>,
        sinks: RefCell<Vec<EventSink>>,
    }

    impl FakeGateway {
        fn new() -> Rc<Self> {
            let gateway = Rc::new(Self::default());
            *gateway.chain.borrow_mut() = "0x1".to_owned();
            gateway
        }

        fn accounts(&self, accounts: &[&str]) {
            *self.accounts.borrow_mut() =
                Some(Ok(accounts.iter().map(|a| (*a).to_owned()).collect()));
        }

        fn accounts_error(&self, error: ProviderError) {
            *self.accounts.borrow_mut() = Some(Err(error));
        }

        fn balance(&self, address: &str, wei_hex: &str) {
            self.balances
                .borrow_mut()
                .insert(address.to_owned(), Balance::Ready(wei_hex.to_owned()));
        }

        fn gated_balance(&self, address: &str) -> Rc<Cell<Option<String>>> {
            let gate = Rc::new(Cell::new(None));
            self.balances
                .borrow_mut()
                .insert(address.to_owned(), Balance::Gated(Rc::clone(&gate)));
            gate
        }

        fn chain(&self, chain_id: &str) {
            *self.chain.borrow_mut() = chain_id.to_owned();
        }

        fn gated_switch(&self) -> SwitchGate {
            let gate = Rc::new(Cell::new(None));
            *self.switch_gate.borrow_mut() = Some(Rc::clone(&gate));
            gate
        }
    }

    #[async_trait(?Send)]
    impl ProviderGateway for Rc<FakeGateway> {
        type Subscription = ();

        async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
            self.accounts
                .borrow_mut()
                .take()
                .expect("no scripted account response")
        }

        async fn balance_of(&self, address: &str) -> Result<String, ProviderError> {
            let gate = match self.balances.borrow().get(address) {
                Some(Balance::Ready(wei_hex)) => return Ok(wei_hex.clone()),
                Some(Balance::Gated(gate)) => Rc::clone(gate),
                None => {
                    return Err(ProviderError::Response(format!(
                        "no scripted balance for {address}"
                    )));
                }
            };
            Ok(Gate(gate).await)
        }

        async fn chain_id(&self) -> Result<String, ProviderError> {
            Ok(self.chain.borrow().clone())
        }

        async fn switch_chain(&self, _chain_id: &str) -> Result<(), ProviderError> {
            self.switch_calls.set(self.switch_calls.get() + 1);
            let gate = self.switch_gate.borrow_mut().take();
            if let Some(gate) = gate {
                return Gate(gate).await;
            }
            match self.switch_error.borrow_mut().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn subscribe(&self, sink: EventSink) -> Result<(), ProviderError> {
            self.sinks.borrow_mut().push(sink);
            Ok(())
        }
    }

    type TestManager = SessionManager<Rc<FakeGateway>, Rc<MemoryStore>>;

    fn manager(gateway: &Rc<FakeGateway>, backend: &Rc<MemoryStore>) -> TestManager {
        SessionManager::new(
            Rc::clone(gateway),
            Rc::clone(backend),
            SessionConfig::default(),
        )
    }

    /// Record every observable state for invariant checks.
    fn record_changes(manager: &TestManager) -> Rc<RefCell<Vec<WalletSession>>> {
        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        manager.on_change(move |state| sink.borrow_mut().push(state.clone()));
        states
    }

    fn assert_address_iff_connected(states: &[WalletSession]) {
        for state in states {
            assert_eq!(
                state.connected,
                state.address.is_some(),
                "address must be set iff connected: {state:?}"
            );
        }
    }

    fn connected_manager(gateway: &Rc<FakeGateway>, backend: &Rc<MemoryStore>) -> TestManager {
        gateway.accounts(&[ALICE]);
        gateway.balance(ALICE, ONE_ETH);
        let manager = manager(gateway, backend);
        block_on(manager.connect()).unwrap();
        manager
    }

    #[test]
    fn empty_session_defaults() {
        let session = WalletSession::default();
        assert!(!session.connected);
        assert_eq!(session.address, None);
        // unknown chain counts as the expected network
        assert!(session.expected_network);
    }

    #[test]
    fn initialize_with_empty_store_stays_disconnected() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        block_on(manager.initialize());

        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());
    }

    #[test]
    fn initialize_adopts_cached_address_optimistically() {
        let gateway = FakeGateway::new();
        gateway.balance(ALICE, ONE_ETH);
        gateway.chain("0x89");
        let backend = Rc::new(MemoryStore::new());
        SessionStore::new(Rc::clone(&backend)).save(ALICE).unwrap();

        let manager = manager(&gateway, &backend);
        let states = record_changes(&manager);
        block_on(manager.initialize());

        let states = states.borrow();
        // connected with the cached address before any refresh completed
        let first = states.first().unwrap();
        assert!(first.connected);
        assert_eq!(first.address.as_deref(), Some(ALICE));
        assert_eq!(first.balance, None);
        // and fully populated after the refresh
        let last = states.last().unwrap();
        assert_eq!(last.balance.as_deref(), Some("1.0000"));
        assert_eq!(last.network_name.as_deref(), Some("Polygon"));
        assert!(!last.expected_network);
        assert_address_iff_connected(&states);
    }

    #[test]
    fn connect_adopts_first_account_and_persists() {
        let gateway = FakeGateway::new();
        gateway.accounts(&[ALICE, BOB]);
        gateway.balance(ALICE, ONE_ETH);
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);
        let states = record_changes(&manager);

        block_on(manager.connect()).unwrap();

        assert_eq!(manager.phase(), SessionPhase::Connected);
        let session = manager.snapshot();
        assert_eq!(session.address.as_deref(), Some(ALICE));
        assert_eq!(session.balance.as_deref(), Some("1.0000"));
        assert_eq!(session.network_name.as_deref(), Some("Ethereum Mainnet"));
        assert!(session.expected_network);

        assert_eq!(backend.get(CONNECTED_KEY).as_deref(), Some("true"));
        assert_eq!(backend.get(ADDRESS_KEY).as_deref(), Some(ALICE));
        assert_address_iff_connected(&states.borrow());
    }

    #[test]
    fn connect_rejected_stays_disconnected() {
        let gateway = FakeGateway::new();
        gateway.accounts_error(ProviderError::Rejected);
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        let result = block_on(manager.connect());

        assert_eq!(result, Err(ProviderError::Rejected));
        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());
        assert_eq!(backend.get(CONNECTED_KEY), None);
    }

    #[test]
    fn connect_with_empty_account_list_stays_disconnected() {
        let gateway = FakeGateway::new();
        gateway.accounts(&[]);
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        assert_eq!(
            block_on(manager.connect()),
            Err(ProviderError::NoAccounts)
        );
        assert_eq!(manager.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn connect_while_connected_is_a_noop() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        // no scripted account response left; a second request would panic
        block_on(manager.connect()).unwrap();
        assert_eq!(manager.snapshot().address.as_deref(), Some(ALICE));
    }

    #[test]
    fn transient_balance_error_keeps_previous_display() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        assert_eq!(manager.snapshot().balance.as_deref(), Some("1.0000"));

        // next fetch fails: previous balance stays, still connected
        gateway.balances.borrow_mut().remove(ALICE);
        block_on(manager.chain_changed("0x89".to_owned()));

        let session = manager.snapshot();
        assert!(session.connected);
        assert_eq!(session.balance.as_deref(), Some("1.0000"));
        assert_eq!(session.network_name.as_deref(), Some("Polygon"));
    }

    #[test]
    fn disconnect_clears_state_and_storage() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        manager.disconnect();

        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());
        assert_eq!(backend.get(CONNECTED_KEY), None);
        assert_eq!(backend.get(ADDRESS_KEY), None);
    }

    #[test]
    fn accounts_changed_empty_behaves_like_disconnect() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        block_on(manager.accounts_changed(Vec::new()));

        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());
        assert_eq!(backend.get(CONNECTED_KEY), None);
        assert_eq!(backend.get(ADDRESS_KEY), None);
    }

    #[test]
    fn accounts_changed_adopts_new_account() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        gateway.balance(BOB, TWO_ETH);

        block_on(manager.accounts_changed(vec![BOB.to_owned()]));

        let session = manager.snapshot();
        assert_eq!(session.address.as_deref(), Some(BOB));
        assert_eq!(session.balance.as_deref(), Some("2.0000"));
        assert_eq!(backend.get(ADDRESS_KEY).as_deref(), Some(BOB));
    }

    #[test]
    fn accounts_changed_same_account_is_a_noop() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        let states = record_changes(&manager);

        block_on(manager.accounts_changed(vec![ALICE.to_owned()]));

        assert!(states.borrow().is_empty());
    }

    #[test]
    fn accounts_changed_while_disconnected_is_ignored() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        block_on(manager.accounts_changed(vec![ALICE.to_owned()]));

        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());
    }

    #[test]
    fn stale_refresh_is_discarded() {
        let gateway = FakeGateway::new();
        gateway.accounts(&[ALICE]);
        // Alice's balance fetch is held in flight behind a gate
        let gate = gateway.gated_balance(ALICE);
        gateway.balance(BOB, TWO_ETH);
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        // connect suspends on Alice's balance fetch
        let mut connect = Box::pin(manager.connect());
        assert!(connect.as_mut().poll(&mut cx).is_pending());
        assert_eq!(manager.snapshot().address.as_deref(), Some(ALICE));

        // the wallet switches to Bob while Alice's fetch is still pending
        block_on(manager.accounts_changed(vec![BOB.to_owned()]));
        assert_eq!(manager.snapshot().balance.as_deref(), Some("2.0000"));

        // Alice's response finally lands; it must not clobber Bob's state
        gate.set(Some(ONE_ETH.to_owned()));
        assert!(connect.as_mut().poll(&mut cx).is_ready());

        let session = manager.snapshot();
        assert_eq!(session.address.as_deref(), Some(BOB));
        assert_eq!(session.balance.as_deref(), Some("2.0000"));
        assert_eq!(backend.get(ADDRESS_KEY).as_deref(), Some(BOB));
    }

    #[test]
    fn chain_changed_resolves_in_place_and_refreshes_balance() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        // balance differs on the new chain
        gateway.balance(ALICE, TWO_ETH);
        block_on(manager.chain_changed("0x89".to_owned()));

        let session = manager.snapshot();
        assert_eq!(session.chain_id.as_deref(), Some("0x89"));
        assert_eq!(session.network_name.as_deref(), Some("Polygon"));
        assert!(!session.expected_network);
        assert_eq!(session.balance.as_deref(), Some("2.0000"));
        // the event did not disturb the connection
        assert_eq!(manager.phase(), SessionPhase::Connected);
    }

    #[test]
    fn chain_changed_while_disconnected_is_ignored() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        block_on(manager.chain_changed("0x89".to_owned()));

        assert_eq!(manager.snapshot(), WalletSession::default());
    }

    #[test]
    fn switch_network_waits_for_chain_changed() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        gateway.chain("0x89");
        block_on(manager.chain_changed("0x89".to_owned()));
        assert!(!manager.snapshot().expected_network);

        // the provider accepted the switch but has not confirmed it yet
        block_on(manager.switch_network(None)).unwrap();
        assert_eq!(manager.phase(), SessionPhase::SwitchingNetwork);

        gateway.chain("0x1");
        block_on(manager.chain_changed("0x1".to_owned()));

        assert_eq!(manager.phase(), SessionPhase::Connected);
        let session = manager.snapshot();
        assert!(session.expected_network);
        assert_eq!(session.network_name.as_deref(), Some("Ethereum Mainnet"));
    }

    #[test]
    fn switch_network_unregistered_chain_returns_to_connected() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        gateway.chain("0x89");
        block_on(manager.chain_changed("0x89".to_owned()));

        *gateway.switch_error.borrow_mut() =
            Some(ProviderError::ChainNotRegistered("0x1".to_owned()));
        let result = block_on(manager.switch_network(None));

        assert_eq!(
            result,
            Err(ProviderError::ChainNotRegistered("0x1".to_owned()))
        );
        // still connected, still on the wrong network
        assert_eq!(manager.phase(), SessionPhase::Connected);
        assert!(!manager.snapshot().expected_network);
    }

    #[test]
    fn switch_network_rejected_returns_to_connected() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        *gateway.switch_error.borrow_mut() = Some(ProviderError::Rejected);
        let result = block_on(manager.switch_network(Some("0x89")));

        assert_eq!(result, Err(ProviderError::Rejected));
        assert_eq!(manager.phase(), SessionPhase::Connected);
        assert!(manager.snapshot().connected);
    }

    #[test]
    fn switch_rejection_after_disconnect_stays_disconnected() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        block_on(manager.chain_changed("0x89".to_owned()));
        let gate = gateway.gated_switch();

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        // the switch prompt is open in the wallet UI
        let mut switch = Box::pin(manager.switch_network(None));
        assert!(switch.as_mut().poll(&mut cx).is_pending());
        assert_eq!(manager.phase(), SessionPhase::SwitchingNetwork);

        // the wallet disconnects the site while the prompt is pending
        block_on(manager.accounts_changed(Vec::new()));
        assert_eq!(manager.phase(), SessionPhase::Disconnected);

        // the late rejection must not resurrect a connected phase over the
        // emptied session
        gate.set(Some(Err(ProviderError::Rejected)));
        match switch.as_mut().poll(&mut cx) {
            Poll::Ready(result) => assert_eq!(result, Err(ProviderError::Rejected)),
            Poll::Pending => panic!("switch did not resolve"),
        }
        assert_eq!(manager.phase(), SessionPhase::Disconnected);
        assert_eq!(manager.snapshot(), WalletSession::default());

        // and a fresh connect still works afterwards
        gateway.accounts(&[ALICE]);
        block_on(manager.connect()).unwrap();
        assert_eq!(manager.phase(), SessionPhase::Connected);
        assert_eq!(manager.snapshot().address.as_deref(), Some(ALICE));
    }

    #[test]
    fn switch_network_already_on_target_is_a_noop() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        // connected on "0x1", which is the configured expected chain
        assert_eq!(manager.snapshot().chain_id.as_deref(), Some("0x1"));

        block_on(manager.switch_network(None)).unwrap();

        // no request went out and no pending switch is left behind
        assert_eq!(gateway.switch_calls.get(), 0);
        assert_eq!(manager.phase(), SessionPhase::Connected);

        // an explicit target we are already on is equally a no-op
        block_on(manager.switch_network(Some("0x01"))).unwrap();
        assert_eq!(gateway.switch_calls.get(), 0);
        assert_eq!(manager.phase(), SessionPhase::Connected);
    }

    #[test]
    fn switch_network_while_disconnected_is_a_noop() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        block_on(manager.switch_network(None)).unwrap();
        assert_eq!(manager.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn subscribed_sink_receives_events() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = manager(&gateway, &backend);

        let received = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::clone(&received);
        manager
            .subscribe_events(Rc::new(move |event| events.borrow_mut().push(event)))
            .unwrap();

        let sinks = gateway.sinks.borrow();
        let sink = sinks.first().unwrap();
        sink(ProviderEvent::ChainChanged("0x89".to_owned()));
        sink(ProviderEvent::AccountsChanged(vec![ALICE.to_owned()]));

        assert_eq!(
            &*received.borrow(),
            &[
                ProviderEvent::ChainChanged("0x89".to_owned()),
                ProviderEvent::AccountsChanged(vec![ALICE.to_owned()]),
            ]
        );
    }

    #[test]
    fn copy_feedback_flag() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);
        let states = record_changes(&manager);

        manager.set_copy_feedback(true);
        assert!(manager.snapshot().copy_feedback);
        // idempotent: no extra notification for a no-op
        manager.set_copy_feedback(true);
        assert_eq!(states.borrow().len(), 1);

        manager.set_copy_feedback(false);
        assert!(!manager.snapshot().copy_feedback);
    }

    #[test]
    fn explorer_url_follows_active_address() {
        let gateway = FakeGateway::new();
        let backend = Rc::new(MemoryStore::new());
        let manager = connected_manager(&gateway, &backend);

        assert_eq!(
            manager.explorer_url(),
            Some(format!("https://etherscan.io/address/{ALICE}"))
        );

        manager.disconnect();
        assert_eq!(manager.explorer_url(), None);
    }
}
