/*!

# Ethereum Connector for EIP-1193 wallet providers

This library is meant to be used for web applications that need to manage a
session with a browser-injected Ethereum wallet (MetaMask-style). It keeps
track of the active account and chain, persists the session across page
reloads, reacts to provider-pushed change events and exposes the derived
display data (balance, network name, truncated address) the page renders.

## Features

- Connect to the injected wallet provider and adopt the active account
- Reconnect automatically after a page reload, without re-prompting
- Follow `accountsChanged`/`chainChanged` events, discarding stale fetches
- Switch the provider to the application's expected network
- Format balances and addresses for display

## Usage

In the browser, detect the injected provider and hydrate the cached session:

```no_run
# #[cfg(target_arch = "wasm32")]
# async fn demo() -> anyhow::Result<()> {
use ethereum_connector::Connector;

let connector = Connector::detect()?;
connector.on_change(|session| {
    // hand the new state to whatever renders it
    let _ = session;
});
connector.initialize().await;

if !connector.session().connected {
    connector.connect().await?;
}
# Ok(()) }
```

The [`Connector`] registers the provider's event listeners once, the first
time a session reaches the connected state, and releases them when it is
dropped.

The state machine itself, [`SessionManager`], is written against the
[`ProviderGateway`] and [`KeyValueStore`] traits and has no browser
dependency, so it can be exercised on any target with a scripted gateway and
a [`MemoryStore`]. The resolver and formatting helpers are plain functions:

```
use ethereum_connector::{display, network};

assert_eq!(network::network_name("0x89"), "Polygon");
assert_eq!(network::network_name("0x7a69"), "Chain ID: 31337");
assert_eq!(
    display::truncate_address("0x1234567890abcdef"),
    "0x1234...cdef"
);
```

*/

#[cfg(target_arch = "wasm32")]
mod connector;
pub mod display;
pub mod error;
#[cfg(target_arch = "wasm32")]
pub mod ffi;
pub mod network;
mod provider;
mod session;
mod store;

#[cfg(target_arch = "wasm32")]
pub use self::{
    connector::Connector,
    provider::{EventSubscription, InjectedProvider},
    store::BrowserStorage,
};
pub use self::{
    error::{ProviderError, RpcError, RpcErrorCode, StoreError},
    provider::{EventSink, ProviderEvent, ProviderGateway},
    session::{SessionConfig, SessionManager, SessionPhase, WalletSession},
    store::{KeyValueStore, MemoryStore, SessionStore},
};
