use std::rc::Rc;

use async_trait::async_trait;

use crate::error::ProviderError;

/// A provider-originated push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The ordered list of authorized accounts changed. An empty list means
    /// the user disconnected the site from inside the wallet.
    AccountsChanged(Vec<String>),
    /// The active chain changed; carries the new hex-encoded chain id.
    ChainChanged(String),
}

/// Callback receiving provider events. It stays registered for as long as
/// the subscription handle it was handed over with is alive.
pub type EventSink = Rc<dyn Fn(ProviderEvent)>;

/// Thin contract around the injected provider's request/subscribe API.
///
/// The session manager is written against this trait so the state machine
/// can be exercised with a scripted gateway; [`InjectedProvider`] is the
/// browser implementation over `window.ethereum`.
#[async_trait(?Send)]
pub trait ProviderGateway {
    /// Keeps the event listeners of [`ProviderGateway::subscribe`]
    /// registered; dropping it releases them.
    type Subscription;

    /// Whether the provider can currently serve requests.
    fn is_available(&self) -> bool {
        true
    }

    /// Ask the provider for its authorized accounts, prompting the user
    /// with the wallet's own permission UI on first use
    /// (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError>;

    /// Balance of `address` at the latest block, as a hex-encoded wei
    /// string (`eth_getBalance`).
    async fn balance_of(&self, address: &str) -> Result<String, ProviderError>;

    /// The active chain, hex-encoded (`eth_chainId`).
    async fn chain_id(&self) -> Result<String, ProviderError>;

    /// Ask the provider to switch the active chain
    /// (`wallet_switchEthereumChain`).
    ///
    /// Success only means the provider accepted the request; the actual
    /// change is reported through [`ProviderEvent::ChainChanged`].
    async fn switch_chain(&self, chain_id: &str) -> Result<(), ProviderError>;

    /// Register `sink` for `accountsChanged`/`chainChanged` events.
    fn subscribe(&self, sink: EventSink) -> Result<Self::Subscription, ProviderError>;
}

#[cfg(target_arch = "wasm32")]
mod injected {
    use std::rc::Rc;

    use async_trait::async_trait;
    use wasm_bindgen::{JsCast, JsValue, prelude::Closure};

    use super::{EventSink, ProviderEvent, ProviderGateway};
    use crate::{
        error::{ProviderError, RpcError},
        ffi,
    };

    const ACCOUNTS_CHANGED: &str = "accountsChanged";
    const CHAIN_CHANGED: &str = "chainChanged";

    #[derive(serde::Serialize)]
    struct Request<'a, P: serde::Serialize> {
        method: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<P>,
    }

    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct SwitchChainParam<'a> {
        chain_id: &'a str,
    }

    /// The EIP-1193 provider injected at `window.ethereum`.
    #[derive(Clone, PartialEq)]
    pub struct InjectedProvider {
        ethereum: ffi::Eip1193,
    }

    impl InjectedProvider {
        /// attempt to find the injected provider
        ///
        /// Returns `None` when no wallet extension injected an object at
        /// `window.ethereum`, or when whatever is there does not expose the
        /// EIP-1193 surface. Extensions inject asynchronously, so make sure
        /// the page is fully loaded before giving up.
        pub fn detect() -> Option<Self> {
            let ethereum = ffi::eip1193::ETHEREUM.with(|ethereum| ethereum.clone())?;
            looks_like_eip1193(ethereum.as_ref()).then(|| Self { ethereum })
        }

        async fn request<P>(
            &self,
            method: &str,
            params: Option<P>,
            switch_target: Option<&str>,
        ) -> Result<JsValue, ProviderError>
        where
            P: serde::Serialize,
        {
            let args = serde_wasm_bindgen::to_value(&Request { method, params }).map_err(
                |encode_error| {
                    ProviderError::Response(format!("Couldn't encode the request: {encode_error}"))
                },
            )?;
            self.ethereum
                .request(&args)
                .await
                .map_err(|error| decode_error(error, switch_target))
        }
    }

    fn looks_like_eip1193(value: &JsValue) -> bool {
        if !value.is_object() {
            return false;
        }

        let has_function_property = |prop: &str| {
            js_sys::Reflect::get(value, &JsValue::from_str(prop))
                .ok()
                .map(|v| v.is_function())
                .unwrap_or(false)
        };

        has_function_property("request")
            && has_function_property("on")
            && has_function_property("removeListener")
    }

    fn decode_error(error: JsValue, switch_target: Option<&str>) -> ProviderError {
        match serde_wasm_bindgen::from_value::<RpcError>(error) {
            Ok(rpc_error) => ProviderError::classify(rpc_error, switch_target),
            Err(decode_error) => ProviderError::Response(format!(
                "Couldn't decode the error content: {decode_error}"
            )),
        }
    }

    #[async_trait(?Send)]
    impl ProviderGateway for InjectedProvider {
        type Subscription = EventSubscription;

        async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
            let accounts = self
                .request::<()>("eth_requestAccounts", None, None)
                .await?;
            serde_wasm_bindgen::from_value(accounts).map_err(|decode_error| {
                ProviderError::Response(format!(
                    "Couldn't decode the account list: {decode_error}"
                ))
            })
        }

        async fn balance_of(&self, address: &str) -> Result<String, ProviderError> {
            let balance = self
                .request("eth_getBalance", Some([address, "latest"]), None)
                .await?;
            balance
                .as_string()
                .ok_or_else(|| ProviderError::Response(format!("Unknown balance: {balance:?}")))
        }

        async fn chain_id(&self) -> Result<String, ProviderError> {
            let chain_id = self.request::<()>("eth_chainId", None, None).await?;
            chain_id
                .as_string()
                .ok_or_else(|| ProviderError::Response(format!("Unknown chain id: {chain_id:?}")))
        }

        async fn switch_chain(&self, chain_id: &str) -> Result<(), ProviderError> {
            self.request(
                "wallet_switchEthereumChain",
                Some([SwitchChainParam { chain_id }]),
                Some(chain_id),
            )
            .await?;
            Ok(())
        }

        fn subscribe(&self, sink: EventSink) -> Result<Self::Subscription, ProviderError> {
            let accounts_sink = Rc::clone(&sink);
            let on_accounts = Closure::<dyn FnMut(JsValue)>::new(move |accounts: JsValue| {
                match serde_wasm_bindgen::from_value::<Vec<String>>(accounts) {
                    Ok(accounts) => accounts_sink(ProviderEvent::AccountsChanged(accounts)),
                    Err(decode_error) => {
                        log::warn!("Couldn't decode the accountsChanged payload: {decode_error}")
                    }
                }
            });
            let on_chain = Closure::<dyn FnMut(JsValue)>::new(move |chain_id: JsValue| {
                match chain_id.as_string() {
                    Some(chain_id) => sink(ProviderEvent::ChainChanged(chain_id)),
                    None => log::warn!("Couldn't decode the chainChanged payload: {chain_id:?}"),
                }
            });

            self.ethereum
                .on(ACCOUNTS_CHANGED, on_accounts.as_ref().unchecked_ref());
            self.ethereum
                .on(CHAIN_CHANGED, on_chain.as_ref().unchecked_ref());

            Ok(EventSubscription {
                ethereum: self.ethereum.clone(),
                on_accounts,
                on_chain,
            })
        }
    }

    /// Keeps the `accountsChanged`/`chainChanged` listeners registered with
    /// the provider; dropping it removes them.
    pub struct EventSubscription {
        ethereum: ffi::Eip1193,
        on_accounts: Closure<dyn FnMut(JsValue)>,
        on_chain: Closure<dyn FnMut(JsValue)>,
    }

    impl Drop for EventSubscription {
        fn drop(&mut self) {
            self.ethereum
                .remove_listener(ACCOUNTS_CHANGED, self.on_accounts.as_ref().unchecked_ref());
            self.ethereum
                .remove_listener(CHAIN_CHANGED, self.on_chain.as_ref().unchecked_ref());
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use self::injected::{EventSubscription, InjectedProvider};
