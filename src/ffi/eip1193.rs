use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(thread_local_v2, js_namespace = ["window"], js_name = "ethereum")]
    pub static ETHEREUM: Option<Eip1193>;
}

#[wasm_bindgen]
extern "C" {
    #[derive(Clone, PartialEq)]
    pub type Eip1193;

    /// Submit an RPC request to the provider, as specified by
    /// [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193).
    ///
    /// `args` is a `{ method, params? }` object. The returned promise
    /// resolves with the method-specific result and rejects with a
    /// `ProviderRpcError` (`{ code, message, data? }`).
    ///
    /// Requests that need the user's consent (account access, chain
    /// switching) block on the wallet's own UI; the promise stays pending
    /// until the user answers the prompt.
    #[wasm_bindgen(method, catch, js_name = "request")]
    pub async fn request(this: &Eip1193, args: &JsValue) -> Result<JsValue, JsValue>;

    /// Register a listener for a provider event (`accountsChanged`,
    /// `chainChanged`, ...). Providers follow the Node.js `EventEmitter`
    /// convention.
    #[wasm_bindgen(method, js_name = "on")]
    pub fn on(this: &Eip1193, event: &str, handler: &js_sys::Function);

    /// Remove a listener previously registered with [`Eip1193::on`]. The
    /// handler has to be the same function object.
    #[wasm_bindgen(method, js_name = "removeListener")]
    pub fn remove_listener(this: &Eip1193, event: &str, handler: &js_sys::Function);
}
