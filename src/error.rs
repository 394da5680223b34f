/// Numeric error codes a provider may attach to a rejected request, as
/// standardised by EIP-1193 (and EIP-3326 for `UnrecognizedChain`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum RpcErrorCode {
    #[error("The user rejected the request.")]
    UserRejected,
    #[error("The requested method and/or account has not been authorized.")]
    Unauthorized,
    #[error("The provider does not support the requested method.")]
    UnsupportedMethod,
    #[error("The provider is disconnected from all chains.")]
    Disconnected,
    #[error("The provider is not connected to the requested chain.")]
    ChainDisconnected,
    /// The chain has never been added to the provider (EIP-3326 code 4902).
    #[error("The requested chain is not registered with the provider.")]
    UnrecognizedChain,
    #[error("Unknown error code `{0}'")]
    Unknown(i64),
}

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error, serde::Deserialize,
)]
#[error("{code}. {message}.")]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
}

impl<'de> serde::Deserialize<'de> for RpcErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = RpcErrorCode;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "Expecting an integer RpcErrorCode")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    4001 => Ok(RpcErrorCode::UserRejected),
                    4100 => Ok(RpcErrorCode::Unauthorized),
                    4200 => Ok(RpcErrorCode::UnsupportedMethod),
                    4900 => Ok(RpcErrorCode::Disconnected),
                    4901 => Ok(RpcErrorCode::ChainDisconnected),
                    4902 => Ok(RpcErrorCode::UnrecognizedChain),
                    unknown => Ok(RpcErrorCode::Unknown(unknown)),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_i64(v as i64)
            }

            // providers hand their codes over as JS numbers, which
            // serde-wasm-bindgen surfaces as f64
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_i64(v as i64)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Everything a gateway call can fail with, already classified the way the
/// session manager (and the UI behind it) needs to react.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No provider object is injected into the page. The only remediation is
    /// pointing the user at a wallet extension to install.
    #[error("no Ethereum provider is injected into the page")]
    Unavailable,
    /// The user declined the prompt in the wallet UI. Expected, non-fatal.
    #[error("the user declined the request")]
    Rejected,
    /// The switch target is unknown to the provider; the user has to add the
    /// network manually. We do not attempt to auto-register it.
    #[error("chain `{0}' is not registered with the provider")]
    ChainNotRegistered(String),
    #[error("the provider returned an empty account list")]
    NoAccounts,
    /// Durable per-origin storage is missing (private browsing, storage
    /// partitioning); the session cannot be persisted across reloads.
    #[error("window.localStorage is not available")]
    StorageUnavailable,
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("Couldn't decode the provider response: {0}")]
    Response(String),
}

impl ProviderError {
    /// Classify a decoded provider error for the request it came from.
    ///
    /// `switch_target` is the chain id a `wallet_switchEthereumChain` request
    /// was trying to reach, if that is what failed.
    pub fn classify(error: RpcError, switch_target: Option<&str>) -> Self {
        match (error.code, switch_target) {
            (RpcErrorCode::UserRejected, _) => ProviderError::Rejected,
            (RpcErrorCode::UnrecognizedChain, Some(target)) => {
                ProviderError::ChainNotRegistered(target.to_owned())
            }
            _ => ProviderError::Rpc(error),
        }
    }
}

/// A durable-storage write was refused by the backend (quota, privacy mode).
/// The store is a cache, so callers treat this as best-effort and log it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage backend rejected the operation: {0}")]
pub struct StoreError(pub String);
