//! Stateless display helpers for the UI layer: address truncation, wei to
//! ether formatting, block-explorer links and clipboard access.

const WEI_PER_TENTH_MILLIETHER: u128 = 100_000_000_000_000;
const TENTH_MILLIS_PER_ETHER: u128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid wei amount `{0}'")]
pub struct ParseBalanceError(pub String);

/// Shorten an address for display: first 6 and last 4 characters joined
/// with an ellipsis. Addresses too short to truncate are returned as-is.
pub fn truncate_address(address: &str) -> String {
    // addresses are ASCII hex; anything else is displayed untouched
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_owned();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Convert a hex-encoded wei amount into a decimal ether string with 4
/// fractional digits, rounding half up.
pub fn format_balance(wei_hex: &str) -> Result<String, ParseBalanceError> {
    let digits = wei_hex
        .strip_prefix("0x")
        .or_else(|| wei_hex.strip_prefix("0X"))
        .unwrap_or(wei_hex);
    let wei = u128::from_str_radix(digits, 16)
        .map_err(|_| ParseBalanceError(wei_hex.to_owned()))?;

    let tenth_millis = wei
        .checked_add(WEI_PER_TENTH_MILLIETHER / 2)
        .ok_or_else(|| ParseBalanceError(wei_hex.to_owned()))?
        / WEI_PER_TENTH_MILLIETHER;
    Ok(format!(
        "{}.{:04}",
        tenth_millis / TENTH_MILLIS_PER_ETHER,
        tenth_millis % TENTH_MILLIS_PER_ETHER
    ))
}

/// Build the block-explorer page for an address, e.g.
/// `https://etherscan.io/address/0xab...`.
pub fn explorer_address_url(explorer_base: &str, address: &str) -> String {
    format!("{}/address/{address}", explorer_base.trim_end_matches('/'))
}

/// Write `text` to the system clipboard, fire-and-forget.
///
/// Failures (permission denied, no window) are logged and swallowed; there
/// is nothing actionable for the caller.
#[cfg(target_arch = "wasm32")]
pub fn copy_to_clipboard(text: &str) {
    let Some(window) = web_sys::window() else {
        log::warn!("clipboard copy requested without a window object");
        return;
    };
    let promise = window.navigator().clipboard().write_text(text);
    wasm_bindgen_futures::spawn_local(async move {
        if let Err(error) = wasm_bindgen_futures::JsFuture::from(promise).await {
            log::warn!("failed to copy to clipboard: {error:?}");
        }
    });
}
