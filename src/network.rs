//! Chain-id resolution.
//!
//! Providers report the active chain as a hex-encoded string (`"0x1"`,
//! `"0x89"`, ...). This module turns that into something displayable and
//! answers whether it is the network the application expects. Pure
//! functions, no I/O, never fail.

/// Chain ids the resolver knows a display name for, decimal-decoded.
const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (1, "Ethereum Mainnet"),
    (5, "Goerli"),
    (10, "Optimism"),
    (56, "Binance Smart Chain"),
    (97, "BSC Testnet"),
    (137, "Polygon"),
    (80001, "Mumbai"),
    (11155111, "Sepolia"),
    (42161, "Arbitrum"),
    (43114, "Avalanche"),
];

/// Decode a hex-encoded chain id, with or without the `0x` prefix.
pub fn decode_chain_id(chain_id: &str) -> Option<u64> {
    let digits = chain_id
        .strip_prefix("0x")
        .or_else(|| chain_id.strip_prefix("0X"))
        .unwrap_or(chain_id);
    u64::from_str_radix(digits, 16).ok()
}

/// Resolve a hex-encoded chain id into a display name.
///
/// Unknown chains fall back to `"Chain ID: <decimal>"`; a chain id that is
/// not even valid hexadecimal is embedded verbatim rather than rejected.
pub fn network_name(chain_id: &str) -> String {
    match decode_chain_id(chain_id) {
        Some(id) => KNOWN_NETWORKS
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, name)| (*name).to_owned())
            .unwrap_or_else(|| format!("Chain ID: {id}")),
        None => format!("Chain ID: {chain_id}"),
    }
}

/// Whether `chain_id` is the network the application is configured for.
///
/// Compares the decoded values so `"0x01"` and `"0x1"` agree; when either
/// side does not decode, falls back to a case-insensitive literal match.
pub fn is_expected(chain_id: &str, expected_chain_id: &str) -> bool {
    match (decode_chain_id(chain_id), decode_chain_id(expected_chain_id)) {
        (Some(a), Some(b)) => a == b,
        _ => chain_id.eq_ignore_ascii_case(expected_chain_id),
    }
}
