//! Environment overrides, read once per process.

use std::env;
use std::sync::OnceLock;

static QDISP_DISPLACE: OnceLock<Option<bool>> = OnceLock::new();

/// Parses the usual boolean spellings; anything else is `None`.
pub fn parse_bool(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an unsigned integer variable, accepting a `0x` prefix.
pub fn env_u64(name: &str) -> Option<u64> {
    let value = env::var(name).ok()?;
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// `QDISP_DISPLACE` override for [`crate::config::DisplacerConfig::enabled`].
pub(crate) fn displace_override() -> Option<bool> {
    *QDISP_DISPLACE.get_or_init(|| match env::var("QDISP_DISPLACE") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => None,
    })
}
