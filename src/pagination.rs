//! Cursor codecs for the two pagination schemes.
//!
//! Single-partition lists use an opaque cursor wrapping the store's
//! continuation key. The feed merges many partitions, where no single
//! continuation key can represent a merged position, so it uses the raw
//! `createdAt` timestamp of the last emitted item instead.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::infrastructure::store::ItemKey;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 50;

/// Clamp a raw `limit` query parameter to `[1, MAX_LIMIT]`. Missing,
/// non-numeric, and non-positive input all fall back to the default.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    let limit = raw
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(DEFAULT_LIMIT as i64);
    (limit as u64).min(MAX_LIMIT as u64) as u32
}

pub fn encode_cursor(last_key: &Option<ItemKey>) -> Option<String> {
    last_key
        .as_ref()
        .and_then(|key| serde_json::to_vec(key).ok())
        .map(|json| URL_SAFE_NO_PAD.encode(json))
}

/// Decode an opaque cursor. Malformed input of any kind means "no cursor":
/// pagination silently restarts from the beginning rather than erroring.
pub fn decode_cursor(raw: Option<&str>) -> Option<ItemKey> {
    let raw = raw?;
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}
