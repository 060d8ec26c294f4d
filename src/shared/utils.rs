//! Utility functions and helpers

use base64::Engine;

use crate::shared::errors::SwapError;

/// Format a base-unit amount with proper decimals
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let value = amount as f64 / 10_f64.powi(decimals as i32);
    format!("{:.6}", value)
}

/// Convert a UI amount to base units (floor).
pub fn to_base_units(amount: f64, decimals: u8) -> u64 {
    (amount * 10_f64.powi(decimals as i32)) as u64
}

/// Generate unique run ID
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Derive the planner RNG seed from a run id. Identical run ids always
/// yield identical seeds.
pub fn seed_from_run_id(run_id: &str) -> u64 {
    // FNV-1a over the id bytes; no cryptographic requirement here.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in run_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x1000_0000_01b3);
    }
    hash
}

/// Normalize a wallet private key to base58.
///
/// The aggregator only accepts base58; callers occasionally hold keys in
/// base64 form, which is converted here at a single edge. A 64-byte
/// decoded payload is required either way.
pub fn normalize_private_key(key: &str) -> Result<String, SwapError> {
    if let Ok(bytes) = bs58::decode(key).into_vec() {
        if bytes.len() == 64 {
            return Ok(key.to_string());
        }
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(key)
        .map_err(|_| SwapError::Signature("private key is neither base58 nor base64".into()))?;
    if bytes.len() != 64 {
        return Err(SwapError::Signature(format!(
            "decoded private key has {} bytes, expected 64",
            bytes.len()
        )));
    }
    Ok(bs58::encode(bytes).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unit_conversion_round_trips() {
        assert_eq!(to_base_units(0.1, 9), 100_000_000);
        assert_eq!(to_base_units(1.0, 6), 1_000_000);
        assert_eq!(format_amount(100_000_000, 9), "0.100000");
    }

    #[test]
    fn seed_is_stable_per_run_id() {
        let a = seed_from_run_id("run-1");
        let b = seed_from_run_id("run-1");
        let c = seed_from_run_id("run-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn base58_key_passes_through() {
        let bytes = [7u8; 64];
        let b58 = bs58::encode(bytes).into_string();
        assert_eq!(normalize_private_key(&b58).unwrap(), b58);
    }

    #[test]
    fn base64_key_converts_to_base58() {
        let bytes = [9u8; 64];
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        let normalized = normalize_private_key(&b64).unwrap();
        assert_eq!(bs58::decode(&normalized).into_vec().unwrap(), bytes);
    }

    #[test]
    fn malformed_key_is_rejected() {
        assert!(normalize_private_key("not-a-key!!").is_err());
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(normalize_private_key(&short).is_err());
    }
}
