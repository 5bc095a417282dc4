use sha1::{Digest, Sha1};

const LONG_SCALE: u64 = 0xfffffffffffffff;

/// Salt for multivariate assignment, independent of the rollout hash.
pub const VARIANT_SALT: &str = "variant";

/// Calculates a deterministic hash value between 0 and 1 for a flag and identifier.
///
/// Given the same flag key and identifier it always returns the same float. These
/// floats are uniformly distributed between 0 and 1, so if we want to show this feature
/// to 20% of traffic we can do `calculate_hash(key, identifier, "") <= 0.2`.
///
/// The value comes from the first 15 hex characters of the SHA1 digest of
/// `"{flag_key}.{hashed_identifier}{salt}"`, which every client library computes the
/// same way.
pub fn calculate_hash(flag_key: &str, hashed_identifier: &str, salt: &str) -> f64 {
    let hash_key = format!("{flag_key}.{hashed_identifier}{salt}");
    let digest = Sha1::digest(hash_key.as_bytes());

    // The first 8 bytes shifted right by 4 bits are the first 15 hex characters
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash_val = u64::from_be_bytes(prefix) >> 4;

    hash_val as f64 / LONG_SCALE as f64
}
