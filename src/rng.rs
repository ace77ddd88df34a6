//! Per-chain deterministic seed derivation.

/// Derive a chain seed from a master seed and the chain index
/// (splitmix64 finalizer), so no two chains in a bin share a stream.
pub fn chain_seed(master: u64, chain_id: usize) -> u64 {
    let mut x = master ^ (chain_id as u64).wrapping_mul(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}
