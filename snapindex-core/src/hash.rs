//! Routing hash functions
//!
//! Two hashes live here and they are deliberately not interchangeable:
//!
//! - [`engine_shard`] is the search engine's own document-routing hash (a
//!   DJB-style multiplicative hash). The routing table in
//!   [`crate::routing::ShardRoutingV1`] reverse-engineers this hash to
//!   produce hint strings that land on a chosen shard, so it must match the
//!   engine bit for bit: 64-bit accumulation, truncation to 32 bits, then
//!   `abs` of the remainder.
//! - [`murmur3_32`] disperses tenant and document ids across the shard ring.
//!   It only has to agree with itself (both writers and readers of an index
//!   go through this crate), but it is pinned here for the same reason the
//!   engine hash is: a published index is immutable and re-routing it is not
//!   an option.

/// The engine's DJB document-routing hash over a routing string.
///
/// Returns the raw 64-bit accumulator; use [`engine_shard`] to reduce it to
/// a shard number the way the engine does.
pub fn djb_hash(value: &str) -> i64 {
    let mut hash: i64 = 5381;
    for c in value.chars() {
        hash = (hash.wrapping_shl(5).wrapping_add(hash)).wrapping_add(c as i64);
    }
    hash
}

/// Shard number the engine will route `value` to, out of `num_shards`.
///
/// The engine truncates the accumulator to 32 bits before reducing, so we
/// must too.
pub fn engine_shard(value: &str, num_shards: u32) -> u32 {
    let h = djb_hash(value) as i32;
    (h % num_shards as i32).unsigned_abs()
}

/// Murmur3 32-bit (x86 variant), seed 0 unless stated otherwise.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k |= (b as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Reduce a murmur hash of `value` into `[0, modulus)`.
pub fn murmur_mod(value: &str, modulus: u32) -> u32 {
    (murmur3_32(value.as_bytes(), 0) as i32).unsigned_abs() % modulus
}
