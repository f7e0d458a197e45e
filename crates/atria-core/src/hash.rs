//! The hash oracle.
//!
//! A fixed 32-bit integer avalanche mix (Thomas Wang) reduced to a bounded
//! index. It must never be seeded or randomized: two nodes agree on a cell
//! only because they evaluate exactly this function on exactly the same key.

use std::num::NonZeroU16;

use crate::{NodeAddress, LINK_KEY_STRIDE};

/// 32-bit integer mix.
#[inline]
pub const fn mix(value: u32) -> u32 {
    let mut a = value;
    a = (a ^ 61) ^ (a >> 16);
    a = a.wrapping_add(a << 3);
    a ^= a >> 4;
    a = a.wrapping_mul(0x27d4_eb2d);
    a ^= a >> 15;
    a
}

/// Map `key` to an index in `0..modulus`.
///
/// The mix is truncated to 16 bits before reduction so every node computes
/// the same index regardless of its native word size.
#[inline]
pub const fn hash(key: u32, modulus: NonZeroU16) -> u16 {
    (mix(key) as u16) % modulus.get()
}

/// [`hash`] for an unchecked modulus. A zero modulus yields `None`.
#[inline]
pub const fn try_hash(key: u32, modulus: u16) -> Option<u16> {
    match NonZeroU16::new(modulus) {
        Some(m) => Some(hash(key, m)),
        None => None,
    }
}

/// Combine an ordered address pair into a link key.
///
/// `link_key(a, b) != link_key(b, a)` in general: the order carries the
/// traffic direction.
#[inline]
pub const fn link_key(from: &NodeAddress, to: &NodeAddress) -> u32 {
    from.node_id() as u32 + LINK_KEY_STRIDE * to.node_id() as u32
}
