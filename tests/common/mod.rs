//! Shared input generators for the integration tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::Rng;

/// Bit patterns every conversion test should see: signed zeros, infinities,
/// quiet and signaling NaNs, subnormals, and values on rounding boundaries.
pub const SPECIAL_F32_BITS: [u32; 22] = [
    0x0000_0000, // +0
    0x8000_0000, // -0
    0x7F80_0000, // +inf
    0xFF80_0000, // -inf
    0x7FC0_0000, // quiet NaN
    0x7F80_0001, // signaling NaN
    0xFFA0_1234, // negative signaling NaN with payload
    0x0000_0001, // smallest f32 subnormal
    0x3300_0000, // 2^-25, f16 tie to zero
    0x3300_0001, // just above 2^-25
    0x33C0_0000, // 1.5 * 2^-24
    0x387F_FFFF, // just below the smallest normal f16
    0x477F_E000, // 65504, largest f16
    0x477F_EFFF, // rounds down to 65504
    0x477F_F000, // 65520, rounds to f16 infinity
    0x3F80_8000, // bf16 tie, even
    0x3F81_8000, // bf16 tie, odd
    0x7F7F_FFFF, // f32::MAX
    0x437F_6666, // 255.4
    0x437F_9999, // 255.6
    0x4F00_0000, // 2^31
    0xCF00_0000, // -2^31
];

/// Random floats: a mix of special values, arbitrary bit patterns and
/// ordinary values in the u8 and f16 ranges.
pub fn random_floats(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len)
        .map(|_| match rng.random_range(0..5) {
            0 => f32::from_bits(SPECIAL_F32_BITS[rng.random_range(0..SPECIAL_F32_BITS.len())]),
            1 => f32::from_bits(rng.random::<u32>()),
            2 => rng.random_range(-300.0f32..600.0),
            3 => rng.random_range(-2.0f32..2.0) * 1e-5,
            _ => rng.random_range(-70000.0f32..70000.0),
        })
        .collect()
}

pub fn random_u16(rng: &mut StdRng, len: usize) -> Vec<u16> {
    (0..len).map(|_| rng.random::<u16>()).collect()
}

pub fn random_u8(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random::<u8>()).collect()
}
