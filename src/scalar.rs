//! Portable reference conversions.
//!
//! These functions define correct output for every conversion direction; each
//! vector kernel in [`crate::simd`] must reproduce them bit for bit. All of
//! them are total: every input bit pattern has a defined result.

use crate::layout::{Fields, BF16, F16, F32};

/// How `f32 -> u8` treats rounded values outside `[0, 255]`.
///
/// There is no default: the caller picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum U8Policy {
    /// Clamp to `[0, 255]`. NaN becomes 0.
    Saturating,
    /// Keep the low 8 bits of the rounded integer (wraps modulo 256).
    /// NaN, infinities and magnitudes of `2^31` and above become 0.
    Narrowing,
}

impl std::fmt::Display for U8Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            U8Policy::Saturating => write!(f, "saturate"),
            U8Policy::Narrowing => write!(f, "narrow"),
        }
    }
}

/// Largest float32 exponent field that flushes to a signed zero half.
const F16_UNDERFLOW_EXP: u32 = 101;
/// Smallest float32 exponent field that maps to a normal half.
const F16_NORMAL_EXP: u32 = 113;
/// `F32.bias - F16.bias`
const F16_REBIAS: u32 = 112;

/// Round-to-nearest-even of `value >> shift`, for `1 <= shift <= 24`.
#[inline(always)]
fn shift_right_rne(value: u32, shift: u32) -> u32 {
    let round_bit = (value >> (shift - 1)) & 1;
    let sticky = (value & ((1 << (shift - 1)) - 1) != 0) as u32;
    let kept = value >> shift;
    kept + (round_bit & (sticky | (kept & 1)))
}

/// Converts an `f32` to IEEE binary16 bits with round-to-nearest-even.
#[inline]
pub fn f32_to_f16(value: f32) -> u16 {
    let Fields {
        sign,
        exponent,
        mantissa,
    } = F32.unpack(value.to_bits());
    let signed = sign << 15;

    if exponent == F32.exponent_max() {
        if mantissa == 0 {
            return F16.infinity(sign) as u16;
        }
        // Quiet bit forced, top payload bits kept.
        return (signed | 0x7C00 | F16.quiet_bit() | (mantissa >> 13)) as u16;
    }

    if exponent >= F16_NORMAL_EXP {
        let half_exp = exponent - F16_REBIAS;
        if half_exp >= F16.exponent_max() {
            return F16.infinity(sign) as u16;
        }
        // A mantissa carry ripples into the exponent, up to infinity.
        let rounded = (half_exp << 10) + shift_right_rne(mantissa, 13);
        if rounded >= 0x7C00 {
            return F16.infinity(sign) as u16;
        }
        return (signed | rounded) as u16;
    }

    if exponent > F16_UNDERFLOW_EXP {
        // Subnormal half: restore the implicit one and denormalize. A carry
        // out of the 10-bit field lands exactly on the smallest normal.
        let shift = 126 - exponent;
        let half_mantissa = shift_right_rne(mantissa | 0x80_0000, shift);
        return (signed | half_mantissa) as u16;
    }

    signed as u16
}

/// Converts IEEE binary16 bits to `f32`. Exact; NaNs come back quiet.
#[inline]
pub fn f16_to_f32(half: u16) -> f32 {
    let Fields {
        sign,
        exponent,
        mantissa,
    } = F16.unpack(half as u32);

    let bits = if exponent == F16.exponent_max() {
        let quiet = if mantissa != 0 { F32.quiet_bit() } else { 0 };
        F32.pack(Fields {
            sign,
            exponent: F32.exponent_max(),
            mantissa: (mantissa << 13) | quiet,
        })
    } else if exponent == 0 {
        if mantissa == 0 {
            sign << 31
        } else {
            // Bring the leading one up to bit 10, then drop it.
            let shift = mantissa.leading_zeros() - 21;
            F32.pack(Fields {
                sign,
                exponent: F16_NORMAL_EXP - shift,
                mantissa: ((mantissa << shift) & F16.mantissa_mask()) << 13,
            })
        }
    } else {
        F32.pack(Fields {
            sign,
            exponent: exponent + F16_REBIAS,
            mantissa: mantissa << 13,
        })
    };

    f32::from_bits(bits)
}

/// Converts an `f32` to bf16 bits with round-to-nearest-even.
#[inline]
pub fn f32_to_bf16(value: f32) -> u16 {
    let bits = value.to_bits();
    let hi = bits >> 16;
    let lo = bits & 0xFFFF;

    if F32.is_nan(bits) {
        return (hi | BF16.quiet_bit()) as u16;
    }

    // Halfway rounds up only when the kept LSB is odd.
    let threshold = 0x8000 - (hi & 1);
    (hi + (lo > threshold) as u32) as u16
}

/// Converts bf16 bits to `f32`. A plain 16-bit shift, always exact.
#[inline(always)]
pub fn bf16_to_f32(bf16: u16) -> f32 {
    f32::from_bits((bf16 as u32) << 16)
}

/// `2^31`: every finite `f32` at or above this magnitude is a multiple of 256.
const I32_LIMIT: f32 = 2_147_483_648.0;

/// Converts an `f32` to `u8`, rounding half to even, under the given policy.
#[inline]
pub fn f32_to_u8(value: f32, policy: U8Policy) -> u8 {
    let rounded = value.round_ties_even();
    match policy {
        U8Policy::Saturating => {
            if rounded.is_nan() {
                0
            } else {
                rounded.clamp(0.0, 255.0) as u8
            }
        }
        U8Policy::Narrowing => {
            if rounded.is_nan() || rounded.abs() >= I32_LIMIT {
                0
            } else {
                rounded as i32 as u8
            }
        }
    }
}

/// Widens a `u8` to `f32`. Exact.
#[inline(always)]
pub fn u8_to_f32(value: u8) -> f32 {
    value as f32
}

#[inline(always)]
fn map_slice<S: Copy, D>(src: &[S], dst: &mut [D], f: impl Fn(S) -> D) {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f(s);
    }
}

pub fn f32_to_f16_slice(src: &[f32], dst: &mut [u16]) {
    map_slice(src, dst, f32_to_f16)
}

pub fn f16_to_f32_slice(src: &[u16], dst: &mut [f32]) {
    map_slice(src, dst, f16_to_f32)
}

pub fn f32_to_bf16_slice(src: &[f32], dst: &mut [u16]) {
    map_slice(src, dst, f32_to_bf16)
}

pub fn bf16_to_f32_slice(src: &[u16], dst: &mut [f32]) {
    map_slice(src, dst, bf16_to_f32)
}

pub fn f32_to_u8_slice(src: &[f32], dst: &mut [u8], policy: U8Policy) {
    map_slice(src, dst, |v| f32_to_u8(v, policy))
}

pub fn u8_to_f32_slice(src: &[u8], dst: &mut [f32]) {
    map_slice(src, dst, u8_to_f32)
}
