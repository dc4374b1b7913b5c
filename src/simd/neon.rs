//! 128-bit AArch64 kernels (Advanced SIMD).
//!
//! The float16 converts are written with `fcvtn`/`fcvtn2`/`fcvtl` through
//! `asm!`, since the half-precision NEON intrinsics are not stable. Those
//! kernels are registered as requiring FEAT_FP16 as well as NEON.

use std::arch::aarch64::*;
use std::arch::asm;

use super::{kernel_table, Isa, Kernel};
use crate::probe::Feature;

/// Number of f32 elements in a 128-bit register.
pub(crate) const LANE_COUNT: usize = 4;

/// `2^31`
const I32_LIMIT: f32 = 2_147_483_648.0;

pub static KERNELS: &[Kernel] = kernel_table! {
    Isa::Neon, "neon";
    F32ToF16 => f32_to_f16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon, Feature::Fp16], preferred: false;
    F32ToF16 => f32_to_f16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Neon, Feature::Fp16], preferred: true;
    F16ToF32 => f16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon, Feature::Fp16], preferred: true;
    F32ToBf16 => f32_to_bf16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: false;
    F32ToBf16 => f32_to_bf16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: true;
    Bf16ToF32 => bf16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: true;
    F32ToU8Saturating => f32_to_u8_saturate, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: true;
    F32ToU8Narrowing => f32_to_u8_narrow, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: true;
    U8ToF32 => u8_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Neon], preferred: true;
};

#[inline(always)]
fn prefix(len: usize, unroll: usize) -> usize {
    let block = LANE_COUNT * unroll;
    len - len % block
}

/// Four halves from four floats (`fcvtn`, current FPCR rounding: nearest even).
#[inline]
#[target_feature(enable = "neon")]
unsafe fn narrow_f16(v: float32x4_t) -> uint16x4_t {
    let half: uint16x4_t;
    asm!(
        "fcvtn {half:v}.4h, {v:v}.4s",
        v = in(vreg) v,
        half = out(vreg) half,
        options(pure, nomem, nostack, preserves_flags),
    );
    half
}

/// Eight halves from two registers in one destination (`fcvtn` + `fcvtn2`).
#[inline]
#[target_feature(enable = "neon")]
unsafe fn narrow_f16_pair(lo: float32x4_t, hi: float32x4_t) -> uint16x8_t {
    let half: uint16x8_t;
    asm!(
        "fcvtn {half:v}.4h, {lo:v}.4s",
        "fcvtn2 {half:v}.8h, {hi:v}.4s",
        lo = in(vreg) lo,
        hi = in(vreg) hi,
        half = out(vreg) half,
        options(pure, nomem, nostack, preserves_flags),
    );
    half
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn widen_f16(half: uint16x4_t) -> float32x4_t {
    let v: float32x4_t;
    asm!(
        "fcvtl {v:v}.4s, {half:v}.4h",
        half = in(vreg) half,
        v = out(vreg) v,
        options(pure, nomem, nostack, preserves_flags),
    );
    v
}

/// Round-to-nearest-even bf16 bits of four floats, right-aligned in each
/// 32-bit lane. NaN lanes keep their top half with the quiet bit set.
#[inline]
#[target_feature(enable = "neon")]
unsafe fn bf16_bits(v: float32x4_t) -> uint32x4_t {
    let x = vreinterpretq_u32_f32(v);
    let hi = vshrq_n_u32::<16>(x);
    let lsb = vandq_u32(hi, vdupq_n_u32(1));
    let biased = vaddq_u32(x, vdupq_n_u32(0x7FFF));
    let rounded = vshrq_n_u32::<16>(vaddq_u32(biased, lsb));
    let quiet = vorrq_u32(hi, vdupq_n_u32(0x40));
    let nan = vmvnq_u32(vceqq_f32(v, v));
    vbslq_u32(nan, quiet, rounded)
}

/// Float32 to float16, one store per register.
///
/// # Safety
///
/// The CPU must support NEON and FEAT_FP16.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_f16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            vst1_u16(d.add(at), narrow_f16(vld1q_f32(s.add(at))));
        }
    }
    end
}

/// Float32 to float16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support NEON and FEAT_FP16.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_f16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let half = narrow_f16_pair(vld1q_f32(s.add(at)), vld1q_f32(s.add(at + LANE_COUNT)));
            vst1q_u16(d.add(at), half);
        }
    }
    end
}

/// Float16 to float32.
///
/// # Safety
///
/// The CPU must support NEON and FEAT_FP16.
#[target_feature(enable = "neon")]
pub unsafe fn f16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            vst1q_f32(d.add(at), widen_f16(vld1_u16(s.add(at))));
        }
    }
    end
}

/// Float32 to bf16, one store per register.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_bf16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let bits = bf16_bits(vld1q_f32(s.add(at)));
            vst1_u16(d.add(at), vmovn_u32(bits));
        }
    }
    end
}

/// Float32 to bf16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_bf16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = bf16_bits(vld1q_f32(s.add(at)));
            let hi = bf16_bits(vld1q_f32(s.add(at + LANE_COUNT)));
            vst1q_u16(d.add(at), vmovn_high_u32(vmovn_u32(lo), hi));
        }
    }
    end
}

/// Bf16 to float32.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn bf16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let words = vshlq_n_u32::<16>(vmovl_u16(vld1_u16(s.add(at))));
            vst1q_u32(d.add(at).cast::<u32>(), words);
        }
    }
    end
}

/// Float32 to u8, clamped to `[0, 255]`.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_u8_saturate<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            // fcvtns saturates to i32 and maps NaN to 0; the narrows saturate the rest
            let a = vqmovun_s32(vcvtnq_s32_f32(vld1q_f32(s.add(at))));
            let b = vqmovun_s32(vcvtnq_s32_f32(vld1q_f32(s.add(at + LANE_COUNT))));
            vst1_u8(d.add(at), vqmovn_u16(vcombine_u16(a, b)));
        }
    }
    end
}

/// Float32 to u8, low byte of the rounded integer.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn f32_to_u8_narrow<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());
    let limit = vdupq_n_f32(I32_LIMIT);

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let x = vld1q_f32(s.add(at));
            let y = vld1q_f32(s.add(at + LANE_COUNT));
            // |v| < 2^31 is false for NaN, infinities and saturated lanes
            let a = vreinterpretq_u32_s32(vcvtnq_s32_f32(x));
            let b = vreinterpretq_u32_s32(vcvtnq_s32_f32(y));
            let a = vmovn_u32(vandq_u32(a, vcaltq_f32(x, limit)));
            let b = vmovn_u32(vandq_u32(b, vcaltq_f32(y, limit)));
            vst1_u8(d.add(at), vmovn_u16(vcombine_u16(a, b)));
        }
    }
    end
}

/// U8 to float32.
///
/// # Safety
///
/// The CPU must support NEON.
#[target_feature(enable = "neon")]
pub unsafe fn u8_to_f32<const UNROLL: usize>(src: &[u8], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let words = vmovl_u8(vld1_u8(s.add(at)));
            let lo = vcvtq_f32_u32(vmovl_u16(vget_low_u16(words)));
            let hi = vcvtq_f32_u32(vmovl_high_u16(words));
            vst1q_f32(d.add(at), lo);
            vst1q_f32(d.add(at + LANE_COUNT), hi);
        }
    }
    end
}
