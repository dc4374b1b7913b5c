//! 128-bit x86 kernels (SSE4.1, plus F16C for float16).
//!
//! `_mm_packus_epi32`, `_mm_blendv_epi8` and `_mm_round_ps` are the SSE4.1
//! pieces; the float16 converts are the 128-bit forms of the F16C instructions.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{kernel_table, Isa, Kernel};
use crate::probe::Feature;

/// Number of f32 elements in a 128-bit register.
pub(crate) const LANE_COUNT: usize = 4;

const RNE: i32 = _MM_FROUND_TO_NEAREST_INT | _MM_FROUND_NO_EXC;

pub static KERNELS: &[Kernel] = kernel_table! {
    Isa::Sse41, "sse41";
    F32ToF16 => f32_to_f16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41, Feature::F16c], preferred: false;
    F32ToF16 => f32_to_f16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Sse41, Feature::F16c], preferred: true;
    F16ToF32 => f16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41, Feature::F16c], preferred: true;
    F32ToBf16 => f32_to_bf16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: false;
    F32ToBf16 => f32_to_bf16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: true;
    Bf16ToF32 => bf16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: true;
    F32ToU8Saturating => f32_to_u8_saturate, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: true;
    F32ToU8Narrowing => f32_to_u8_narrow, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: true;
    U8ToF32 => u8_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Sse41], preferred: true;
};

/// Length of the prefix a kernel with this unroll converts.
#[inline(always)]
fn prefix(len: usize, unroll: usize) -> usize {
    let block = LANE_COUNT * unroll;
    len - len % block
}

/// Round-to-nearest-even bf16 bits of four floats, right-aligned in each
/// 32-bit lane. NaN lanes keep their top half with the quiet bit set.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn bf16_bits(v: __m128) -> __m128i {
    let x = _mm_castps_si128(v);
    let hi = _mm_srli_epi32::<16>(x);
    let lsb = _mm_and_si128(hi, _mm_set1_epi32(1));
    let biased = _mm_add_epi32(x, _mm_set1_epi32(0x7FFF));
    let rounded = _mm_srli_epi32::<16>(_mm_add_epi32(biased, lsb));
    let quiet = _mm_or_si128(hi, _mm_set1_epi32(0x40));
    let nan = _mm_castps_si128(_mm_cmpunord_ps(v, v));
    _mm_blendv_epi8(rounded, quiet, nan)
}

/// Rounded i32 lanes of two registers, packed to eight u8 in the low half.
/// Lanes must already be in `[0, 255]`.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn pack_u8(a: __m128i, b: __m128i) -> __m128i {
    let words = _mm_packus_epi32(a, b);
    _mm_packus_epi16(words, words)
}

/// Clamps to `[0, 255]` and rounds. `max_ps` returns its second operand for
/// NaN, so NaN lanes clamp to 0.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn saturate(v: __m128) -> __m128i {
    let clamped = _mm_min_ps(_mm_max_ps(v, _mm_setzero_ps()), _mm_set1_ps(255.0));
    _mm_cvtps_epi32(_mm_round_ps::<RNE>(clamped))
}

/// Low byte of the rounded integer. NaN and out-of-range lanes convert to
/// `i32::MIN`, whose low byte is 0.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn wrap(v: __m128) -> __m128i {
    let rounded = _mm_cvtps_epi32(_mm_round_ps::<RNE>(v));
    _mm_and_si128(rounded, _mm_set1_epi32(0xFF))
}

/// Float32 to float16, one store per register.
///
/// # Safety
///
/// The CPU must support SSE4.1 and F16C.
#[target_feature(enable = "sse4.1,f16c")]
pub unsafe fn f32_to_f16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = _mm_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm_loadu_ps(s.add(at)));
            _mm_storel_epi64(d.add(at).cast::<__m128i>(), half);
        }
    }
    end
}

/// Float32 to float16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support SSE4.1 and F16C.
#[target_feature(enable = "sse4.1,f16c")]
pub unsafe fn f32_to_f16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = _mm_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm_loadu_ps(s.add(at)));
            let hi =
                _mm_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm_unpacklo_epi64(lo, hi));
        }
    }
    end
}

/// Float16 to float32.
///
/// # Safety
///
/// The CPU must support SSE4.1 and F16C.
#[target_feature(enable = "sse4.1,f16c")]
pub unsafe fn f16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = _mm_loadl_epi64(s.add(at).cast::<__m128i>());
            _mm_storeu_ps(d.add(at), _mm_cvtph_ps(half));
        }
    }
    end
}

/// Float32 to bf16, one store per register.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn f32_to_bf16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let bits = bf16_bits(_mm_loadu_ps(s.add(at)));
            _mm_storel_epi64(d.add(at).cast::<__m128i>(), _mm_packus_epi32(bits, bits));
        }
    }
    end
}

/// Float32 to bf16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn f32_to_bf16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = bf16_bits(_mm_loadu_ps(s.add(at)));
            let hi = bf16_bits(_mm_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm_packus_epi32(lo, hi));
        }
    }
    end
}

/// Bf16 to float32.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn bf16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let words = _mm_cvtepu16_epi32(_mm_loadl_epi64(s.add(at).cast::<__m128i>()));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm_slli_epi32::<16>(words));
        }
    }
    end
}

/// Float32 to u8, clamped to `[0, 255]`.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn f32_to_u8_saturate<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let a = saturate(_mm_loadu_ps(s.add(at)));
            let b = saturate(_mm_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storel_epi64(d.add(at).cast::<__m128i>(), pack_u8(a, b));
        }
    }
    end
}

/// Float32 to u8, low byte of the rounded integer.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn f32_to_u8_narrow<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let a = wrap(_mm_loadu_ps(s.add(at)));
            let b = wrap(_mm_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storel_epi64(d.add(at).cast::<__m128i>(), pack_u8(a, b));
        }
    }
    end
}

/// U8 to float32.
///
/// # Safety
///
/// The CPU must support SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn u8_to_f32<const UNROLL: usize>(src: &[u8], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let bytes = _mm_loadl_epi64(s.add(at).cast::<__m128i>());
            let lo = _mm_cvtepi32_ps(_mm_cvtepu8_epi32(bytes));
            let hi = _mm_cvtepi32_ps(_mm_cvtepu8_epi32(_mm_srli_si128::<4>(bytes)));
            _mm_storeu_ps(d.add(at), lo);
            _mm_storeu_ps(d.add(at + LANE_COUNT), hi);
        }
    }
    end
}
