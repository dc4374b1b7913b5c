//! 512-bit x86 kernels (AVX-512F, plus F16C for float16).
//!
//! Compiled only when the toolchain exposes the AVX-512 intrinsics (see
//! `build.rs`). The down-converts (`vpmovdw`, `vpmovdb`) truncate each lane,
//! so no cross-lane fix-up is needed after packing.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{kernel_table, Isa, Kernel};
use crate::probe::Feature;

/// Number of f32 elements in a 512-bit register.
pub(crate) const LANE_COUNT: usize = 16;

const RNE: i32 = _MM_FROUND_TO_NEAREST_INT | _MM_FROUND_NO_EXC;

pub static KERNELS: &[Kernel] = kernel_table! {
    Isa::Avx512, "avx512";
    F32ToF16 => f32_to_f16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f, Feature::F16c], preferred: false;
    F32ToF16 => f32_to_f16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f, Feature::F16c], preferred: true;
    F16ToF32 => f16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f, Feature::F16c], preferred: true;
    F32ToBf16 => f32_to_bf16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: false;
    F32ToBf16 => f32_to_bf16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: true;
    Bf16ToF32 => bf16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: true;
    F32ToU8Saturating => f32_to_u8_saturate, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: true;
    F32ToU8Narrowing => f32_to_u8_narrow, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: true;
    U8ToF32 => u8_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx512f], preferred: true;
};

#[inline(always)]
fn prefix(len: usize, unroll: usize) -> usize {
    let block = LANE_COUNT * unroll;
    len - len % block
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn f16_bits(v: __m512) -> __m256i {
    _mm512_cvtps_ph::<RNE>(v)
}

/// Sixteen bf16 values, rounded to nearest even. NaN lanes keep their top
/// half with the quiet bit set.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn bf16_bits(v: __m512) -> __m256i {
    let x = _mm512_castps_si512(v);
    let hi = _mm512_srli_epi32::<16>(x);
    let lsb = _mm512_and_si512(hi, _mm512_set1_epi32(1));
    let biased = _mm512_add_epi32(x, _mm512_set1_epi32(0x7FFF));
    let rounded = _mm512_srli_epi32::<16>(_mm512_add_epi32(biased, lsb));
    let quiet = _mm512_or_si512(hi, _mm512_set1_epi32(0x40));
    let nan = _mm512_cmp_ps_mask::<_CMP_UNORD_Q>(v, v);
    _mm512_cvtepi32_epi16(_mm512_mask_blend_epi32(nan, rounded, quiet))
}

/// Two 256-bit halves as one 512-bit register, `lo` first in memory.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn combine(lo: __m256i, hi: __m256i) -> __m512i {
    _mm512_inserti64x4::<1>(_mm512_castsi256_si512(lo), hi)
}

/// Float32 to float16, one store per register.
///
/// # Safety
///
/// The CPU must support AVX-512F and F16C.
#[target_feature(enable = "avx512f,f16c")]
pub unsafe fn f32_to_f16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = f16_bits(_mm512_loadu_ps(s.add(at)));
            _mm256_storeu_si256(d.add(at).cast::<__m256i>(), half);
        }
    }
    end
}

/// Float32 to float16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support AVX-512F and F16C.
#[target_feature(enable = "avx512f,f16c")]
pub unsafe fn f32_to_f16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = f16_bits(_mm512_loadu_ps(s.add(at)));
            let hi = f16_bits(_mm512_loadu_ps(s.add(at + LANE_COUNT)));
            _mm512_storeu_epi32(d.add(at).cast::<i32>(), combine(lo, hi));
        }
    }
    end
}

/// Float16 to float32.
///
/// # Safety
///
/// The CPU must support AVX-512F and F16C.
#[target_feature(enable = "avx512f,f16c")]
pub unsafe fn f16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = _mm256_loadu_si256(s.add(at).cast::<__m256i>());
            _mm512_storeu_ps(d.add(at), _mm512_cvtph_ps(half));
        }
    }
    end
}

/// Float32 to bf16, one store per register.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn f32_to_bf16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let bits = bf16_bits(_mm512_loadu_ps(s.add(at)));
            _mm256_storeu_si256(d.add(at).cast::<__m256i>(), bits);
        }
    }
    end
}

/// Float32 to bf16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn f32_to_bf16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = bf16_bits(_mm512_loadu_ps(s.add(at)));
            let hi = bf16_bits(_mm512_loadu_ps(s.add(at + LANE_COUNT)));
            _mm512_storeu_epi32(d.add(at).cast::<i32>(), combine(lo, hi));
        }
    }
    end
}

/// Bf16 to float32.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn bf16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let words = _mm512_cvtepu16_epi32(_mm256_loadu_si256(s.add(at).cast::<__m256i>()));
            _mm512_storeu_epi32(d.add(at).cast::<i32>(), _mm512_slli_epi32::<16>(words));
        }
    }
    end
}

/// Float32 to u8, clamped to `[0, 255]`.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn f32_to_u8_saturate<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());
    let zero = _mm512_setzero_ps();
    let max = _mm512_set1_ps(255.0);

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            // max_ps returns its second operand for NaN, so NaN clamps to 0
            let clamped = _mm512_min_ps(_mm512_max_ps(_mm512_loadu_ps(s.add(at)), zero), max);
            let rounded = _mm512_cvt_roundps_epi32::<RNE>(clamped);
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm512_cvtepi32_epi8(rounded));
        }
    }
    end
}

/// Float32 to u8, low byte of the rounded integer.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn f32_to_u8_narrow<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            // NaN and out-of-range lanes convert to i32::MIN; vpmovdb keeps the low byte
            let rounded = _mm512_cvt_roundps_epi32::<RNE>(_mm512_loadu_ps(s.add(at)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm512_cvtepi32_epi8(rounded));
        }
    }
    end
}

/// U8 to float32.
///
/// # Safety
///
/// The CPU must support AVX-512F.
#[target_feature(enable = "avx512f")]
pub unsafe fn u8_to_f32<const UNROLL: usize>(src: &[u8], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let bytes = _mm_loadu_si128(s.add(at).cast::<__m128i>());
            _mm512_storeu_ps(d.add(at), _mm512_cvtepi32_ps(_mm512_cvtepu8_epi32(bytes)));
        }
    }
    end
}
