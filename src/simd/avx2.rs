//! 256-bit x86 kernels (AVX2, plus F16C for float16).
//!
//! The 256-bit integer packs (`_mm256_packus_epi32`, `_mm256_packus_epi16`)
//! work within each 128-bit half, so every narrowing store is preceded by a
//! cross-lane permute that restores element order.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{kernel_table, Isa, Kernel};
use crate::probe::Feature;

/// Number of f32 elements in a 256-bit register.
pub(crate) const LANE_COUNT: usize = 8;

const RNE: i32 = _MM_FROUND_TO_NEAREST_INT | _MM_FROUND_NO_EXC;

pub static KERNELS: &[Kernel] = kernel_table! {
    Isa::Avx2, "avx2";
    F32ToF16 => f32_to_f16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2, Feature::F16c], preferred: false;
    F32ToF16 => f32_to_f16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Avx2, Feature::F16c], preferred: true;
    F16ToF32 => f16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2, Feature::F16c], preferred: true;
    F32ToBf16 => f32_to_bf16, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: false;
    F32ToBf16 => f32_to_bf16_cw, combined: true, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: true;
    Bf16ToF32 => bf16_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: true;
    F32ToU8Saturating => f32_to_u8_saturate, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: true;
    F32ToU8Narrowing => f32_to_u8_narrow, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: true;
    U8ToF32 => u8_to_f32, combined: false, lanes: LANE_COUNT,
        requires: &[Feature::Avx2], preferred: true;
};

#[inline(always)]
fn prefix(len: usize, unroll: usize) -> usize {
    let block = LANE_COUNT * unroll;
    len - len % block
}

/// Round-to-nearest-even bf16 bits of eight floats, right-aligned in each
/// 32-bit lane. NaN lanes keep their top half with the quiet bit set.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn bf16_bits(v: __m256) -> __m256i {
    let x = _mm256_castps_si256(v);
    let hi = _mm256_srli_epi32::<16>(x);
    let lsb = _mm256_and_si256(hi, _mm256_set1_epi32(1));
    let biased = _mm256_add_epi32(x, _mm256_set1_epi32(0x7FFF));
    let rounded = _mm256_srli_epi32::<16>(_mm256_add_epi32(biased, lsb));
    let quiet = _mm256_or_si256(hi, _mm256_set1_epi32(0x40));
    let nan = _mm256_castps_si256(_mm256_cmp_ps::<_CMP_UNORD_Q>(v, v));
    _mm256_blendv_epi8(rounded, quiet, nan)
}

/// Clamps to `[0, 255]` and rounds. NaN lanes clamp to 0.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn saturate(v: __m256) -> __m256i {
    let positive = _mm256_max_ps(v, _mm256_setzero_ps());
    let clamped = _mm256_min_ps(positive, _mm256_set1_ps(255.0));
    _mm256_cvtps_epi32(_mm256_round_ps::<RNE>(clamped))
}

/// Low byte of the rounded integer; NaN and out-of-range lanes give 0.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn wrap(v: __m256) -> __m256i {
    let rounded = _mm256_cvtps_epi32(_mm256_round_ps::<RNE>(v));
    _mm256_and_si256(rounded, _mm256_set1_epi32(0xFF))
}

/// Sixteen i32 lanes in `[0, 255]` packed to sixteen ordered bytes.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn pack_u8(a: __m256i, b: __m256i) -> __m128i {
    // words: a0-3 b0-3 | a4-7 b4-7, bytes repeat that per 128-bit half
    let words = _mm256_packus_epi32(a, b);
    let bytes = _mm256_packus_epi16(words, words);
    let ordered = _mm256_permutevar8x32_epi32(bytes, _mm256_setr_epi32(0, 4, 1, 5, 0, 4, 1, 5));
    _mm256_castsi256_si128(ordered)
}

/// Float32 to float16, one store per register.
///
/// # Safety
///
/// The CPU must support AVX2 and F16C.
#[target_feature(enable = "avx2,f16c")]
pub unsafe fn f32_to_f16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = _mm256_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm256_loadu_ps(s.add(at)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), half);
        }
    }
    end
}

/// Float32 to float16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support AVX2 and F16C.
#[target_feature(enable = "avx2,f16c")]
pub unsafe fn f32_to_f16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = _mm256_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm256_loadu_ps(s.add(at)));
            let hi = _mm256_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(_mm256_loadu_ps(
                s.add(at + LANE_COUNT),
            ));
            _mm256_storeu_si256(d.add(at).cast::<__m256i>(), _mm256_set_m128i(hi, lo));
        }
    }
    end
}

/// Float16 to float32.
///
/// # Safety
///
/// The CPU must support AVX2 and F16C.
#[target_feature(enable = "avx2,f16c")]
pub unsafe fn f16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let half = _mm_loadu_si128(s.add(at).cast::<__m128i>());
            _mm256_storeu_ps(d.add(at), _mm256_cvtph_ps(half));
        }
    }
    end
}

/// Float32 to bf16, one store per register.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn f32_to_bf16<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let bits = bf16_bits(_mm256_loadu_ps(s.add(at)));
            // qwords 0 and 2 hold the eight words in order
            let packed = _mm256_permute4x64_epi64::<0x08>(_mm256_packus_epi32(bits, bits));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), _mm256_castsi256_si128(packed));
        }
    }
    end
}

/// Float32 to bf16, two registers merged into one full-width store.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn f32_to_bf16_cw<const UNROLL: usize>(src: &[f32], dst: &mut [u16]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let lo = bf16_bits(_mm256_loadu_ps(s.add(at)));
            let hi = bf16_bits(_mm256_loadu_ps(s.add(at + LANE_COUNT)));
            let packed = _mm256_permute4x64_epi64::<0xD8>(_mm256_packus_epi32(lo, hi));
            _mm256_storeu_si256(d.add(at).cast::<__m256i>(), packed);
        }
    }
    end
}

/// Bf16 to float32.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn bf16_to_f32<const UNROLL: usize>(src: &[u16], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in 0..UNROLL {
            let at = i + u * LANE_COUNT;
            let words = _mm256_cvtepu16_epi32(_mm_loadu_si128(s.add(at).cast::<__m128i>()));
            _mm256_storeu_si256(d.add(at).cast::<__m256i>(), _mm256_slli_epi32::<16>(words));
        }
    }
    end
}

/// Float32 to u8, clamped to `[0, 255]`.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn f32_to_u8_saturate<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let a = saturate(_mm256_loadu_ps(s.add(at)));
            let b = saturate(_mm256_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), pack_u8(a, b));
        }
    }
    end
}

/// Float32 to u8, low byte of the rounded integer.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn f32_to_u8_narrow<const UNROLL: usize>(src: &[f32], dst: &mut [u8]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let a = wrap(_mm256_loadu_ps(s.add(at)));
            let b = wrap(_mm256_loadu_ps(s.add(at + LANE_COUNT)));
            _mm_storeu_si128(d.add(at).cast::<__m128i>(), pack_u8(a, b));
        }
    }
    end
}

/// U8 to float32.
///
/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn u8_to_f32<const UNROLL: usize>(src: &[u8], dst: &mut [f32]) -> usize {
    assert_eq!(src.len(), dst.len(), "Buffers must be the same length");
    let end = prefix(src.len(), UNROLL);
    let (s, d) = (src.as_ptr(), dst.as_mut_ptr());

    for i in (0..end).step_by(LANE_COUNT * UNROLL) {
        for u in (0..UNROLL).step_by(2) {
            let at = i + u * LANE_COUNT;
            let bytes = _mm_loadu_si128(s.add(at).cast::<__m128i>());
            let lo = _mm256_cvtepi32_ps(_mm256_cvtepu8_epi32(bytes));
            let hi = _mm256_cvtepi32_ps(_mm256_cvtepu8_epi32(_mm_srli_si128::<8>(bytes)));
            _mm256_storeu_ps(d.add(at), lo);
            _mm256_storeu_ps(d.add(at + LANE_COUNT), hi);
        }
    }
    end
}
