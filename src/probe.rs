//! Runtime CPU capability probe.
//!
//! [`Capabilities::detect`] takes one immutable snapshot of the extensions the
//! kernels care about. The snapshot is a plain value: build it once at startup
//! and hand it to [`crate::Dispatcher`]. Invoking a kernel whose features are
//! not in the snapshot is undefined behavior (typically `SIGILL`).

use std::fmt;
use std::str::FromStr;

use crate::error::CastError;

/// An instruction-set extension a kernel may require.
///
/// `Avx512bw`, `Avx512bf16`, `Bf16`, `Sve` and `Sve2` are probed for the
/// capability report only; no kernel requires them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// x86 SSE4.1 (128-bit integer packs and blends)
    Sse41,
    /// x86 AVX2 (256-bit integer ops)
    Avx2,
    /// x86 F16C (half <-> single converts)
    F16c,
    /// x86 AVX-512 Foundation
    Avx512f,
    /// x86 AVX-512 Byte/Word
    Avx512bw,
    /// x86 AVX-512 BF16
    Avx512bf16,
    /// AArch64 Advanced SIMD
    Neon,
    /// AArch64 FEAT_FP16 (half-precision arithmetic)
    Fp16,
    /// AArch64 FEAT_BF16
    Bf16,
    /// AArch64 Scalable Vector Extension
    Sve,
    /// AArch64 SVE2
    Sve2,
}

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::Sse41,
        Feature::Avx2,
        Feature::F16c,
        Feature::Avx512f,
        Feature::Avx512bw,
        Feature::Avx512bf16,
        Feature::Neon,
        Feature::Fp16,
        Feature::Bf16,
        Feature::Sve,
        Feature::Sve2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Sse41 => "sse4.1",
            Feature::Avx2 => "avx2",
            Feature::F16c => "f16c",
            Feature::Avx512f => "avx512f",
            Feature::Avx512bw => "avx512bw",
            Feature::Avx512bf16 => "avx512bf16",
            Feature::Neon => "neon",
            Feature::Fp16 => "fp16",
            Feature::Bf16 => "bf16",
            Feature::Sve => "sve",
            Feature::Sve2 => "sve2",
        }
    }

    #[inline(always)]
    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Feature {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        // "sse41" is accepted alongside the rustc spelling "sse4.1"
        let wanted = if wanted == "sse41" { "sse4.1".to_string() } else { wanted };
        Feature::ALL
            .into_iter()
            .find(|feature| feature.name() == wanted)
            .ok_or(CastError::UnknownFeature {
                name: s.to_string(),
            })
    }
}

/// Immutable snapshot of the CPU features present on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    bits: u16,
}

impl Capabilities {
    /// No extensions at all: only the scalar path is admissible.
    pub const fn none() -> Self {
        Capabilities { bits: 0 }
    }

    /// Builds a snapshot from an explicit feature list.
    pub fn from_features(features: &[Feature]) -> Self {
        Capabilities {
            bits: features.iter().fold(0, |bits, f| bits | f.bit()),
        }
    }

    /// Queries the running processor.
    pub fn detect() -> Self {
        #[allow(unused_mut)]
        let mut present: Vec<Feature> = Vec::new();

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            use std::arch::is_x86_feature_detected;

            if is_x86_feature_detected!("sse4.1") {
                present.push(Feature::Sse41);
            }
            if is_x86_feature_detected!("avx2") {
                present.push(Feature::Avx2);
            }
            if is_x86_feature_detected!("f16c") {
                present.push(Feature::F16c);
            }
            #[cfg(avx512)]
            {
                if is_x86_feature_detected!("avx512f") {
                    present.push(Feature::Avx512f);
                }
                if is_x86_feature_detected!("avx512bw") {
                    present.push(Feature::Avx512bw);
                }
                if is_x86_feature_detected!("avx512bf16") {
                    present.push(Feature::Avx512bf16);
                }
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            use std::arch::is_aarch64_feature_detected;

            if is_aarch64_feature_detected!("neon") {
                present.push(Feature::Neon);
            }
            if is_aarch64_feature_detected!("fp16") {
                present.push(Feature::Fp16);
            }
            if is_aarch64_feature_detected!("bf16") {
                present.push(Feature::Bf16);
            }
            if is_aarch64_feature_detected!("sve") {
                present.push(Feature::Sve);
            }
            if is_aarch64_feature_detected!("sve2") {
                present.push(Feature::Sve2);
            }
        }

        Self::from_features(&present)
    }

    #[inline(always)]
    pub const fn has(&self, feature: Feature) -> bool {
        self.bits & feature.bit() != 0
    }

    /// The first of `required` that is missing, if any.
    pub fn missing(&self, required: &[Feature]) -> Option<Feature> {
        required.iter().copied().find(|&f| !self.has(f))
    }

    pub fn supports(&self, required: &[Feature]) -> bool {
        self.missing(required).is_none()
    }

    /// A copy of this snapshot with `disabled` masked out.
    pub fn restrict(self, disabled: &[Feature]) -> Self {
        let mask = Self::from_features(disabled).bits;
        Capabilities {
            bits: self.bits & !mask,
        }
    }

    /// Parses a comma-separated feature list (for example `"avx512f, f16c"`)
    /// and masks those features out.
    pub fn restrict_by_names(self, names: &str) -> Result<Self, CastError> {
        let disabled = names
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .map(Feature::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.restrict(&disabled))
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|&f| self.has(f))
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Feature::name).collect();
        if names.is_empty() {
            f.write_str("scalar only")
        } else {
            f.write_str(&names.join(" "))
        }
    }
}
