//! Vectorized conversion kernels and their registry.
//!
//! Each instruction-set family lives in its own module and exports a static
//! `KERNELS` table. Every table entry is one monomorphized kernel: a direction,
//! an unroll factor and (for the narrowing float directions) a write mode.
//!
//! # Kernel contract
//!
//! A kernel is an `unsafe fn(&[S], &mut [D]) -> usize`. It asserts that both
//! slices have the same length, converts the longest prefix whose length is a
//! multiple of `lanes * unroll`, and returns the length of that prefix. The
//! caller converts the remainder with [`crate::scalar`]. Output is bit-identical
//! to the scalar reference for every input.
//!
//! # Safety
//!
//! Calling a kernel on a CPU that lacks any of its `requires` features is
//! undefined behavior. [`crate::Dispatcher`] only calls kernels admitted by a
//! [`Capabilities`] snapshot.

use std::cmp::Reverse;
use std::fmt;

use crate::dispatch::Conversion;
use crate::error::{CastError, Result};
use crate::probe::{Capabilities, Feature};
use crate::scalar::U8Policy;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod sse41;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx2;

// build.rs only sets `avx512` on toolchains where these intrinsics exist
#[cfg(all(avx512, any(target_arch = "x86", target_arch = "x86_64")))]
#[allow(clippy::incompatible_msrv)]
pub mod avx512;

#[cfg(target_arch = "aarch64")]
pub mod neon;

/// One conversion direction. `f32 -> u8` is split by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    F32ToF16,
    F16ToF32,
    F32ToBf16,
    Bf16ToF32,
    F32ToU8Saturating,
    F32ToU8Narrowing,
    U8ToF32,
}

impl Direction {
    pub const COUNT: usize = 7;

    pub const ALL: [Direction; Direction::COUNT] = [
        Direction::F32ToF16,
        Direction::F16ToF32,
        Direction::F32ToBf16,
        Direction::Bf16ToF32,
        Direction::F32ToU8Saturating,
        Direction::F32ToU8Narrowing,
        Direction::U8ToF32,
    ];

    pub const fn f32_to_u8(policy: U8Policy) -> Direction {
        match policy {
            U8Policy::Saturating => Direction::F32ToU8Saturating,
            U8Policy::Narrowing => Direction::F32ToU8Narrowing,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::F32ToF16 => "f32_to_f16",
            Direction::F16ToF32 => "f16_to_f32",
            Direction::F32ToBf16 => "f32_to_bf16",
            Direction::Bf16ToF32 => "bf16_to_f32",
            Direction::F32ToU8Saturating => "f32_to_u8_saturate",
            Direction::F32ToU8Narrowing => "f32_to_u8_narrow",
            Direction::U8ToF32 => "u8_to_f32",
        }
    }

    #[inline(always)]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Instruction-set family a kernel is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isa {
    Sse41,
    Avx2,
    Avx512,
    Neon,
}

impl Isa {
    pub fn name(self) -> &'static str {
        match self {
            Isa::Sse41 => "sse41",
            Isa::Avx2 => "avx2",
            Isa::Avx512 => "avx512",
            Isa::Neon => "neon",
        }
    }

    /// Register width in bits.
    pub fn width(self) -> usize {
        match self {
            Isa::Sse41 | Isa::Neon => 128,
            Isa::Avx2 => 256,
            Isa::Avx512 => 512,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

pub type F32ToU16Fn = unsafe fn(&[f32], &mut [u16]) -> usize;
pub type U16ToF32Fn = unsafe fn(&[u16], &mut [f32]) -> usize;
pub type F32ToU8Fn = unsafe fn(&[f32], &mut [u8]) -> usize;
pub type U8ToF32Fn = unsafe fn(&[u8], &mut [f32]) -> usize;

/// A kernel entry point, tagged with the direction it implements.
#[derive(Clone, Copy)]
pub enum KernelFn {
    F32ToF16(F32ToU16Fn),
    F16ToF32(U16ToF32Fn),
    F32ToBf16(F32ToU16Fn),
    Bf16ToF32(U16ToF32Fn),
    F32ToU8Saturating(F32ToU8Fn),
    F32ToU8Narrowing(F32ToU8Fn),
    U8ToF32(U8ToF32Fn),
}

impl KernelFn {
    pub fn direction(&self) -> Direction {
        match self {
            KernelFn::F32ToF16(_) => Direction::F32ToF16,
            KernelFn::F16ToF32(_) => Direction::F16ToF32,
            KernelFn::F32ToBf16(_) => Direction::F32ToBf16,
            KernelFn::Bf16ToF32(_) => Direction::Bf16ToF32,
            KernelFn::F32ToU8Saturating(_) => Direction::F32ToU8Saturating,
            KernelFn::F32ToU8Narrowing(_) => Direction::F32ToU8Narrowing,
            KernelFn::U8ToF32(_) => Direction::U8ToF32,
        }
    }
}

/// A registered kernel and its metadata.
pub struct Kernel {
    /// `<direction>[_cw]_<unroll>_<isa>`
    pub name: &'static str,
    pub isa: Isa,
    /// CPU features that must all be present before `func` may run.
    pub requires: &'static [Feature],
    /// Elements per vector register.
    pub lanes: usize,
    /// Vectors converted per loop iteration.
    pub unroll: usize,
    /// Narrow outputs of two registers are merged into one full-width store.
    pub combined_write: bool,
    /// The family's default pick for this direction.
    pub preferred: bool,
    pub func: KernelFn,
}

impl Kernel {
    pub fn direction(&self) -> Direction {
        self.func.direction()
    }

    /// Elements converted per loop iteration.
    pub fn block(&self) -> usize {
        self.lanes * self.unroll
    }

    pub fn is_supported(&self, caps: &Capabilities) -> bool {
        caps.supports(self.requires)
    }

    /// Runs the kernel over `conversion` and returns how many leading elements
    /// it converted. Nothing past that prefix is written.
    ///
    /// # Errors
    ///
    /// `DirectionMismatch` if `conversion` is not this kernel's direction, and
    /// `LengthMismatch` if its buffers disagree on length.
    ///
    /// # Safety
    ///
    /// The running CPU must support every feature in `self.requires`.
    pub unsafe fn invoke(&self, conversion: &mut Conversion<'_>) -> Result<usize> {
        conversion.check_lengths()?;
        let processed = match (self.func, conversion) {
            (KernelFn::F32ToF16(f), Conversion::F32ToF16 { src, dst }) => f(src, dst),
            (KernelFn::F16ToF32(f), Conversion::F16ToF32 { src, dst }) => f(src, dst),
            (KernelFn::F32ToBf16(f), Conversion::F32ToBf16 { src, dst }) => f(src, dst),
            (KernelFn::Bf16ToF32(f), Conversion::Bf16ToF32 { src, dst }) => f(src, dst),
            (
                KernelFn::F32ToU8Saturating(f),
                Conversion::F32ToU8 {
                    src,
                    dst,
                    policy: U8Policy::Saturating,
                },
            ) => f(src, dst),
            (
                KernelFn::F32ToU8Narrowing(f),
                Conversion::F32ToU8 {
                    src,
                    dst,
                    policy: U8Policy::Narrowing,
                },
            ) => f(src, dst),
            (KernelFn::U8ToF32(f), Conversion::U8ToF32 { src, dst }) => f(src, dst),
            (_, conversion) => {
                return Err(CastError::DirectionMismatch {
                    kernel: self.name.to_string(),
                    expected: conversion.direction(),
                })
            }
        };
        Ok(processed)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("direction", &self.direction())
            .field("isa", &self.isa)
            .field("requires", &self.requires)
            .field("lanes", &self.lanes)
            .field("unroll", &self.unroll)
            .field("combined_write", &self.combined_write)
            .field("preferred", &self.preferred)
            .finish()
    }
}

/// Builds a family's kernel table.
///
/// Each line names a [`KernelFn`] variant and a kernel function generic over
/// `const UNROLL: usize`; it expands to the 2, 4, 6 and 8 instantiations. A
/// line marked `preferred: true` makes its unroll-4 entry the family default.
macro_rules! kernel_table {
    (@entry $isa:expr, $tag:literal, $variant:ident, $func:ident, $cw:literal, $lanes:expr,
     $requires:expr, $unroll:literal, $preferred:expr) => {
        $crate::simd::Kernel {
            name: concat!(stringify!($func), "_", $unroll, "_", $tag),
            isa: $isa,
            requires: $requires,
            lanes: $lanes,
            unroll: $unroll,
            combined_write: $cw,
            preferred: $preferred,
            func: $crate::simd::KernelFn::$variant($func::<$unroll>),
        }
    };
    ($isa:expr, $tag:literal;
     $( $variant:ident => $func:ident, combined: $cw:literal, lanes: $lanes:expr,
        requires: $requires:expr, preferred: $preferred:literal; )*) => {
        &[
            $(
                kernel_table!(@entry $isa, $tag, $variant, $func, $cw, $lanes, $requires, 2, false),
                kernel_table!(@entry $isa, $tag, $variant, $func, $cw, $lanes, $requires, 4, $preferred),
                kernel_table!(@entry $isa, $tag, $variant, $func, $cw, $lanes, $requires, 6, false),
                kernel_table!(@entry $isa, $tag, $variant, $func, $cw, $lanes, $requires, 8, false),
            )*
        ]
    };
}

pub(crate) use kernel_table;

/// Every kernel compiled into this binary.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    kernels: Vec<&'static Kernel>,
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut kernels: Vec<&'static Kernel> = Vec::new();

        #[cfg(all(avx512, any(target_arch = "x86", target_arch = "x86_64")))]
        kernels.extend(avx512::KERNELS.iter());

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            kernels.extend(avx2::KERNELS.iter());
            kernels.extend(sse41::KERNELS.iter());
        }

        #[cfg(target_arch = "aarch64")]
        kernels.extend(neon::KERNELS.iter());

        KernelRegistry { kernels }
    }

    /// A registry holding exactly `kernels`, in table order.
    pub fn from_kernels(kernels: Vec<&'static Kernel>) -> Self {
        KernelRegistry { kernels }
    }

    pub fn all(&self) -> &[&'static Kernel] {
        &self.kernels
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&'static Kernel> {
        self.kernels.iter().copied().find(|k| k.name == name)
    }

    /// Kernels whose required features are all present in `caps`.
    pub fn admissible<'a>(
        &'a self,
        caps: &'a Capabilities,
    ) -> impl Iterator<Item = &'static Kernel> + 'a {
        self.kernels.iter().copied().filter(|k| k.is_supported(caps))
    }

    /// Admissible kernels for `direction`, most preferred first: wider
    /// families before narrower ones, then each family's preferred entry,
    /// then the rest in table order.
    pub fn candidates(&self, direction: Direction, caps: &Capabilities) -> Vec<&'static Kernel> {
        let mut candidates: Vec<&'static Kernel> = self
            .admissible(caps)
            .filter(|k| k.direction() == direction)
            .collect();
        candidates.sort_by_key(|k| (Reverse(k.isa.width()), !k.preferred));
        candidates
    }
}
