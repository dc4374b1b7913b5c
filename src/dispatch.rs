//! Runtime kernel selection.
//!
//! A [`Dispatcher`] holds, per [`Direction`], the kernel chosen for this
//! machine (or none, meaning the scalar path). Selection happens once in
//! [`Dispatcher::new`]; afterwards the dispatcher is immutable and can be
//! shared across threads.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{check_lengths, CastError, Result};
use crate::probe::Capabilities;
use crate::scalar::{self, U8Policy};
use crate::simd::{Direction, Kernel, KernelRegistry};
use crate::validate::{validate_kernel, ReferenceSet};
use crate::{PARALLEL_CHUNK_SIZE, PARALLEL_THRESHOLD};

/// A source/destination pair for one conversion direction.
#[derive(Debug)]
pub enum Conversion<'a> {
    F32ToF16 {
        src: &'a [f32],
        dst: &'a mut [u16],
    },
    F16ToF32 {
        src: &'a [u16],
        dst: &'a mut [f32],
    },
    F32ToBf16 {
        src: &'a [f32],
        dst: &'a mut [u16],
    },
    Bf16ToF32 {
        src: &'a [u16],
        dst: &'a mut [f32],
    },
    F32ToU8 {
        src: &'a [f32],
        dst: &'a mut [u8],
        policy: U8Policy,
    },
    U8ToF32 {
        src: &'a [u8],
        dst: &'a mut [f32],
    },
}

impl Conversion<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            Conversion::F32ToF16 { .. } => Direction::F32ToF16,
            Conversion::F16ToF32 { .. } => Direction::F16ToF32,
            Conversion::F32ToBf16 { .. } => Direction::F32ToBf16,
            Conversion::Bf16ToF32 { .. } => Direction::Bf16ToF32,
            Conversion::F32ToU8 { policy, .. } => Direction::f32_to_u8(*policy),
            Conversion::U8ToF32 { .. } => Direction::U8ToF32,
        }
    }

    /// Number of input elements.
    pub fn len(&self) -> usize {
        match self {
            Conversion::F32ToF16 { src, .. }
            | Conversion::F32ToBf16 { src, .. }
            | Conversion::F32ToU8 { src, .. } => src.len(),
            Conversion::F16ToF32 { src, .. } | Conversion::Bf16ToF32 { src, .. } => src.len(),
            Conversion::U8ToF32 { src, .. } => src.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn output_len(&self) -> usize {
        match self {
            Conversion::F32ToF16 { dst, .. } | Conversion::F32ToBf16 { dst, .. } => dst.len(),
            Conversion::F16ToF32 { dst, .. }
            | Conversion::Bf16ToF32 { dst, .. }
            | Conversion::U8ToF32 { dst, .. } => dst.len(),
            Conversion::F32ToU8 { dst, .. } => dst.len(),
        }
    }

    pub(crate) fn check_lengths(&self) -> Result<()> {
        check_lengths(self.len(), self.output_len())
    }

    /// Converts elements `start..` with the scalar reference.
    fn finish_scalar(&mut self, start: usize) {
        match self {
            Conversion::F32ToF16 { src, dst } => {
                scalar::f32_to_f16_slice(&src[start..], &mut dst[start..])
            }
            Conversion::F16ToF32 { src, dst } => {
                scalar::f16_to_f32_slice(&src[start..], &mut dst[start..])
            }
            Conversion::F32ToBf16 { src, dst } => {
                scalar::f32_to_bf16_slice(&src[start..], &mut dst[start..])
            }
            Conversion::Bf16ToF32 { src, dst } => {
                scalar::bf16_to_f32_slice(&src[start..], &mut dst[start..])
            }
            Conversion::F32ToU8 { src, dst, policy } => {
                scalar::f32_to_u8_slice(&src[start..], &mut dst[start..], *policy)
            }
            Conversion::U8ToF32 { src, dst } => {
                scalar::u8_to_f32_slice(&src[start..], &mut dst[start..])
            }
        }
    }
}

/// Runs `conversion` through `kernel` (if any) and finishes the tail with the
/// scalar reference. Returns the number of elements the kernel converted.
///
/// # Safety
///
/// The running CPU must support every feature `kernel` requires.
pub(crate) unsafe fn run(
    kernel: Option<&Kernel>,
    conversion: &mut Conversion<'_>,
) -> Result<usize> {
    conversion.check_lengths()?;
    let processed = match kernel {
        Some(kernel) => kernel.invoke(conversion)?,
        None => 0,
    };
    conversion.finish_scalar(processed);
    Ok(processed)
}

/// Per-direction kernel selection for one machine.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    caps: Capabilities,
    selected: [Option<&'static Kernel>; Direction::COUNT],
}

impl Dispatcher {
    /// Picks, for every direction, the most preferred admissible kernel that
    /// reproduces the reference checksum. Directions where every candidate
    /// fails fall back to the scalar path.
    pub fn new(caps: Capabilities) -> Self {
        Self::with_registry(caps, &KernelRegistry::new())
    }

    /// Like [`Dispatcher::new`], choosing only among the kernels in `registry`.
    pub fn with_registry(caps: Capabilities, registry: &KernelRegistry) -> Self {
        info!(capabilities = %caps, kernels = registry.len(), "selecting conversion kernels");

        let fixture = match ReferenceSet::new() {
            Ok(fixture) => fixture,
            Err(err) => {
                warn!(error = %err, "reference fixture unavailable, using scalar conversions");
                return Self::scalar_with(caps);
            }
        };

        let mut selected = [None; Direction::COUNT];
        for direction in Direction::ALL {
            selected[direction.index()] = registry
                .candidates(direction, &caps)
                .into_iter()
                .find(|kernel| {
                    let verdict = validate_kernel(kernel, &caps, &fixture);
                    if let Err(err) = &verdict {
                        warn!(kernel = kernel.name, error = %err, "kernel rejected");
                    }
                    verdict.is_ok()
                });
            debug!(
                %direction,
                kernel = selected[direction.index()].map_or("scalar", |k| k.name),
                "selected"
            );
        }

        Dispatcher { caps, selected }
    }

    /// A dispatcher that never runs vector code.
    pub fn scalar() -> Self {
        Self::scalar_with(Capabilities::none())
    }

    fn scalar_with(caps: Capabilities) -> Self {
        Dispatcher {
            caps,
            selected: [None; Direction::COUNT],
        }
    }

    /// Like [`Dispatcher::new`], but with `name` pinned for its direction.
    ///
    /// # Errors
    ///
    /// `UnknownKernel` if no compiled kernel has this name,
    /// `UnsupportedKernel` if `caps` lacks one of its features, and any
    /// validation error the kernel produces.
    pub fn with_kernel(caps: Capabilities, name: &str) -> Result<Self> {
        let registry = KernelRegistry::new();
        let kernel = registry
            .find(name)
            .ok_or_else(|| CastError::UnknownKernel {
                name: name.to_string(),
            })?;
        let fixture = ReferenceSet::new()?;
        validate_kernel(kernel, &caps, &fixture)?;

        let mut dispatcher = Self::new(caps);
        dispatcher.selected[kernel.direction().index()] = Some(kernel);
        info!(kernel = kernel.name, direction = %kernel.direction(), "kernel pinned");
        Ok(dispatcher)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// The kernel used for `direction`, `None` for the scalar path.
    pub fn kernel(&self, direction: Direction) -> Option<&'static Kernel> {
        self.selected[direction.index()]
    }

    /// Name of the implementation used for `direction`.
    pub fn selected(&self, direction: Direction) -> &'static str {
        self.kernel(direction).map_or("scalar", |k| k.name)
    }

    /// Converts `conversion` on the calling thread.
    pub fn convert(&self, mut conversion: Conversion<'_>) -> Result<()> {
        let kernel = self.kernel(conversion.direction());
        // SAFETY: only kernels admitted by `self.caps` are ever selected.
        unsafe { run(kernel, &mut conversion) }.map(|_| ())
    }

    /// Converts `conversion` in independent chunks on the rayon pool.
    ///
    /// Inputs shorter than [`PARALLEL_THRESHOLD`] are converted on the calling
    /// thread. Output is identical to [`Dispatcher::convert`].
    pub fn par_convert(&self, conversion: Conversion<'_>) -> Result<()> {
        conversion.check_lengths()?;
        if conversion.len() < PARALLEL_THRESHOLD {
            return self.convert(conversion);
        }

        macro_rules! chunked {
            ($variant:ident { $src:ident, $dst:ident $(, $extra:ident)? }) => {
                $src.par_chunks(PARALLEL_CHUNK_SIZE)
                    .zip($dst.par_chunks_mut(PARALLEL_CHUNK_SIZE))
                    .try_for_each(|(src, dst)| {
                        self.convert(Conversion::$variant { src, dst $(, $extra)? })
                    })
            };
        }

        match conversion {
            Conversion::F32ToF16 { src, dst } => chunked!(F32ToF16 { src, dst }),
            Conversion::F16ToF32 { src, dst } => chunked!(F16ToF32 { src, dst }),
            Conversion::F32ToBf16 { src, dst } => chunked!(F32ToBf16 { src, dst }),
            Conversion::Bf16ToF32 { src, dst } => chunked!(Bf16ToF32 { src, dst }),
            Conversion::F32ToU8 { src, dst, policy } => chunked!(F32ToU8 { src, dst, policy }),
            Conversion::U8ToF32 { src, dst } => chunked!(U8ToF32 { src, dst }),
        }
    }

    pub fn f32_to_f16(&self, src: &[f32], dst: &mut [u16]) -> Result<()> {
        self.convert(Conversion::F32ToF16 { src, dst })
    }

    pub fn f16_to_f32(&self, src: &[u16], dst: &mut [f32]) -> Result<()> {
        self.convert(Conversion::F16ToF32 { src, dst })
    }

    pub fn f32_to_bf16(&self, src: &[f32], dst: &mut [u16]) -> Result<()> {
        self.convert(Conversion::F32ToBf16 { src, dst })
    }

    pub fn bf16_to_f32(&self, src: &[u16], dst: &mut [f32]) -> Result<()> {
        self.convert(Conversion::Bf16ToF32 { src, dst })
    }

    pub fn f32_to_u8(&self, src: &[f32], dst: &mut [u8], policy: U8Policy) -> Result<()> {
        self.convert(Conversion::F32ToU8 { src, dst, policy })
    }

    pub fn u8_to_f32(&self, src: &[u8], dst: &mut [f32]) -> Result<()> {
        self.convert(Conversion::U8ToF32 { src, dst })
    }
}
