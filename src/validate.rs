//! Checksum validation of kernels against a fixed reference input.
//!
//! The fixture is a set of 18 KiB page-aligned buffers filled with a known
//! pattern. Each direction converts the first [`REFERENCE_LEN`] elements into a
//! zeroed 18 KiB destination and checksums the whole destination buffer. A
//! kernel is trusted only if it reproduces the recorded checksum.

use crate::buffer::AlignedBuffer;
use crate::checksum::checksum;
use crate::dispatch::{self, Conversion};
use crate::error::{CastError, Result};
use crate::probe::Capabilities;
use crate::scalar::U8Policy;
use crate::simd::{Direction, Kernel};
use crate::PAGE_ALIGNMENT;

/// Size of every fixture buffer in bytes.
pub const REFERENCE_BYTES: usize = 18 * 1024;

/// Elements converted per direction (one f32 buffer's worth).
pub const REFERENCE_LEN: usize = REFERENCE_BYTES / 4;

/// Checksum of the destination buffer after converting the reference input.
pub const fn expected_checksum(direction: Direction) -> u32 {
    match direction {
        Direction::F32ToF16 => 3_373_450_706,
        Direction::F16ToF32 => 2_626_649_712,
        Direction::F32ToBf16 => 2_148_563_683,
        Direction::Bf16ToF32 => 4_258_514_672,
        // the fixture stays inside [0, 255], so both policies agree
        Direction::F32ToU8Saturating | Direction::F32ToU8Narrowing => 3_416_643_824,
        Direction::U8ToF32 => 736_930_253,
    }
}

/// Four floats just above 1.12, the smallest end-to-end float16 case.
#[allow(clippy::excessive_precision)]
pub const SMALL_F16_INPUT: [f32; 4] = [
    1.123_456_789,
    1.124_456_789,
    1.125_456_789,
    1.126_456_789,
];

/// Checksum of [`SMALL_F16_INPUT`] converted to float16
/// (`[0x3C7E, 0x3C7F, 0x3C80, 0x3C81]`).
pub const SMALL_F16_CHECKSUM: u32 = 3_117_248_445;

/// The reference inputs.
#[derive(Debug)]
pub struct ReferenceSet {
    floats: AlignedBuffer<f32>,
    halves: AlignedBuffer<u16>,
    bytes: AlignedBuffer<u8>,
}

impl ReferenceSet {
    pub fn new() -> Result<Self> {
        let mut floats = AlignedBuffer::<f32>::zeroed(REFERENCE_BYTES / 4, PAGE_ALIGNMENT)?;
        let mut halves = AlignedBuffer::<u16>::zeroed(REFERENCE_BYTES / 2, PAGE_ALIGNMENT)?;
        let mut bytes = AlignedBuffer::<u8>::zeroed(REFERENCE_BYTES, PAGE_ALIGNMENT)?;

        for i in 0..REFERENCE_LEN {
            floats[i] = 1.123_456_789_f32 + i as f32 / 1000.0;
            halves[i] = 0x3C00 + i as u16;
            bytes[i] = i as u8;
        }

        Ok(ReferenceSet {
            floats,
            halves,
            bytes,
        })
    }

    pub fn floats(&self) -> &[f32] {
        &self.floats
    }

    pub fn halves(&self) -> &[u16] {
        &self.halves
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Converts the reference input for `direction` with `kernel` (`None` for
    /// the scalar path) and returns the destination buffer's checksum together
    /// with the number of elements the kernel converted.
    ///
    /// # Safety
    ///
    /// The running CPU must support every feature `kernel` requires.
    unsafe fn run(&self, direction: Direction, kernel: Option<&Kernel>) -> Result<(u32, usize)> {
        let n = REFERENCE_LEN;
        match direction {
            Direction::F32ToF16 | Direction::F32ToBf16 => {
                let mut dst = AlignedBuffer::<u16>::zeroed(REFERENCE_BYTES / 2, PAGE_ALIGNMENT)?;
                let (src, out) = (&self.floats[..n], &mut dst[..n]);
                let mut conversion = if direction == Direction::F32ToF16 {
                    Conversion::F32ToF16 { src, dst: out }
                } else {
                    Conversion::F32ToBf16 { src, dst: out }
                };
                let processed = dispatch::run(kernel, &mut conversion)?;
                Ok((checksum(&dst), processed))
            }
            Direction::F16ToF32 | Direction::Bf16ToF32 => {
                let mut dst = AlignedBuffer::<f32>::zeroed(REFERENCE_BYTES / 4, PAGE_ALIGNMENT)?;
                let (src, out) = (&self.halves[..n], &mut dst[..n]);
                let mut conversion = if direction == Direction::F16ToF32 {
                    Conversion::F16ToF32 { src, dst: out }
                } else {
                    Conversion::Bf16ToF32 { src, dst: out }
                };
                let processed = dispatch::run(kernel, &mut conversion)?;
                Ok((checksum(&dst), processed))
            }
            Direction::F32ToU8Saturating | Direction::F32ToU8Narrowing => {
                let mut dst = AlignedBuffer::<u8>::zeroed(REFERENCE_BYTES, PAGE_ALIGNMENT)?;
                let policy = if direction == Direction::F32ToU8Saturating {
                    U8Policy::Saturating
                } else {
                    U8Policy::Narrowing
                };
                let mut conversion = Conversion::F32ToU8 {
                    src: &self.floats[..n],
                    dst: &mut dst[..n],
                    policy,
                };
                let processed = dispatch::run(kernel, &mut conversion)?;
                Ok((checksum(&dst), processed))
            }
            Direction::U8ToF32 => {
                let mut dst = AlignedBuffer::<f32>::zeroed(REFERENCE_BYTES / 4, PAGE_ALIGNMENT)?;
                let mut conversion = Conversion::U8ToF32 {
                    src: &self.bytes[..n],
                    dst: &mut dst[..n],
                };
                let processed = dispatch::run(kernel, &mut conversion)?;
                Ok((checksum(&dst), processed))
            }
        }
    }
}

/// Checks that `kernel` may run on `caps`, converts exactly the prefix its
/// block size implies, and reproduces the recorded checksum.
pub fn validate_kernel(kernel: &Kernel, caps: &Capabilities, fixture: &ReferenceSet) -> Result<()> {
    if let Some(missing) = caps.missing(kernel.requires) {
        return Err(CastError::UnsupportedKernel {
            kernel: kernel.name.to_string(),
            missing,
        });
    }

    let direction = kernel.direction();
    // SAFETY: every feature the kernel requires is present in `caps`.
    let (actual, processed) = unsafe { fixture.run(direction, Some(kernel))? };

    let expected = REFERENCE_LEN - REFERENCE_LEN % kernel.block();
    if processed != expected {
        return Err(CastError::Granularity {
            kernel: kernel.name.to_string(),
            processed,
            expected,
        });
    }

    if actual != expected_checksum(direction) {
        return Err(CastError::ChecksumMismatch {
            kernel: kernel.name.to_string(),
            expected: expected_checksum(direction),
            actual,
        });
    }
    Ok(())
}

/// Checks the scalar reference for `direction` against the recorded checksum.
pub fn validate_scalar(direction: Direction, fixture: &ReferenceSet) -> Result<()> {
    // SAFETY: no kernel, scalar code only.
    let (actual, _) = unsafe { fixture.run(direction, None)? };
    if actual == expected_checksum(direction) {
        Ok(())
    } else {
        Err(CastError::ChecksumMismatch {
            kernel: format!("{direction}_scalar"),
            expected: expected_checksum(direction),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::verify;
    use crate::simd::KernelRegistry;

    #[test]
    fn fixture_layout() {
        let fixture = ReferenceSet::new().unwrap();
        assert_eq!(fixture.floats().len(), REFERENCE_LEN);
        assert_eq!(fixture.halves().len(), 2 * REFERENCE_LEN);
        assert_eq!(fixture.bytes().len(), 4 * REFERENCE_LEN);
        assert_eq!(fixture.halves()[0], 0x3C00);
        assert_eq!(fixture.halves()[REFERENCE_LEN - 1], 0x3C00 + 4607);
        assert!(fixture.halves()[REFERENCE_LEN..].iter().all(|&h| h == 0));
        assert_eq!(fixture.bytes()[300], 44);
        assert!(fixture.bytes()[REFERENCE_LEN..].iter().all(|&b| b == 0));
        assert_eq!(fixture.floats().as_ptr() as usize % PAGE_ALIGNMENT, 0);
    }

    #[test]
    fn scalar_reproduces_every_recorded_checksum() {
        let fixture = ReferenceSet::new().unwrap();
        for direction in Direction::ALL {
            validate_scalar(direction, &fixture).unwrap();
        }
    }

    #[test]
    fn admissible_kernels_pass_validation() {
        let caps = Capabilities::detect();
        let fixture = ReferenceSet::new().unwrap();
        let registry = KernelRegistry::new();
        for kernel in registry.admissible(&caps) {
            validate_kernel(kernel, &caps, &fixture).unwrap();
        }
    }

    #[test]
    fn missing_features_are_reported() {
        let fixture = ReferenceSet::new().unwrap();
        let registry = KernelRegistry::new();
        if let Some(kernel) = registry.all().first() {
            let err = validate_kernel(kernel, &Capabilities::none(), &fixture).unwrap_err();
            assert_eq!(
                err,
                CastError::UnsupportedKernel {
                    kernel: kernel.name.to_string(),
                    missing: kernel.requires[0],
                }
            );
        }
    }

    #[test]
    fn corrupted_output_is_detected() {
        let fixture = ReferenceSet::new().unwrap();
        let mut dst = vec![0u16; REFERENCE_BYTES / 2];
        crate::scalar::f32_to_f16_slice(fixture.floats(), &mut dst[..REFERENCE_LEN]);
        let expected = expected_checksum(Direction::F32ToF16);
        assert_eq!(checksum(&dst), expected);
        assert!(verify("scalar", &dst, expected).is_ok());

        dst[1234] ^= 1;
        assert!(matches!(
            verify("scalar", &dst, expected),
            Err(CastError::ChecksumMismatch { .. })
        ));
    }
}
