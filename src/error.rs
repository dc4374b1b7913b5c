//! Error types for simdcast operations.
//!
//! Conversions themselves are total: every bit pattern has a defined output.
//! These errors come from the safe outer layer (buffer allocation, length
//! checks, kernel selection and checksum validation).

use thiserror::Error;

use crate::probe::Feature;
use crate::simd::Direction;

/// Errors that can occur during simdcast operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    /// Memory allocation failed.
    #[error("Memory allocation failed: {message} (requested {size} bytes with {alignment} byte alignment)")]
    Allocation {
        /// The size that was requested to be allocated.
        size: usize,
        /// The alignment that was requested.
        alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// Invalid layout parameters were provided.
    #[error("Invalid memory layout: {message} (size: {size}, alignment: {alignment})")]
    Layout {
        size: usize,
        alignment: usize,
        message: String,
    },
    /// Input and output buffers disagree on the element count.
    #[error("Length mismatch: input has {input} elements, output has {output}")]
    LengthMismatch { input: usize, output: usize },
    /// A kernel produced output that does not match the recorded reference.
    #[error("Validation failed for {kernel}: expected checksum {expected}, actual {actual}")]
    ChecksumMismatch {
        kernel: String,
        expected: u32,
        actual: u32,
    },
    /// A kernel was requested on a CPU that lacks one of its features.
    #[error("Kernel {kernel} requires CPU feature {missing}")]
    UnsupportedKernel { kernel: String, missing: Feature },
    /// No kernel with this name is compiled into the registry.
    #[error("Unknown kernel: {name}")]
    UnknownKernel { name: String },
    /// A kernel converted a different number of elements than its block size implies.
    #[error("Kernel {kernel} converted {processed} of {expected} elements")]
    Granularity {
        kernel: String,
        processed: usize,
        expected: usize,
    },
    /// A kernel was asked to serve a direction it does not implement.
    #[error("Kernel {kernel} does not implement {expected}")]
    DirectionMismatch { kernel: String, expected: Direction },
    /// A feature name in configuration did not parse.
    #[error("Unknown CPU feature: {name}")]
    UnknownFeature { name: String },
}

/// Result type alias for simdcast operations.
pub type Result<T> = std::result::Result<T, CastError>;

/// Creates an allocation error.
pub fn allocation_error(size: usize, alignment: usize, message: impl Into<String>) -> CastError {
    CastError::Allocation {
        size,
        alignment,
        message: message.into(),
    }
}

/// Creates a layout error.
pub fn layout_error(size: usize, alignment: usize, message: impl Into<String>) -> CastError {
    CastError::Layout {
        size,
        alignment,
        message: message.into(),
    }
}

/// Returns a length mismatch error unless both buffers hold the same count.
pub fn check_lengths(input: usize, output: usize) -> Result<()> {
    if input == output {
        Ok(())
    } else {
        Err(CastError::LengthMismatch { input, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_error_display() {
        let error = allocation_error(1024, 32, "out of memory");
        let display = format!("{error}");
        assert!(display.contains("Memory allocation failed"));
        assert!(display.contains("1024 bytes"));
        assert!(display.contains("32 byte alignment"));
        assert!(display.contains("out of memory"));
    }

    #[test]
    fn test_layout_error_display() {
        let error = layout_error(1000, 31, "alignment must be power of two");
        let display = format!("{error}");
        assert!(display.contains("Invalid memory layout"));
        assert!(display.contains("size: 1000"));
        assert!(display.contains("alignment: 31"));
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let error = CastError::ChecksumMismatch {
            kernel: "f32_to_f16_4_avx2".to_string(),
            expected: 3373450706,
            actual: 1,
        };
        let display = format!("{error}");
        assert!(display.contains("f32_to_f16_4_avx2"));
        assert!(display.contains("3373450706"));
    }

    #[test]
    fn test_check_lengths() {
        assert!(check_lengths(8, 8).is_ok());
        assert_eq!(
            check_lengths(8, 7),
            Err(CastError::LengthMismatch {
                input: 8,
                output: 7
            })
        );
    }

    #[test]
    fn test_unsupported_kernel_display() {
        let error = CastError::UnsupportedKernel {
            kernel: "f16_to_f32_2_avx512".to_string(),
            missing: Feature::Avx512f,
        };
        assert!(format!("{error}").contains("avx512f"));
    }

    #[test]
    fn test_error_trait_implementation() {
        let error = allocation_error(1024, 32, "test error");
        let _: &dyn std::error::Error = &error;
        assert!(std::error::Error::source(&error).is_none());
    }
}
