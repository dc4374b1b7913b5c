#![cfg_attr(avx512_nightly, feature(avx512_target_feature, stdarch_x86_avx512))]

//! Bit-exact conversions between `f32`, IEEE `f16`, `bf16` and `u8` buffers.
//!
//! Every direction has a portable scalar reference ([`scalar`]) and a family of
//! vectorized kernels ([`simd`]) that must produce output bit-identical to it.
//! A [`Dispatcher`] picks the widest kernel the running CPU supports, after
//! validating it against a recorded checksum ([`validate`]).
//!
//! Half-precision values (`f16` and `bf16`) are carried as raw `u16` bit
//! patterns.
//!
//! ```rust
//! use simdcast::{Capabilities, Dispatcher};
//!
//! let dispatcher = Dispatcher::new(Capabilities::detect());
//!
//! let input = [1.0f32, -2.0, 0.5, 65504.0];
//! let mut half = [0u16; 4];
//! dispatcher.f32_to_f16(&input, &mut half).unwrap();
//! assert_eq!(half, [0x3C00, 0xC000, 0x3800, 0x7BFF]);
//! ```

pub mod buffer;
pub mod checksum;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod probe;
pub mod scalar;
pub mod simd;
pub mod validate;

pub use buffer::{AlignedBuffer, Element};
pub use checksum::{checksum, crc32, verify};
pub use dispatch::{Conversion, Dispatcher};
pub use error::{CastError, Result};
pub use probe::{Capabilities, Feature};
pub use scalar::U8Policy;
pub use simd::{Direction, Isa, Kernel, KernelRegistry};

/// Alignment of the reference buffers (one page).
pub const PAGE_ALIGNMENT: usize = 4096;

/// Below this many elements [`Dispatcher::par_convert`] stays on the calling thread.
pub const PARALLEL_THRESHOLD: usize = 1 << 18;

/// Elements per rayon task in [`Dispatcher::par_convert`].
///
/// A multiple of every kernel block (`lanes * unroll`), so only the last
/// chunk ever has a scalar tail.
pub const PARALLEL_CHUNK_SIZE: usize = 3 << 13;
