//! Every kernel this machine can run must match the scalar reference bit for
//! bit, on random and special inputs, for every unroll and write mode.

mod common;

use rand::rngs::StdRng;
use rand::SeedableRng;

use simdcast::scalar::{self, U8Policy};
use simdcast::{Capabilities, Conversion, Direction, Dispatcher, Kernel, KernelRegistry};

/// Length chosen so that no block size divides it: every kernel leaves a tail.
const LEN: usize = 4099;

fn admitted_kernels() -> Vec<&'static Kernel> {
    let caps = Capabilities::detect();
    let registry = KernelRegistry::new();
    let kernels: Vec<&'static Kernel> = registry.admissible(&caps).collect();
    println!("cpu: {caps}, {} of {} kernels admissible", kernels.len(), registry.len());
    kernels
}

/// Runs `kernel` directly on a conversion and checks the processed prefix.
fn invoke(kernel: &Kernel, conversion: &mut Conversion<'_>) -> usize {
    let len = conversion.len();
    // SAFETY: `kernel` came from `admissible` for the detected capabilities.
    let processed = unsafe { kernel.invoke(conversion) }.unwrap();
    assert_eq!(processed, len - len % kernel.block(), "{}", kernel.name);
    processed
}

#[test]
fn test_narrowing_float_kernels_match_scalar() {
    let mut rng = StdRng::seed_from_u64(7);
    let src = common::random_floats(&mut rng, LEN);

    let mut f16_expected = vec![0u16; LEN];
    scalar::f32_to_f16_slice(&src, &mut f16_expected);
    let mut bf16_expected = vec![0u16; LEN];
    scalar::f32_to_bf16_slice(&src, &mut bf16_expected);

    for kernel in admitted_kernels() {
        let expected = match kernel.direction() {
            Direction::F32ToF16 => &f16_expected,
            Direction::F32ToBf16 => &bf16_expected,
            _ => continue,
        };
        // Sentinel past the prefix: kernels must not write there.
        let mut dst = vec![0xA5A5u16; LEN];
        let processed = {
            let mut conversion = if kernel.direction() == Direction::F32ToF16 {
                Conversion::F32ToF16 {
                    src: &src,
                    dst: &mut dst,
                }
            } else {
                Conversion::F32ToBf16 {
                    src: &src,
                    dst: &mut dst,
                }
            };
            invoke(kernel, &mut conversion)
        };

        for i in 0..processed {
            assert_eq!(
                dst[i], expected[i],
                "{} at {i}: input {:#010x}",
                kernel.name,
                src[i].to_bits()
            );
        }
        assert!(dst[processed..].iter().all(|&h| h == 0xA5A5), "{}", kernel.name);
    }
}

#[test]
fn test_widening_float_kernels_match_scalar() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut src = common::random_u16(&mut rng, LEN);
    // every f16 and bf16 class in the first block
    src[..8].copy_from_slice(&[0x0000, 0x8000, 0x0001, 0x03FF, 0x7C00, 0xFC00, 0x7C01, 0xFE00]);

    for kernel in admitted_kernels() {
        let direction = kernel.direction();
        if !matches!(direction, Direction::F16ToF32 | Direction::Bf16ToF32) {
            continue;
        }
        let mut expected = vec![0f32; LEN];
        let mut dst = vec![f32::from_bits(0xDEAD_BEEF); LEN];
        let processed = if direction == Direction::F16ToF32 {
            scalar::f16_to_f32_slice(&src, &mut expected);
            invoke(
                kernel,
                &mut Conversion::F16ToF32 {
                    src: &src,
                    dst: &mut dst,
                },
            )
        } else {
            scalar::bf16_to_f32_slice(&src, &mut expected);
            invoke(
                kernel,
                &mut Conversion::Bf16ToF32 {
                    src: &src,
                    dst: &mut dst,
                },
            )
        };

        for i in 0..processed {
            assert_eq!(
                dst[i].to_bits(),
                expected[i].to_bits(),
                "{} at {i}: input {:#06x}",
                kernel.name,
                src[i]
            );
        }
        assert!(dst[processed..].iter().all(|v| v.to_bits() == 0xDEAD_BEEF));
    }
}

#[test]
fn test_u8_kernels_match_scalar() {
    let mut rng = StdRng::seed_from_u64(9);
    let floats = common::random_floats(&mut rng, LEN);
    let bytes = common::random_u8(&mut rng, LEN);

    for kernel in admitted_kernels() {
        match kernel.direction() {
            Direction::F32ToU8Saturating | Direction::F32ToU8Narrowing => {
                let policy = if kernel.direction() == Direction::F32ToU8Saturating {
                    U8Policy::Saturating
                } else {
                    U8Policy::Narrowing
                };
                let mut expected = vec![0u8; LEN];
                scalar::f32_to_u8_slice(&floats, &mut expected, policy);
                let mut dst = vec![0x5Au8; LEN];
                let processed = invoke(
                    kernel,
                    &mut Conversion::F32ToU8 {
                        src: &floats,
                        dst: &mut dst,
                        policy,
                    },
                );
                for i in 0..processed {
                    assert_eq!(
                        dst[i], expected[i],
                        "{} at {i}: input {} ({:#010x})",
                        kernel.name,
                        floats[i],
                        floats[i].to_bits()
                    );
                }
                assert!(dst[processed..].iter().all(|&b| b == 0x5A));
            }
            Direction::U8ToF32 => {
                let mut expected = vec![0f32; LEN];
                scalar::u8_to_f32_slice(&bytes, &mut expected);
                let mut dst = vec![-1.0f32; LEN];
                let processed = invoke(
                    kernel,
                    &mut Conversion::U8ToF32 {
                        src: &bytes,
                        dst: &mut dst,
                    },
                );
                assert_eq!(dst[..processed], expected[..processed], "{}", kernel.name);
                assert!(dst[processed..].iter().all(|&v| v == -1.0));
            }
            _ => {}
        }
    }
}

/// Pinning each kernel in a dispatcher gives full-length output equal to the
/// scalar path, tail included.
#[test]
fn test_pinned_kernels_cover_tails() {
    let caps = Capabilities::detect();
    let scalar = Dispatcher::scalar();
    let mut rng = StdRng::seed_from_u64(10);

    for kernel in admitted_kernels() {
        let dispatcher = Dispatcher::with_kernel(caps, kernel.name).unwrap();
        assert_eq!(dispatcher.selected(kernel.direction()), kernel.name);

        for len in [0, 1, kernel.block() - 1, kernel.block(), kernel.block() + 3, 1000] {
            let floats = common::random_floats(&mut rng, len);
            let halves = common::random_u16(&mut rng, len);
            let bytes = common::random_u8(&mut rng, len);

            match kernel.direction() {
                Direction::F32ToF16 => {
                    let (mut a, mut b) = (vec![0u16; len], vec![0u16; len]);
                    dispatcher.f32_to_f16(&floats, &mut a).unwrap();
                    scalar.f32_to_f16(&floats, &mut b).unwrap();
                    assert_eq!(a, b, "{} len {len}", kernel.name);
                }
                Direction::F32ToBf16 => {
                    let (mut a, mut b) = (vec![0u16; len], vec![0u16; len]);
                    dispatcher.f32_to_bf16(&floats, &mut a).unwrap();
                    scalar.f32_to_bf16(&floats, &mut b).unwrap();
                    assert_eq!(a, b, "{} len {len}", kernel.name);
                }
                Direction::F16ToF32 | Direction::Bf16ToF32 => {
                    let (mut a, mut b) = (vec![0f32; len], vec![0f32; len]);
                    if kernel.direction() == Direction::F16ToF32 {
                        dispatcher.f16_to_f32(&halves, &mut a).unwrap();
                        scalar.f16_to_f32(&halves, &mut b).unwrap();
                    } else {
                        dispatcher.bf16_to_f32(&halves, &mut a).unwrap();
                        scalar.bf16_to_f32(&halves, &mut b).unwrap();
                    }
                    let a: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
                    let b: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
                    assert_eq!(a, b, "{} len {len}", kernel.name);
                }
                Direction::F32ToU8Saturating | Direction::F32ToU8Narrowing => {
                    let policy = if kernel.direction() == Direction::F32ToU8Saturating {
                        U8Policy::Saturating
                    } else {
                        U8Policy::Narrowing
                    };
                    let (mut a, mut b) = (vec![0u8; len], vec![0u8; len]);
                    dispatcher.f32_to_u8(&floats, &mut a, policy).unwrap();
                    scalar.f32_to_u8(&floats, &mut b, policy).unwrap();
                    assert_eq!(a, b, "{} len {len}", kernel.name);
                }
                Direction::U8ToF32 => {
                    let (mut a, mut b) = (vec![0f32; len], vec![0f32; len]);
                    dispatcher.u8_to_f32(&bytes, &mut a).unwrap();
                    scalar.u8_to_f32(&bytes, &mut b).unwrap();
                    assert_eq!(a, b, "{} len {len}", kernel.name);
                }
            }
        }
    }
}

/// Unaligned slices (offset by one element) convert the same as aligned ones.
#[test]
fn test_kernels_accept_unaligned_slices() {
    let mut rng = StdRng::seed_from_u64(11);
    let src = common::random_floats(&mut rng, 1025);
    let mut expected = vec![0u16; 1024];
    scalar::f32_to_f16_slice(&src[1..], &mut expected);

    for kernel in admitted_kernels() {
        if kernel.direction() != Direction::F32ToF16 {
            continue;
        }
        let mut dst = vec![0u16; 1025];
        let processed = invoke(
            kernel,
            &mut Conversion::F32ToF16 {
                src: &src[1..],
                dst: &mut dst[1..],
            },
        );
        assert_eq!(dst[1..1 + processed], expected[..processed], "{}", kernel.name);
    }
}
