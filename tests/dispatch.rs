//! End-to-end behavior of the dispatcher: whatever kernels it selects, the
//! observable output is the scalar reference.

mod common;

use rand::rngs::StdRng;
use rand::SeedableRng;

use simdcast::validate::{
    expected_checksum, validate_scalar, ReferenceSet, REFERENCE_LEN, SMALL_F16_CHECKSUM,
    SMALL_F16_INPUT,
};
use simdcast::{
    checksum, AlignedBuffer, Capabilities, CastError, Conversion, Direction, Dispatcher, Feature,
    U8Policy, PAGE_ALIGNMENT, PARALLEL_THRESHOLD,
};

fn dispatchers() -> Vec<Dispatcher> {
    let caps = Capabilities::detect();
    vec![
        Dispatcher::new(caps),
        Dispatcher::new(caps.restrict(&[Feature::Avx512f, Feature::Avx2])),
        Dispatcher::scalar(),
    ]
}

#[test]
fn test_small_f16_scenario() {
    for dispatcher in dispatchers() {
        let mut half = [0u16; 4];
        dispatcher.f32_to_f16(&SMALL_F16_INPUT, &mut half).unwrap();
        assert_eq!(half, [0x3C7E, 0x3C7F, 0x3C80, 0x3C81]);
        assert_eq!(checksum(&half), SMALL_F16_CHECKSUM);
    }
}

#[test]
fn test_reference_checksums_through_dispatcher() {
    let fixture = ReferenceSet::new().unwrap();
    let n = REFERENCE_LEN;

    for dispatcher in dispatchers() {
        let mut half = AlignedBuffer::<u16>::zeroed(2 * n, PAGE_ALIGNMENT).unwrap();
        dispatcher
            .f32_to_f16(fixture.floats(), &mut half[..n])
            .unwrap();
        assert_eq!(checksum(&half), expected_checksum(Direction::F32ToF16));

        let mut bf = AlignedBuffer::<u16>::zeroed(2 * n, PAGE_ALIGNMENT).unwrap();
        dispatcher
            .f32_to_bf16(fixture.floats(), &mut bf[..n])
            .unwrap();
        assert_eq!(checksum(&bf), expected_checksum(Direction::F32ToBf16));

        let mut wide = AlignedBuffer::<f32>::zeroed(n, PAGE_ALIGNMENT).unwrap();
        dispatcher
            .f16_to_f32(&fixture.halves()[..n], &mut wide)
            .unwrap();
        assert_eq!(checksum(&wide), expected_checksum(Direction::F16ToF32));

        dispatcher
            .bf16_to_f32(&fixture.halves()[..n], &mut wide)
            .unwrap();
        assert_eq!(checksum(&wide), expected_checksum(Direction::Bf16ToF32));

        dispatcher.u8_to_f32(&fixture.bytes()[..n], &mut wide).unwrap();
        assert_eq!(checksum(&wide), expected_checksum(Direction::U8ToF32));

        for policy in [U8Policy::Saturating, U8Policy::Narrowing] {
            let mut bytes = AlignedBuffer::<u8>::zeroed(4 * n, PAGE_ALIGNMENT).unwrap();
            dispatcher
                .f32_to_u8(fixture.floats(), &mut bytes[..n], policy)
                .unwrap();
            assert_eq!(
                checksum(&bytes),
                expected_checksum(Direction::f32_to_u8(policy))
            );
        }
    }
}

#[test]
fn test_scalar_matches_recorded_checksums() {
    let fixture = ReferenceSet::new().unwrap();
    for direction in Direction::ALL {
        validate_scalar(direction, &fixture).unwrap();
    }
}

#[test]
fn test_nan_outputs_are_quiet() {
    let nans = [
        f32::from_bits(0x7F80_0001),
        f32::from_bits(0xFF90_0000),
        f32::from_bits(0x7FC0_0000),
        f32::from_bits(0x7FFF_FFFF),
    ];
    let input: Vec<f32> = nans.iter().copied().cycle().take(64).collect();

    for dispatcher in dispatchers() {
        let mut half = vec![0u16; input.len()];
        dispatcher.f32_to_f16(&input, &mut half).unwrap();
        assert!(half.iter().all(|&h| h & 0x7C00 == 0x7C00 && h & 0x0200 != 0));
        assert_eq!(half[..4], [0x7E00, 0xFE80, 0x7E00, 0x7FFF]);

        let mut bf = vec![0u16; input.len()];
        dispatcher.f32_to_bf16(&input, &mut bf).unwrap();
        assert!(bf.iter().all(|&b| b & 0x7F80 == 0x7F80 && b & 0x0040 != 0));
        assert_eq!(bf[..4], [0x7FC0, 0xFFD0, 0x7FC0, 0x7FFF]);

        let signaling: Vec<u16> = [0x7C01u16, 0xFD00].repeat(16);
        let mut wide = vec![0f32; signaling.len()];
        dispatcher.f16_to_f32(&signaling, &mut wide).unwrap();
        assert!(wide.iter().all(|v| v.is_nan() && v.to_bits() & 0x0040_0000 != 0));
        assert_eq!(wide[0].to_bits(), 0x7FC0_2000);
        assert_eq!(wide[1].to_bits(), 0xFFE0_0000);
    }
}

#[test]
fn test_u8_saturation_boundaries() {
    let input = [
        255.4f32,
        255.6,
        -0.6,
        -1.0,
        300.0,
        f32::NAN,
        f32::INFINITY,
        f32::NEG_INFINITY,
        2.5,
        3.5,
        1.0e10,
        -1.0e10,
        0.49999997,
        127.5,
        128.5,
        0.0,
    ];
    let saturated = [255u8, 255, 0, 0, 255, 0, 255, 0, 2, 4, 255, 0, 0, 128, 128, 0];
    let narrowed = [255u8, 0, 255, 255, 44, 0, 0, 0, 2, 4, 0, 0, 0, 128, 128, 0];

    // repeated so the kernels, not only the scalar tail, see every case
    let src = input.repeat(8);
    for dispatcher in dispatchers() {
        let mut dst = vec![0u8; src.len()];
        dispatcher
            .f32_to_u8(&src, &mut dst, U8Policy::Saturating)
            .unwrap();
        assert_eq!(
            dst,
            saturated.repeat(8),
            "{}",
            dispatcher.selected(Direction::F32ToU8Saturating)
        );

        dispatcher
            .f32_to_u8(&src, &mut dst, U8Policy::Narrowing)
            .unwrap();
        assert_eq!(
            dst,
            narrowed.repeat(8),
            "{}",
            dispatcher.selected(Direction::F32ToU8Narrowing)
        );
    }
}

#[test]
fn test_par_convert_matches_convert() {
    let mut rng = StdRng::seed_from_u64(2024);
    let len = PARALLEL_THRESHOLD * 2 + 13;
    let floats = common::random_floats(&mut rng, len);
    let halves = common::random_u16(&mut rng, len);
    let dispatcher = Dispatcher::new(Capabilities::detect());

    let (mut seq, mut par) = (vec![0u16; len], vec![0u16; len]);
    dispatcher
        .convert(Conversion::F32ToF16 {
            src: &floats,
            dst: &mut seq,
        })
        .unwrap();
    dispatcher
        .par_convert(Conversion::F32ToF16 {
            src: &floats,
            dst: &mut par,
        })
        .unwrap();
    assert_eq!(seq, par);

    let (mut seq, mut par) = (vec![0f32; len], vec![0f32; len]);
    dispatcher
        .convert(Conversion::Bf16ToF32 {
            src: &halves,
            dst: &mut seq,
        })
        .unwrap();
    dispatcher
        .par_convert(Conversion::Bf16ToF32 {
            src: &halves,
            dst: &mut par,
        })
        .unwrap();
    assert!(seq.iter().zip(&par).all(|(a, b)| a.to_bits() == b.to_bits()));

    let (mut seq, mut par) = (vec![0u8; len], vec![0u8; len]);
    dispatcher
        .convert(Conversion::F32ToU8 {
            src: &floats,
            dst: &mut seq,
            policy: U8Policy::Narrowing,
        })
        .unwrap();
    dispatcher
        .par_convert(Conversion::F32ToU8 {
            src: &floats,
            dst: &mut par,
            policy: U8Policy::Narrowing,
        })
        .unwrap();
    assert_eq!(seq, par);
}

#[test]
fn test_restricted_capabilities_fall_back() {
    let caps = Capabilities::detect().restrict(&Feature::ALL);
    let dispatcher = Dispatcher::new(caps);
    for direction in Direction::ALL {
        assert_eq!(dispatcher.selected(direction), "scalar");
    }

    let caps = Capabilities::detect().restrict_by_names("f16c,fp16").unwrap();
    let dispatcher = Dispatcher::new(caps);
    assert_eq!(dispatcher.selected(Direction::F32ToF16), "scalar");
    assert_eq!(dispatcher.selected(Direction::F16ToF32), "scalar");
}

#[test]
fn test_invalid_configuration_is_reported() {
    assert!(matches!(
        Capabilities::detect().restrict_by_names("avx2,quantum"),
        Err(CastError::UnknownFeature { name }) if name == "quantum"
    ));
    assert!(matches!(
        Dispatcher::with_kernel(Capabilities::detect(), "nope"),
        Err(CastError::UnknownKernel { .. })
    ));
}
