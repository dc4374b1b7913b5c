//! Capability and kernel validation report.
//!
//! Probes the CPU, validates the scalar reference and every compiled kernel
//! against the recorded checksums, and prints which implementation the
//! dispatcher selects per direction.
//!
//! `RUST_LOG` controls log output (default `info`). `SIMDCAST_DISABLE` takes a
//! comma-separated list of CPU features to mask out, e.g. `avx512f,f16c`.

use std::env;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use simdcast::validate::{
    validate_kernel, validate_scalar, ReferenceSet, SMALL_F16_CHECKSUM, SMALL_F16_INPUT,
};
use simdcast::{
    checksum, verify, Capabilities, CastError, Direction, Dispatcher, KernelRegistry, Result,
};

const DISABLE_VAR: &str = "SIMDCAST_DISABLE";

fn capabilities() -> Result<Capabilities> {
    let detected = Capabilities::detect();
    match env::var(DISABLE_VAR) {
        Ok(names) => {
            let restricted = detected.restrict_by_names(&names)?;
            info!(disabled = %names, "masking CPU features");
            Ok(restricted)
        }
        Err(_) => Ok(detected),
    }
}

fn kernel_report(caps: &Capabilities, fixture: &ReferenceSet) -> (usize, usize) {
    let registry = KernelRegistry::new();
    let (mut passed, mut failed) = (0, 0);

    println!("{:<32} {:>8} {:>7}  status", "kernel", "isa", "block");
    for kernel in registry.all() {
        let status = match validate_kernel(kernel, caps, fixture) {
            Ok(()) => {
                passed += 1;
                "ok".to_string()
            }
            Err(CastError::UnsupportedKernel { missing, .. }) => format!("skipped (no {missing})"),
            Err(err) => {
                failed += 1;
                format!("FAILED: {err}")
            }
        };
        println!(
            "{:<32} {:>8} {:>7}  {status}",
            kernel.name,
            kernel.isa,
            kernel.block()
        );
    }
    (passed, failed)
}

/// Converts four floats near 1.12 to float16 and checks the output bytes.
fn smoke_test(dispatcher: &Dispatcher) -> Result<()> {
    let mut half = [0u16; 4];
    dispatcher.f32_to_f16(&SMALL_F16_INPUT, &mut half)?;
    verify(dispatcher.selected(Direction::F32ToF16), &half, SMALL_F16_CHECKSUM)?;
    println!("f32 -> f16 {:04x?} (crc {})", half, checksum(&half));
    Ok(())
}

fn run() -> Result<bool> {
    let caps = capabilities()?;
    println!("cpu: {caps}");

    let fixture = ReferenceSet::new()?;
    let mut healthy = true;
    for direction in Direction::ALL {
        if let Err(err) = validate_scalar(direction, &fixture) {
            error!(%direction, error = %err, "scalar reference does not match");
            healthy = false;
        }
    }

    let (passed, failed) = kernel_report(&caps, &fixture);
    println!("{passed} kernels passed, {failed} failed");
    healthy &= failed == 0;

    let dispatcher = Dispatcher::new(caps);
    println!();
    for direction in Direction::ALL {
        println!("{:<20} -> {}", direction, dispatcher.selected(direction));
    }

    smoke_test(&dispatcher)?;
    Ok(healthy)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "validation aborted");
            ExitCode::from(2)
        }
    }
}
