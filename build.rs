use std::env;
use std::process::Command;

// Toolchain capabilities the kernels depend on
#[derive(PartialEq, Eq, Debug)]
struct Toolchain {
    channel: &'static str,
    minor: u32,
}

impl Toolchain {
    // First stable release where the AVX-512 target features and the
    // `_mm512_*` intrinsics used by `simd::avx512` are available
    const AVX512_STABLE_MINOR: u32 = 89;

    fn detect() -> Toolchain {
        let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
        let output = Command::new(rustc)
            .args(["--version", "--verbose"])
            .output()
            .expect("Failed to execute rustc");

        let version_info = String::from_utf8_lossy(&output.stdout);

        let channel = if version_info.contains("nightly") {
            "nightly"
        } else {
            "stable"
        };

        // "release: 1.89.0" (or "1.90.0-nightly")
        let minor = version_info
            .lines()
            .find_map(|line| line.strip_prefix("release: "))
            .and_then(|release| release.split('.').nth(1))
            .and_then(|minor| minor.parse().ok())
            .unwrap_or(0);

        Toolchain { channel, minor }
    }

    fn avx512_stable(&self) -> bool {
        self.minor >= Self::AVX512_STABLE_MINOR
    }

    fn avx512_nightly(&self) -> bool {
        self.channel == "nightly" && !self.avx512_stable()
    }

    fn apply(&self) {
        println!("cargo:rustc-cfg=rustc_channel=\"{}\"", self.channel);

        let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
        let x86 = target_arch == "x86" || target_arch == "x86_64";

        // The 512-bit family is only compiled when the intrinsics exist;
        // the runtime probe still decides whether it may run.
        if x86 && (self.avx512_stable() || self.avx512_nightly()) {
            println!("cargo:rustc-cfg=avx512");
        }

        if x86 && self.avx512_nightly() {
            println!("cargo:rustc-cfg=avx512_nightly");
        }

        println!("cargo::rustc-check-cfg=cfg(rustc_channel, values(\"nightly\", \"stable\"))");
        println!("cargo::rustc-check-cfg=cfg(avx512)");
        println!("cargo::rustc-check-cfg=cfg(avx512_nightly)");
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RUSTC");

    Toolchain::detect().apply();
}
