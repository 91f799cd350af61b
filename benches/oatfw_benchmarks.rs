//! Performance benchmarks for build configuration handling
//!
//! `platformio.ini` is parsed after every download and scanned before every
//! build, so both should stay cheap even for large generated files.

use criterion::{Criterion, criterion_group, criterion_main};
use oatfw::catalog::BoardEnvironmentCatalog;
use oatfw::catalog::hotpatch::{patch_content, scan};
use std::hint::black_box;

/// A configuration with `count` environments, some AVR, some pinned
fn synthetic_ini(count: usize) -> String {
    let mut ini = String::from(
        "[platformio]\ndefault_envs = ramps\n\n[env]\nlib_deps =\n  https://github.com/OpenAstroTech/AccelStepper@1.61.1\n  teemuatlut/TMCStepper @ 0.7.3\n\n[env:native]\nplatform = native\n\n",
    );
    for i in 0..count {
        let (name, platform) = match i % 3 {
            0 => (format!("ramps{}", i), "platform = atmelavr"),
            1 => (format!("mksgenlv{}", i), "platform = atmelavr@4.0.1"),
            _ => (format!("esp32_{}", i), "platform = espressif32@3.2.0"),
        };
        ini.push_str(&format!(
            "[env:{}]\n{}\nboard = generic\nbuild_flags =\n  -D BOARD_{}\n\n",
            name, platform, i
        ));
    }
    ini
}

/// Benchmark environment discovery
fn benchmark_environment_parsing(c: &mut Criterion) {
    let ini = synthetic_ini(200);

    c.bench_function("environment_parse_200", |b| {
        b.iter(|| {
            let environments = BoardEnvironmentCatalog::parse(black_box(ini.lines()));
            black_box(environments);
        });
    });
}

/// Benchmark the pre-build scan and patch
fn benchmark_hot_patch(c: &mut Criterion) {
    let ini = synthetic_ini(200);
    let patched = patch_content(&ini, "ramps0");

    c.bench_function("hot_patch_scan_unpatched", |b| {
        b.iter(|| black_box(scan(black_box(&ini), "ramps0")));
    });

    c.bench_function("hot_patch_scan_patched", |b| {
        b.iter(|| black_box(scan(black_box(&patched), "ramps0")));
    });

    c.bench_function("hot_patch_rewrite", |b| {
        b.iter(|| black_box(patch_content(black_box(&ini), "ramps0")));
    });
}

criterion_group!(benches, benchmark_environment_parsing, benchmark_hot_patch);

criterion_main!(benches);
