use criterion::{black_box, criterion_group, criterion_main, Criterion};
use radio_recorder::{npy, signal};
use rand::prelude::*;

// Two seconds of IQ at 2.048 MS/s, one calibration probe
const PROBE_BYTES: usize = 4 * 2_048_000;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let mut probe = vec![0u8; PROBE_BYTES];
    rng.fill(&mut probe[..]);
    let iq = signal::iq_from_bytes(&probe);

    c.bench_function("byte level", |b| {
        b.iter(|| signal::byte_level(black_box(&probe)))
    });

    c.bench_function("iq from bytes", |b| {
        b.iter(|| signal::iq_from_bytes(black_box(&probe)))
    });

    c.bench_function("iq level", |b| b.iter(|| signal::iq_level(black_box(&iq))));

    let mut out = Vec::with_capacity(PROBE_BYTES + 128);
    c.bench_function("npy encode", |b| {
        b.iter(|| {
            out.clear();
            npy::write_bytes(black_box(&mut out), black_box(&probe))
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
