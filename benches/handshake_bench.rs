//! Handshake path benchmarks
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_target_parsing(c: &mut Criterion) {
    use ws_relay::tunnel::parse_target;

    let mut group = c.benchmark_group("target_parsing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("connect_host_port", |b| {
        b.iter(|| black_box(parse_target(black_box("CONNECT:www.example.org:443"))))
    });

    group.bench_function("legacy_suffix", |b| {
        b.iter(|| black_box(parse_target(black_box("conn:www.example.org:8443|payload:data"))))
    });

    group.bench_function("bracketed_ipv6", |b| {
        b.iter(|| black_box(parse_target(black_box("CONNECT:[2001:db8::1]:443"))))
    });

    group.finish();
}

fn bench_fallback_selection(c: &mut Criterion) {
    use ws_relay::config::FallbackConfig;
    use ws_relay::tunnel::AddressPool;

    let config = FallbackConfig {
        addresses: (0..64).map(|i| format!("10.0.{}.1:443", i)).collect(),
        ..FallbackConfig::default()
    };
    let pool = AddressPool::from_config(&config);

    c.bench_function("pick_fallback", |b| b.iter(|| black_box(pool.pick_fallback())));
}

criterion_group!(benches, bench_target_parsing, bench_fallback_selection);
criterion_main!(benches);
