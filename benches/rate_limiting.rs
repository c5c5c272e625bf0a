use brute_guard::{
    AttemptQuery, Limits, MemoryRuleStore, PermitChecker, PermitLimits, RuleMatcher, RuleVerdict,
    WindowRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

/// Hits on one hot key
fn bench_single_key(c: &mut Criterion) {
    let rt = runtime();
    let registry = rt.block_on(async { WindowRegistry::new() });
    let limits = Limits::new(Duration::from_secs(60), u64::MAX).unwrap();

    let mut group = c.benchmark_group("single_key");
    group.throughput(Throughput::Elements(1));
    group.bench_function("test_and_count", |b| {
        b.iter(|| registry.test_and_count(black_box("login_alice"), limits))
    });
    group.finish();

    rt.block_on(registry.shutdown());
}

/// Hits spread over many keys, so lookups dominate
fn bench_key_diversity(c: &mut Criterion) {
    let rt = runtime();
    let limits = Limits::new(Duration::from_secs(60), 10).unwrap();

    let mut group = c.benchmark_group("key_diversity");
    for key_count in [10usize, 1_000, 10_000] {
        let registry = rt.block_on(async { WindowRegistry::new() });
        let keys: Vec<String> = (0..key_count)
            .map(|i| format!("ip_10.0.{}.{}", i / 256, i % 256))
            .collect();

        group.throughput(Throughput::Elements(key_count as u64));
        group.bench_with_input(BenchmarkId::new("keys", key_count), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    let _ = black_box(registry.test_and_count(key, limits));
                }
            })
        });

        rt.block_on(registry.shutdown());
    }
    group.finish();
}

/// Several threads hammering their own keys
fn bench_concurrent_counting(c: &mut Criterion) {
    let rt = runtime();
    let limits = Limits::new(Duration::from_secs(60), u64::MAX).unwrap();

    let mut group = c.benchmark_group("concurrent");
    for num_threads in [2, 4, 8] {
        let registry = Arc::new(rt.block_on(async { WindowRegistry::new() }));
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let registry = Arc::clone(&registry);
                            std::thread::spawn(move || {
                                let key = format!("login_user{t}");
                                for _ in 0..1000 {
                                    let _ = black_box(registry.test_and_count(&key, limits));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
        rt.block_on(registry.shutdown());
    }
    group.finish();
}

/// Full permit decision, unlisted address and allow-listed address
fn bench_permit_check(c: &mut Criterion) {
    let rt = runtime();
    let (checker, registry) = rt.block_on(async {
        let rules = RuleMatcher::new(Arc::new(MemoryRuleStore::new()));
        for i in 0..100u8 {
            let network = format!("172.16.{i}.0/24").parse().unwrap();
            rules.add_rule(RuleVerdict::Deny, network).await.unwrap();
        }
        rules
            .add_rule(RuleVerdict::Allow, "192.168.1.0/24".parse().unwrap())
            .await
            .unwrap();

        let registry = Arc::new(WindowRegistry::new());
        let limits = PermitLimits {
            login: u64::MAX,
            password: u64::MAX,
            ip: u64::MAX,
        };
        let checker =
            PermitChecker::new(rules, registry.clone(), Duration::from_secs(60), limits).unwrap();
        (checker, registry)
    });

    let unlisted = AttemptQuery::new("alice", "secret", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    let allowed = AttemptQuery::new("alice", "secret", IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)));

    let mut group = c.benchmark_group("permit_check");
    group.bench_function("unlisted", |b| {
        b.to_async(&rt).iter(|| checker.check(black_box(&unlisted)))
    });
    group.bench_function("allow_listed", |b| {
        b.to_async(&rt).iter(|| checker.check(black_box(&allowed)))
    });
    group.finish();

    rt.block_on(registry.shutdown());
}

criterion_group!(
    benches,
    bench_single_key,
    bench_key_diversity,
    bench_concurrent_counting,
    bench_permit_check
);
criterion_main!(benches);
