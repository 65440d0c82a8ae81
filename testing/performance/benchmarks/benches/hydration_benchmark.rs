// Performance benchmarks for profile hydration hot paths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grants_hydration::cache::{build_cache_key, LocalCache};
use grants_hydration::plugin::{PluginRegistry, ProfileData, ProfilePlugin};
use grants_hydration::plugins::DemoProfilePlugin;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn benchmark_cache_key(c: &mut Criterion) {
    let profile_id = Uuid::new_v4();

    c.bench_function("build_cache_key", |b| {
        b.iter(|| {
            build_cache_key(
                black_box("profile:"),
                black_box(profile_id),
                black_box("DEMO"),
                black_box("PROGRAM1"),
                black_box("SUBMISSIONS"),
            )
        });
    });
}

fn benchmark_registry_validation(c: &mut Criterion) {
    let registry = PluginRegistry::new();
    let plugins: Vec<Arc<dyn ProfilePlugin>> =
        vec![Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO))];
    registry.initialize(&plugins);

    c.bench_function("validate_provider_key", |b| {
        b.iter(|| registry.is_valid_provider_key(black_box("demo"), black_box("program1"), black_box("contacts")));
    });
}

fn benchmark_profile_decode(c: &mut Criterion) {
    let encoded = serde_json::json!({
        "profileId": Uuid::new_v4(),
        "pluginId": "DEMO",
        "provider": "PROGRAM1",
        "key": "SUBMISSIONS",
        "jsonData": "{\"Data\":{\"Submissions\":[],\"Summary\":{\"TotalSubmissions\":0}}}",
        "populatedAt": "2024-05-01T12:00:00Z"
    })
    .to_string();

    c.bench_function("decode_profile_data", |b| {
        b.iter(|| {
            let _: ProfileData = serde_json::from_str(black_box(&encoded)).unwrap();
        });
    });
}

fn benchmark_local_cache(c: &mut Criterion) {
    let cache = LocalCache::temporary().unwrap();
    let value = vec![7u8; 2048];
    cache.put("bench-key", &value, Duration::from_secs(600)).unwrap();

    c.bench_function("local_cache_get", |b| {
        b.iter(|| cache.get(black_box("bench-key")).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_cache_key,
    benchmark_registry_validation,
    benchmark_profile_decode,
    benchmark_local_cache
);
criterion_main!(benches);
