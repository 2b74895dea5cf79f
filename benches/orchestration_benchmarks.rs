use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use insights_core::models::{AnalysisInputs, EmotionEntry};
use insights_core::{FingerprintBuilder, InsightsConfig, ResultCache};
use std::collections::BTreeSet;

fn dataset(records: i64) -> AnalysisInputs {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut inputs = AnalysisInputs::new("bench-student");
    inputs.emotions = (0..records)
        .map(|i| EmotionEntry {
            id: format!("e{i}"),
            student_id: "bench-student".to_string(),
            timestamp: start + Duration::hours(i),
            emotion: "calm".to_string(),
            intensity: Some(3.0),
            triggers: vec![],
        })
        .collect();
    inputs
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let config = InsightsConfig::default();
    let builder = FingerprintBuilder::new(config.cache.schema_version);
    let inputs = dataset(500);
    c.bench_function("fingerprint_500_records", |b| {
        b.iter(|| builder.build_key(black_box(&inputs), &config.fingerprint_subset()))
    });
}

fn benchmark_cache_set_get(c: &mut Criterion) {
    let cache: ResultCache<u64> = ResultCache::from_config(&InsightsConfig::default().cache);
    c.bench_function("cache_set_get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key-{}", i % 512);
            cache.set(&key, i, BTreeSet::new(), None);
            i += 1;
            black_box(cache.get(&key))
        })
    });
}

criterion_group!(benches, benchmark_fingerprint, benchmark_cache_set_get);
criterion_main!(benches);
