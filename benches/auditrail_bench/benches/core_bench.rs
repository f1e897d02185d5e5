//! Hot-path benchmarks for the audit pipeline.

use auditrail::filter::{SortField, SortOrder};
use auditrail::query::Field;
use auditrail::testing::{sample_activity, sample_record};
use auditrail::{
    collect_metadata, detect_category, normalize_filter, sanitize_metadata, validate_params,
    ActivityFilter, ActivityLog, InMemoryActivityStore, MonitorConfig, RealTimeMonitor, Severity,
    StoreQuery,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

const ACTIONS: [&str; 8] = [
    "login",
    "login_failed",
    "user_created",
    "user_deleted",
    "record_updated",
    "backup_failed",
    "ip_blocked",
    "unknown_action",
];

fn seeded_logs(n: usize) -> Vec<ActivityLog> {
    let store = InMemoryActivityStore::new();
    let now = chrono::Utc::now();
    (0..n)
        .filter_map(|i| {
            let mut record = sample_record(ACTIONS[i % ACTIONS.len()]);
            record.user_id = Some((i % 50) as i64 + 1);
            store
                .insert_at(record, now - chrono::Duration::seconds(i as i64))
                .ok()
        })
        .collect()
}

fn bench_categorization(c: &mut Criterion) {
    c.bench_function("detect_category", |b| {
        b.iter(|| {
            for action in ACTIONS {
                black_box(detect_category(black_box(action)));
            }
        })
    });
}

fn bench_validation(c: &mut Criterion) {
    let activity = sample_activity("user_updated").user(12).session("sess-abc");
    c.bench_function("validate_params", |b| {
        b.iter(|| validate_params(black_box(&activity)))
    });
}

fn bench_metadata(c: &mut Criterion) {
    let metadata = json!({
        "request": {"path": "/api/users/12", "headers": {"authorization": "Bearer abc", "accept": "*/*"}},
        "user": {"email": "a@example.com", "password": "hunter2"},
        "items": [{"token": "t1"}, {"token": "t2"}, {"name": "ok"}],
    });
    c.bench_function("sanitize_metadata", |b| {
        b.iter(|| sanitize_metadata(black_box(&metadata)))
    });

    c.bench_function("collect_metadata", |b| {
        b.iter(|| collect_metadata(black_box(sample_activity("login_failed"))).ok())
    });
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_query_apply");
    for size in [1_000usize, 10_000] {
        let logs = seeded_logs(size);
        let query = StoreQuery::new()
            .eq(Field::Severity, Severity::High)
            .search("login")
            .order_by(SortField::CreatedAt, SortOrder::Desc)
            .limit(50);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &logs, |b, logs| {
            b.iter(|| query.apply(black_box(logs)))
        });
    }
    group.finish();

    let filter = ActivityFilter::new()
        .category("security")
        .date_range("2024-01-01", "2024-12-31")
        .page(3, 5000)
        .sort("bogus", "up");
    c.bench_function("normalize_filter", |b| {
        b.iter(|| normalize_filter(black_box(&filter)))
    });
}

fn bench_monitor(c: &mut Criterion) {
    let logs = seeded_logs(2_000);
    let monitor = RealTimeMonitor::new(MonitorConfig::default());
    c.bench_function("monitor_ingest", |b| {
        let mut i = 0;
        b.iter(|| {
            let alerts = monitor.monitor_real_time_activity(black_box(&logs[i % logs.len()]));
            i += 1;
            alerts
        })
    });
}

criterion_group!(
    benches,
    bench_categorization,
    bench_validation,
    bench_metadata,
    bench_query,
    bench_monitor
);
criterion_main!(benches);
