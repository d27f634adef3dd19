use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tapedeck::fingerprint::fingerprint_request;
use tapedeck::Request;

fn bench_fingerprint_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let request = Request::new("POST", "http://api.test/api/rest/v1/files")
                .with_header("Content-Type", "application/octet-stream")
                .with_body(vec![b'x'; size]);

            b.iter(|| fingerprint_request(black_box(&request)));
        });
    }

    group.finish();
}

fn bench_fingerprint_json(c: &mut Criterion) {
    let fields: Vec<String> = (0..50).map(|i| format!("\"field_{i}\": {i}")).collect();
    let request = Request::new("POST", "http://api.test/api/rest/v1/users")
        .with_header("Content-Type", "application/json")
        .with_body(format!("{{{}}}", fields.join(", ")));

    c.bench_function("fingerprint_json_50_fields", |b| {
        b.iter(|| fingerprint_request(black_box(&request)));
    });
}

criterion_group!(benches, bench_fingerprint_sizes, bench_fingerprint_json);
criterion_main!(benches);
