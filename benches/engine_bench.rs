// Engine benchmarks: end-to-end scripted workloads through the drive loop.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use replicadb::execution::Database;

const CONTENTION_SCRIPT: &str = "\
begin(T1); begin(T2); begin(T3)
R(T1, x2)
W(T2, x2, 50)
R(T3, x2)
W(T1, x4, 40)
end(T1)
end(T2)
end(T3)
dump()
";

const DEADLOCK_SCRIPT: &str = "\
begin(T1); begin(T2)
W(T1, x1, 1)
W(T2, x2, 2)
W(T1, x2, 3)
W(T2, x1, 4)
end(T1)
end(T2)
";

const FAILOVER_SCRIPT: &str = "\
beginRO(T1)
fail(2)
R(T1, x2)
R(T1, x4)
recover(2)
begin(T2)
W(T2, x2, 99)
end(T2)
end(T1)
dump(x2)
";

fn bench_contended_workload(c: &mut Criterion) {
    c.bench_function("contended_workload", |b| {
        b.iter(|| {
            let mut db = Database::new();
            black_box(db.execute_script(CONTENTION_SCRIPT));
        });
    });
}

fn bench_deadlock_resolution(c: &mut Criterion) {
    c.bench_function("deadlock_resolution", |b| {
        b.iter(|| {
            let mut db = Database::new();
            black_box(db.execute_script(DEADLOCK_SCRIPT));
        });
    });
}

fn bench_failover_snapshot_reads(c: &mut Criterion) {
    c.bench_function("failover_snapshot_reads", |b| {
        b.iter(|| {
            let mut db = Database::new();
            black_box(db.execute_script(FAILOVER_SCRIPT));
        });
    });
}

criterion_group!(
    benches,
    bench_contended_workload,
    bench_deadlock_resolution,
    bench_failover_snapshot_reads
);
criterion_main!(benches);
