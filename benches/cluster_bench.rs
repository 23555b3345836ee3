use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tns_core::clock::ManualClock;
use tns_core::types::{ClusterNode, State};
use tns_core::MembershipTable;
use tokio::runtime::Runtime;

fn snapshot(size: u64, ts: u64) -> Vec<ClusterNode> {
    (1..=size)
        .map(|id| ClusterNode::new(id, format!("10.0.{}.{}", id / 256, id % 256), 8700, ts).with_state(State::Up))
        .collect()
}

pub fn cluster_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");
    let rt = Runtime::new().unwrap();

    group.bench_function("merge_1000", |b| {
        let table = MembershipTable::new(1, Arc::new(ManualClock::new(1)));
        let mut ts = 0;
        b.iter(|| {
            ts += 1;
            let incoming = snapshot(1000, ts);
            rt.block_on(async { black_box(table.merge(incoming).await) });
        })
    });

    group.bench_function("ring_successor_1000", |b| {
        let table = MembershipTable::new(500, Arc::new(ManualClock::new(1)));
        rt.block_on(table.merge(snapshot(1000, 1)));
        b.iter(|| rt.block_on(async { black_box(table.ring_successor().await) }))
    });

    group.finish();
}

criterion_group!(benches, cluster_benchmark);
criterion_main!(benches);
