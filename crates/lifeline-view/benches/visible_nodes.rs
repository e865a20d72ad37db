use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use lifeline_cluster::TreeBuilder;
use lifeline_core::{DataVersion, Dataset, EngineConfig, Normalizer};
use lifeline_sim::{CorpusConfig, generate};
use lifeline_view::{Aggregator, NoRebuild, ViewportController};

const SIZES: [usize; 3] = [1_000, 10_000, 50_000];

fn dataset(count: usize) -> Arc<Dataset> {
    let events = generate(&CorpusConfig::sized(count, 20, 0x11FE));
    Arc::new(Dataset::ingest(events, DataVersion::new(1), &Normalizer::default()).0)
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree.build");
    group.sample_size(10);
    let builder = TreeBuilder::new(&EngineConfig::default());

    for count in SIZES {
        let data = dataset(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| black_box(builder.build(Arc::clone(data)).event_count()));
        });
    }

    group.finish();
}

fn bench_visible_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("nodes.compute");
    let config = EngineConfig::default();
    let origin = Utc
        .with_ymd_and_hms(2004, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let centre = Utc
        .with_ymd_and_hms(2014, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();

    for count in SIZES {
        let tree = TreeBuilder::new(&config).build(dataset(count));
        for level in [0.1, 0.5, 0.9] {
            let mut vc = ViewportController::new(config.zoom.clone(), origin, 1_600.0);
            vc.set_zoom_level(level);
            vc.center_on(centre);

            // Fresh aggregator per iteration so every call misses the memo.
            group.bench_with_input(
                BenchmarkId::new(format!("zoom-{level}"), count),
                &tree,
                |b, tree| {
                    b.iter(|| {
                        let mut agg = Aggregator::new(&config, Arc::new(NoRebuild));
                        black_box(agg.compute_visible_nodes(vc.state(), tree, DataVersion::new(1)).nodes.len())
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_tree_build, bench_visible_nodes);
criterion_main!(benches);
