use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use readiness_catalog::{InMemoryCatalog, ProductId, ProductKind, RelationKind};
use readiness_core::TenantId;
use readiness_events::{EventEnvelope, InMemoryEventBus};
use readiness_inspection::{
    CheckKind, CheckSet, ExecutionMode, InMemoryInspectionStore, InMemoryTaskQueue,
    InspectionEvent, InvalidationPropagator, ReconciliationEngine,
};

type Store = Arc<InMemoryInspectionStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<InspectionEvent>>>;

struct Graph {
    tenant: TenantId,
    catalog: Arc<InMemoryCatalog>,
    queue: Arc<InMemoryTaskQueue>,
    propagator: InvalidationPropagator<Store, Bus>,
    leaf: ProductId,
}

impl Graph {
    fn build(shape: impl FnOnce(&InMemoryCatalog, TenantId, ProductId) -> Vec<ProductId>) -> Self {
        let tenant = TenantId::new();
        let catalog = Arc::new(InMemoryCatalog::new());
        let store: Store = Arc::new(InMemoryInspectionStore::new());
        // No subscribers: publishing stays cheap and nothing accumulates.
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let engine = Arc::new(ReconciliationEngine::new(catalog.clone(), store, bus));
        let queue = Arc::new(InMemoryTaskQueue::new());

        let (leaf, _) = catalog.create_product(tenant, ProductKind::Simple).unwrap();
        let mut products = shape(&catalog, tenant, leaf);
        products.push(leaf);
        for product in products {
            engine.ensure_inspection(tenant, product).unwrap();
        }

        Self {
            tenant,
            catalog,
            propagator: InvalidationPropagator::new(engine, queue.clone()),
            queue,
            leaf,
        }
    }

    /// `depth` bundles stacked on top of the leaf.
    fn chain(depth: usize) -> Self {
        Self::build(|catalog, tenant, leaf| {
            let mut child = leaf;
            let mut products = Vec::with_capacity(depth);
            for _ in 0..depth {
                let (bundle, _) = catalog.create_product(tenant, ProductKind::Bundle).unwrap();
                catalog
                    .relate(tenant, RelationKind::BundleItem, bundle, child)
                    .unwrap();
                products.push(bundle);
                child = bundle;
            }
            products
        })
    }

    /// `width` bundles that all contain the leaf.
    fn fan(width: usize) -> Self {
        Self::build(|catalog, tenant, leaf| {
            (0..width)
                .map(|_| {
                    let (bundle, _) = catalog.create_product(tenant, ProductKind::Bundle).unwrap();
                    catalog
                        .relate(tenant, RelationKind::BundleItem, bundle, leaf)
                        .unwrap();
                    bundle
                })
                .collect()
        })
    }

    /// Toggle the leaf's image and propagate the change.
    fn touch_leaf(&self, attach: bool, mode: ExecutionMode) {
        if attach {
            self.catalog.attach_image(self.tenant, self.leaf).unwrap();
        } else {
            self.catalog.detach_image(self.tenant, self.leaf).unwrap();
        }
        let report = self
            .propagator
            .propagate(
                self.tenant,
                self.leaf,
                &CheckSet::from([CheckKind::HasImages]),
                mode,
            )
            .unwrap();
        black_box(report);
        self.queue.drain();
    }
}

fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for depth in [1_usize, 8, 32, 128] {
        group.throughput(Throughput::Elements(depth as u64 + 1));
        for mode in [ExecutionMode::Inline, ExecutionMode::Deferred] {
            group.bench_with_input(BenchmarkId::new(mode.as_str(), depth), &depth, |b, &depth| {
                let graph = Graph::chain(depth);
                let mut attach = true;
                b.iter(|| {
                    graph.touch_leaf(attach, mode);
                    attach = !attach;
                });
            });
        }
    }

    group.finish();
}

fn bench_fan_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_propagation");

    for width in [1_usize, 16, 128, 512] {
        group.throughput(Throughput::Elements(width as u64 + 1));
        group.bench_with_input(BenchmarkId::new("inline", width), &width, |b, &width| {
            let graph = Graph::fan(width);
            let mut attach = true;
            b.iter(|| {
                graph.touch_leaf(attach, ExecutionMode::Inline);
                attach = !attach;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain_propagation, bench_fan_propagation);
criterion_main!(benches);
