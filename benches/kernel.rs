use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use force_layout_engine::algorithms::{
    ForceSimulation, IndexedEdge, InitialPlacement, ParallelForceProcessor, SimulationInput, SimulationOptions,
};
use std::hint::black_box;

/// Кольцо с хордой через каждые `stride` узлов
fn ring_input(node_count: usize, stride: usize) -> SimulationInput {
    let mut edges: Vec<IndexedEdge> = (0..node_count)
        .map(|i| IndexedEdge {
            source: i,
            target: (i + 1) % node_count,
            weight: 1.0,
        })
        .collect();
    for i in (0..node_count).step_by(stride) {
        edges.push(IndexedEdge {
            source: i,
            target: (i + node_count / 2) % node_count,
            weight: 2.0,
        });
    }

    let options = SimulationOptions::default().with_iterations(5);
    SimulationInput::new(node_count, edges, options).expect("valid benchmark input")
}

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("fruchterman_reingold");
    for &n in &[64usize, 256, 1024] {
        let input = ring_input(n, 7);
        let initial = InitialPlacement::new(input.frame()).with_seed(Some(1)).random(n);

        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |b, _| {
            let simulation = ForceSimulation::new(&input);
            b.iter_batched(
                || simulation.initial_state(initial.clone()).expect("initial state"),
                |state| black_box(simulation.run(state, |_, _| {})),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let processor = ParallelForceProcessor::new(num_cpus::get(), 0).expect("thread pool");
    let mut group = c.benchmark_group("fruchterman_reingold");
    for &n in &[256usize, 1024] {
        let input = ring_input(n, 7);
        let initial = InitialPlacement::new(input.frame()).with_seed(Some(1)).random(n);

        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |b, _| {
            let simulation = ForceSimulation::new(&input).with_parallelism(&processor);
            b.iter_batched(
                || simulation.initial_state(initial.clone()).expect("initial state"),
                |state| black_box(simulation.run(state, |_, _| {})),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sequential, bench_parallel);
criterion_main!(benches);
