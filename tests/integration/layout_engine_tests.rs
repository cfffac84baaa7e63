use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use force_layout_engine::{
    algorithms::FrameSize,
    data_structures::{GraphEdge, NodeAttributes},
    gml::{read_gml_file, write_gml_file},
    host::ExecutionHost,
    DirectHost, ForceLayoutEngine, Graph, GraphBuilder, GraphDataProvider, LayoutError, OffloadedHost,
    SimulationOptions, WorkerMessage,
};
use proptest::prelude::*;
use proptest::test_runner::TestRunner;
use tokio::runtime::Runtime;
use tokio_stream::StreamExt;

const SEED: u64 = 7;

fn default_options() -> SimulationOptions {
    SimulationOptions::default().with_iterations(25)
}

fn sample_graph() -> Graph {
    let mut builder = GraphBuilder::new();
    builder
        .add_unweighted_edge("A", "B")
        .add_unweighted_edge("A", "C")
        .add_unweighted_edge("B", "D")
        .add_unweighted_edge("C", "D")
        .add_edge("C", "E", 2.0)
        .add_unweighted_edge("D", "F")
        .add_unweighted_edge("E", "F")
        .add_edge("G", "F", 0.5)
        .add_unweighted_edge("G", "H")
        .add_node("lonely");
    builder.build().expect("sample graph is valid")
}

/// Два узла на оси x единичной рамки, соединенные ребром
fn two_node_graph() -> Result<Graph> {
    let mut graph = Graph::new();
    graph.add_node("A", NodeAttributes::at(-0.4, 0.0))?;
    graph.add_node("B", NodeAttributes::at(0.4, 0.0))?;
    graph.connect("A", "B", None)?;
    Ok(graph)
}

fn artifacts_path(file_name: &str) -> PathBuf {
    let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("artifacts");
    if !base.exists() {
        fs::create_dir_all(&base).expect("unable to create tests/artifacts directory");
    }
    base.join(file_name)
}

#[test]
fn two_nodes_move_one_temperature_step_inward() -> Result<()> {
    let options = SimulationOptions::default()
        .with_iterations(1)
        .with_frame(FrameSize::UNIT);
    let engine = ForceLayoutEngine::new(options)?;

    let mut graph = two_node_graph()?;
    let mapping = engine.assign(&mut graph)?;

    let a = mapping.get("A").expect("A is laid out");
    let b = mapping.get("B").expect("B is laid out");
    assert!((a.x + 0.3).abs() < 1e-12, "A.x = {}", a.x);
    assert!((b.x - 0.3).abs() < 1e-12, "B.x = {}", b.x);
    assert_eq!(a.y, 0.0);
    assert_eq!(b.y, 0.0);

    let written = graph.node("A").expect("A still exists");
    assert_eq!(written.attributes.x, Some(a.x));
    assert_eq!(written.attributes.y, Some(a.y));
    Ok(())
}

#[tokio::test]
async fn direct_and_offloaded_hosts_agree() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));
    let graph = sample_graph();

    let direct = engine.layout(&graph)?;
    let offloaded = engine.layout_offloaded(&graph).await?;

    assert_eq!(direct.len(), graph.node_count());
    let deviation = direct
        .max_deviation(&offloaded)
        .expect("both runs cover the same nodes");
    assert!(deviation <= 1e-12, "hosts disagree by {deviation:e}");
    Ok(())
}

#[tokio::test]
async fn offloaded_run_follows_the_message_protocol() -> Result<()> {
    let options = SimulationOptions::default().with_iterations(6);
    let engine = ForceLayoutEngine::new(options)?.with_seed(Some(SEED));
    let graph = sample_graph();

    let (mut run, projector) = engine.spawn_offloaded(&graph)?;
    assert_eq!(run.node_count(), graph.node_count());
    assert_eq!(run.iterations(), 6);

    assert_eq!(run.next_message().await, Some(WorkerMessage::Running));
    for expected in 0..6 {
        match run.next_message().await {
            Some(WorkerMessage::Data { positions, iteration }) => {
                assert_eq!(iteration, expected);
                assert_eq!(positions.len(), graph.node_count() * 2);
                assert!(positions.iter().all(|value| value.is_finite()));
            }
            other => panic!("expected DATA {expected}, got {other:?}"),
        }
    }

    let finished = match run.next_message().await {
        Some(WorkerMessage::Finished(positions)) => positions,
        other => panic!("expected FINISHED, got {other:?}"),
    };
    let coords = ndarray::Array2::from_shape_vec((graph.node_count(), 2), finished)?;
    let mapping = projector.project(coords)?;
    assert_eq!(mapping, engine.layout(&graph)?);
    Ok(())
}

#[tokio::test]
async fn offloaded_stream_ends_with_a_terminal_message() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));
    let (run, _projector) = engine.spawn_offloaded(&sample_graph())?;

    let messages: Vec<WorkerMessage> = run.into_stream().collect().await;
    assert_eq!(messages.len(), 1 + 25 + 1, "RUNNING, one DATA per iteration, FINISHED");
    assert!(matches!(messages.first(), Some(WorkerMessage::Running)));
    assert!(messages.last().map_or(false, WorkerMessage::is_terminal));
    Ok(())
}

#[tokio::test]
async fn assign_offloaded_writes_positions_into_the_graph() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));
    let mut graph = sample_graph();

    let mapping = engine.assign_offloaded(&mut graph).await?;

    for (id, position) in mapping.iter() {
        let node = graph.node(id.as_str()).expect("node survives layout");
        assert_eq!(node.attributes.x, Some(position.x), "x of {id}");
        assert_eq!(node.attributes.y, Some(position.y), "y of {id}");
    }
    Ok(())
}

#[tokio::test]
async fn layout_on_accepts_any_execution_host() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));
    let graph = sample_graph();
    let hosts: Vec<Box<dyn ExecutionHost>> = vec![Box::new(DirectHost::new()), Box::new(OffloadedHost::new())];

    let mut results = Vec::new();
    for host in &hosts {
        let mut seen = Vec::new();
        let mapping = engine
            .layout_on(host.as_ref(), &graph, |view, iteration| {
                assert_eq!(view.len(), graph.node_count());
                seen.push(iteration);
            })
            .await?;
        assert_eq!(seen, (0..25).collect::<Vec<_>>(), "observer order on {} host", host.name());
        results.push(mapping);
    }

    assert_eq!(results[0], results[1]);
    Ok(())
}

#[tokio::test]
async fn negative_weights_are_rejected_before_any_run() -> Result<()> {
    let mut graph = Graph::new();
    graph.add_node("a", NodeAttributes::at(0.0, 0.0))?;
    graph.add_node("b", NodeAttributes::at(1.0, 0.0))?;
    graph.add_edge(GraphEdge::new("a", "b").weighted(-2.0))?;

    let engine = ForceLayoutEngine::new(default_options())?;
    assert!(matches!(engine.layout(&graph), Err(LayoutError::InvalidInput { .. })));
    assert!(matches!(
        engine.assign_offloaded(&mut graph).await,
        Err(LayoutError::InvalidInput { .. })
    ));

    // Ничего не записано
    let a = graph.node("a").expect("a exists");
    assert_eq!((a.attributes.x, a.attributes.y), (Some(0.0), Some(0.0)));
    Ok(())
}

#[test]
fn invalid_options_are_rejected() {
    assert!(ForceLayoutEngine::new(SimulationOptions::default().with_speed(-1.0)).is_err());
    assert!(ForceLayoutEngine::new(SimulationOptions::default().with_repulsion_constant(0.0)).is_err());
    assert!(ForceLayoutEngine::new(SimulationOptions::default().with_gravity(f64::NAN)).is_err());
}

#[test]
fn missing_and_zero_weights_count_as_one() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));

    let mut implicit = GraphBuilder::new();
    implicit.add_unweighted_edge("x", "y").add_edge("y", "z", 0.0);
    let mut explicit = GraphBuilder::new();
    explicit.add_edge("x", "y", 1.0).add_edge("y", "z", 1.0);

    assert_eq!(engine.layout(&implicit.build()?)?, engine.layout(&explicit.build()?)?);
    Ok(())
}

#[test]
fn empty_graph_yields_empty_mapping() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?;
    let mapping = tokio_test::block_on(engine.layout_offloaded(&Graph::new()))?;
    assert!(mapping.is_empty());
    Ok(())
}

#[test]
fn terminated_run_does_not_block_the_host() -> Result<()> {
    let engine = ForceLayoutEngine::new(SimulationOptions::default().with_iterations(10_000))?;
    let (run, _projector) = engine.spawn_offloaded(&sample_graph())?;
    run.terminate();

    // Новый запуск не затронут
    let mapping = tokio_test::block_on(
        ForceLayoutEngine::new(default_options())?.layout_offloaded(&sample_graph()),
    )?;
    assert_eq!(mapping.len(), 9);
    Ok(())
}

#[tokio::test]
async fn layout_exports_gml_snapshot() -> Result<()> {
    let engine = ForceLayoutEngine::new(default_options())?.with_seed(Some(SEED));
    let mut graph = sample_graph();
    let mapping = engine.assign(&mut graph)?;

    let output_path = artifacts_path("force_layout.gml");
    write_gml_file(&graph, &output_path)?;
    assert!(
        output_path.exists(),
        "expected GML file to be written at {}",
        output_path.display()
    );

    let reread = read_gml_file(&output_path)?;
    assert_eq!(reread.node_count(), graph.node_count());
    assert_eq!(reread.edge_count(), graph.edge_count());
    for id in reread.node_ids() {
        let position = reread.node_position(&id).expect("positions survive GML");
        let expected = mapping.get(id.as_str()).expect("same node set");
        assert!(position.distance_to(&expected) < 1e-5, "{id} moved in GML round trip");
    }
    Ok(())
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize, f64)>)> {
    (2usize..24).prop_flat_map(|node_count| {
        let edge = (0..node_count, 0..node_count, 0.1f64..5.0);
        (Just(node_count), proptest::collection::vec(edge, 0..node_count * 2))
    })
}

fn build_graph(node_count: usize, edges: &[(usize, usize, f64)]) -> Graph {
    let mut builder = GraphBuilder::new();
    for idx in 0..node_count {
        builder.add_node(format!("v{idx}"));
    }
    for &(source, target, weight) in edges {
        builder.add_edge(format!("v{source}"), format!("v{target}"), weight);
    }
    builder.build().expect("generated graph is valid")
}

#[test]
fn random_graphs_stay_finite_and_inside_the_frame() {
    let mut config = ProptestConfig::with_cases(24);
    config.failure_persistence = None;
    let mut runner = TestRunner::new(config);

    runner
        .run(&(graph_strategy(), 1usize..15, any::<u64>()), |((node_count, edges), iterations, seed)| {
            let graph = build_graph(node_count, &edges);
            let options = SimulationOptions::default().with_iterations(iterations);
            let frame = options.frame.resolve(node_count);
            let engine = ForceLayoutEngine::new(options).expect("valid options").with_seed(Some(seed));

            let mut snapshots = 0;
            let mapping = engine
                .layout_with_observer(&graph, |view, _| {
                    snapshots += 1;
                    for (_, position) in view.iter() {
                        assert!(frame.contains(position.x, position.y));
                    }
                })
                .expect("layout computation");

            prop_assert_eq!(snapshots, iterations);
            prop_assert_eq!(mapping.len(), node_count);
            for (id, position) in mapping.iter() {
                prop_assert!(position.is_finite(), "{} is not finite", id);
                prop_assert!(
                    frame.contains(position.x, position.y),
                    "{} at ({}, {}) left the {}x{} frame",
                    id,
                    position.x,
                    position.y,
                    frame.width,
                    frame.length
                );
            }
            Ok(())
        })
        .expect("proptest execution");
}

#[test]
fn seeded_runs_are_deterministic_across_hosts() {
    let mut config = ProptestConfig::with_cases(8);
    config.failure_persistence = None;
    let mut runner = TestRunner::new(config);

    runner
        .run(&(graph_strategy(), any::<u64>()), |((node_count, edges), seed)| {
            let graph = build_graph(node_count, &edges);
            let engine = ForceLayoutEngine::new(default_options())
                .expect("valid options")
                .with_seed(Some(seed));
            let runtime = Runtime::new().expect("tokio runtime");

            let first = engine.layout(&graph).expect("direct layout");
            let second = engine.layout(&graph).expect("direct layout");
            let offloaded = runtime
                .block_on(engine.layout_offloaded(&graph))
                .expect("offloaded layout");

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first, &offloaded);
            Ok(())
        })
        .expect("proptest execution");
}
