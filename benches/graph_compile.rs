//! Benchmarks for workflow graph building and save-time validation.
//!
//! These benchmarks measure the performance of:
//! - `WorkflowBuilder` construction
//! - `graph::validate::validate` (cycle detection, reachability, topological sort)
//! - plain node/edge iteration over a built `Workflow`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use workflow_engine::graph::{WorkflowBuilder, validate};
use workflow_engine::model::Workflow;
use workflow_engine::types::NodeType;

/// Build a linear graph: Start -> N1 -> N2 -> ... -> Nn -> End
fn build_linear_graph(node_count: usize) -> Workflow {
    let mut builder = WorkflowBuilder::new("wf-linear", "bench", "linear").node("start", NodeType::Start);

    for i in 0..node_count {
        builder = builder.node(format!("node_{i}"), NodeType::Agent);
    }

    builder = if node_count > 0 {
        builder.edge("e-start", "start", "node_0")
    } else {
        builder.edge("e-start", "start", "end")
    };

    for i in 0..node_count.saturating_sub(1) {
        builder = builder.edge(format!("e_{i}"), format!("node_{i}"), format!("node_{}", i + 1));
    }

    if node_count > 0 {
        builder = builder.edge("e-end", format!("node_{}", node_count - 1), "end");
    }

    builder.node("end", NodeType::End).build()
}

/// Build a fan-out/fan-in graph: Start -> Fork -> [N parallel workers] -> End.
/// A plain `Start` can only have one outgoing edge (save-time validation
/// requires it), so fan-out is expressed through an explicit `Fork` node.
fn build_fanout_graph(width: usize) -> Workflow {
    let mut builder = WorkflowBuilder::new("wf-fanout", "bench", "fanout")
        .node("start", NodeType::Start)
        .node("fork", NodeType::Fork)
        .node("end", NodeType::End)
        .edge("e-start", "start", "fork");

    for i in 0..width {
        let worker = format!("worker_{i}");
        builder = builder
            .node(worker.clone(), NodeType::Agent)
            .edge(format!("e-fork-{i}"), "fork", worker.as_str())
            .edge(format!("e-join-{i}"), worker.as_str(), "end");
    }

    builder.build()
}

/// Build a layered DAG with multiple paths: Start -> Fork -> layer 0 -> ... -> last layer -> End.
fn build_diamond_graph(depth: usize, width: usize) -> Workflow {
    let mut builder = WorkflowBuilder::new("wf-diamond", "bench", "diamond")
        .node("start", NodeType::Start)
        .node("fork", NodeType::Fork)
        .node("end", NodeType::End)
        .edge("e-start", "start", "fork");

    for layer in 0..depth {
        for node in 0..width {
            builder = builder.node(format!("L{layer}_N{node}"), NodeType::Agent);
        }
    }

    for node in 0..width {
        builder = builder.edge(format!("e-fork-{node}"), "fork", format!("L0_N{node}"));
    }

    for layer in 0..depth.saturating_sub(1) {
        for from_node in 0..width {
            let from = format!("L{layer}_N{from_node}");
            let to_node = from_node % width;
            let to = format!("L{}_N{to_node}", layer + 1);
            builder = builder.edge(format!("e_{layer}_{from_node}"), from, to);
        }
    }

    let last_layer = depth.saturating_sub(1);
    for node in 0..width {
        builder = builder.edge(format!("e-end-{node}"), format!("L{last_layer}_N{node}"), "end");
    }

    builder.build()
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");

    for size in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::new("linear", size), &size, |b, &size| {
            b.iter(|| build_linear_graph(size));
        });
    }

    for width in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::new("fanout", width), &width, |b, &width| {
            b.iter(|| build_fanout_graph(width));
        });
    }

    for (depth, width) in [(5, 10), (10, 10), (5, 20)] {
        group.bench_with_input(
            BenchmarkId::new("diamond", format!("{depth}x{width}")),
            &(depth, width),
            |b, &(depth, width)| {
                b.iter(|| build_diamond_graph(depth, width));
            },
        );
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_validate");

    for size in [10, 50, 100, 200] {
        let workflow = build_linear_graph(size);
        group.bench_with_input(BenchmarkId::new("linear", size), &workflow, |b, workflow| {
            b.iter(|| validate(workflow).expect("validation should succeed"));
        });
    }

    for width in [10, 50, 100] {
        let workflow = build_fanout_graph(width);
        group.bench_with_input(BenchmarkId::new("fanout", width), &workflow, |b, workflow| {
            b.iter(|| validate(workflow).expect("validation should succeed"));
        });
    }

    for (depth, width) in [(5, 10), (10, 10), (5, 20)] {
        let workflow = build_diamond_graph(depth, width);
        group.bench_with_input(
            BenchmarkId::new("diamond", format!("{depth}x{width}")),
            &workflow,
            |b, workflow| {
                b.iter(|| validate(workflow).expect("validation should succeed"));
            },
        );
    }

    group.finish();
}

fn bench_iterators(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_iterators");

    for size in [10, 50, 100] {
        let workflow = build_linear_graph(size);

        group.bench_with_input(BenchmarkId::new("nodes_iter", size), &workflow, |b, workflow| {
            b.iter(|| workflow.nodes.iter().count());
        });

        group.bench_with_input(BenchmarkId::new("edges_iter", size), &workflow, |b, workflow| {
            b.iter(|| workflow.edges.iter().count());
        });

        group.bench_with_input(BenchmarkId::new("outgoing", size), &workflow, |b, workflow| {
            b.iter(|| workflow.outgoing("start").len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_graph_build, bench_validate, bench_iterators);
criterion_main!(benches);
