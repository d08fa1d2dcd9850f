use dfnb_graph::{DependencyGraph, DependencyNode, Edge};
use dfnb_ident::CellId;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Edges one cell's latest run reports: (producer index, name)
type Reads = Vec<(usize, &'static str)>;

/// Apply one cell's run the way the ingestor does: replace edges into it
fn apply_run(graph: &mut DependencyGraph, cells: &[CellId], consumer: usize, reads: &Reads) {
    graph.upsert_node(DependencyNode::new(cells[consumer]).with_exports(["v"]));
    graph.remove_edges_to(cells[consumer]);
    for (producer, name) in reads {
        if *producer != consumer {
            ensure_node(graph, cells[*producer]);
            graph.add_edge(cells[*producer], cells[consumer], name).unwrap();
        }
    }
}

fn ensure_node(graph: &mut DependencyGraph, cell: CellId) {
    if !graph.contains(cell) {
        graph.upsert_node(DependencyNode::new(cell).with_exports(["v"]));
    }
}

#[test]
fn test_remove_node_cascades_both_directions() {
    let mut graph = DependencyGraph::new();
    let cells: Vec<CellId> = (0..3).map(|_| CellId::new()).collect();
    for cell in &cells {
        graph.upsert_node(DependencyNode::new(*cell).with_exports(["v"]));
    }
    graph.add_edge(cells[0], cells[1], "v").unwrap();
    graph.add_edge(cells[1], cells[2], "v").unwrap();

    graph.remove_node(cells[1]);

    assert_eq!(graph.edge_count(), 0);
    assert!(graph.downstream_of(cells[0]).unwrap().is_empty());
    assert!(graph.upstream_of(cells[2]).unwrap().is_empty());
    assert!(graph.upstream_of(cells[1]).is_err());
    assert!(graph.remove_node(cells[1]).is_none());
}

#[test]
fn test_remove_edges_to_keeps_outgoing() {
    let mut graph = DependencyGraph::new();
    let cells: Vec<CellId> = (0..3).map(|_| CellId::new()).collect();
    for cell in &cells {
        graph.upsert_node(DependencyNode::new(*cell).with_exports(["v"]));
    }
    graph.add_edge(cells[0], cells[1], "v").unwrap();
    graph.add_edge(cells[1], cells[2], "v").unwrap();

    graph.remove_edges_to(cells[1]);
    graph.remove_edges_to(CellId::new());

    assert_eq!(
        graph.edges(),
        vec![Edge {
            from: cells[1],
            to: cells[2],
            name: "v".to_string()
        }]
    );
}

#[test]
fn test_transitive_closures() {
    let mut graph = DependencyGraph::new();
    let cells: Vec<CellId> = (0..4).map(|_| CellId::new()).collect();
    for cell in &cells {
        graph.upsert_node(DependencyNode::new(*cell).with_exports(["v"]));
    }
    graph.add_edge(cells[0], cells[1], "v").unwrap();
    graph.add_edge(cells[1], cells[2], "v").unwrap();
    graph.add_edge(cells[0], cells[3], "v").unwrap();

    let mut ancestors = graph.all_upstream_transitively(cells[2]).unwrap();
    ancestors.sort();
    let mut expected = vec![cells[0], cells[1]];
    expected.sort();
    assert_eq!(ancestors, expected);

    assert_eq!(graph.all_downstream_transitively(cells[0]).unwrap().len(), 3);
    assert!(graph.all_upstream_transitively(cells[0]).unwrap().is_empty());
}

fn run_strategy() -> impl Strategy<Value = Vec<(usize, Reads)>> {
    let read = (0..5usize, prop_oneof![Just("a"), Just("b")]);
    prop::collection::vec((0..5usize, prop::collection::vec(read, 0..4)), 1..12)
}

proptest! {
    /// Only each cell's last run decides the edges into it
    #[test]
    fn prop_graph_converges_regardless_of_order(runs in run_strategy(), seed in any::<u64>()) {
        let cells: Vec<CellId> = (0..5).map(|_| CellId::new()).collect();

        let mut in_order = DependencyGraph::new();
        for (consumer, reads) in &runs {
            apply_run(&mut in_order, &cells, *consumer, reads);
        }

        // Latest run per cell, replayed in a shuffled order
        let mut latest: Vec<(usize, Reads)> = Vec::new();
        for (consumer, reads) in runs.iter().rev() {
            if !latest.iter().any(|(c, _)| c == consumer) {
                latest.push((*consumer, reads.clone()));
            }
        }
        let rotation = usize::try_from(seed % latest.len() as u64).unwrap();
        latest.rotate_left(rotation);
        if seed % 2 == 0 {
            latest.reverse();
        }

        let mut replayed = DependencyGraph::new();
        for (consumer, reads) in &latest {
            apply_run(&mut replayed, &cells, *consumer, reads);
        }

        prop_assert_eq!(in_order.edges(), replayed.edges());
    }
}
