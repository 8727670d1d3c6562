use cascadecore::{EngineError, Graph, NodeId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

/// Compute a deterministic topological execution order via Kahn's algorithm.
///
/// Node indices follow the graph's declaration order and the ready queue is
/// FIFO, so ties among equally-ready nodes resolve by declaration order and
/// the result is stable for a fixed graph. Producers always precede their
/// consumers.
///
/// Returns [`EngineError::CyclicGraph`] when the order cannot cover every
/// node; a cyclic graph never executes partially.
pub fn execution_order(graph: &Graph) -> Result<Vec<NodeId>, EngineError> {
    let (dag, indices) = build_dag(graph);

    let mut in_degree: HashMap<NodeIndex, usize> = indices
        .iter()
        .map(|&idx| {
            (
                idx,
                dag.neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count(),
            )
        })
        .collect();

    // Declaration order: `indices` is insertion-ordered.
    let mut ready: VecDeque<NodeIndex> = indices
        .iter()
        .copied()
        .filter(|idx| in_degree[idx] == 0)
        .collect();

    let mut order: Vec<NodeId> = Vec::with_capacity(graph.nodes().len());

    while let Some(idx) = ready.pop_front() {
        order.push(dag[idx].clone());

        let mut unblocked: Vec<NodeIndex> = Vec::new();
        for succ in dag.neighbors_directed(idx, petgraph::Direction::Outgoing) {
            let degree = in_degree.get_mut(&succ).expect("successor is in the dag");
            *degree -= 1;
            if *degree == 0 {
                unblocked.push(succ);
            }
        }
        // Successors come back in reverse insertion order; sort so the FIFO
        // tie-break stays declaration order.
        unblocked.sort();
        unblocked.dedup();
        ready.extend(unblocked);
    }

    if order.len() != graph.nodes().len() {
        return Err(EngineError::CyclicGraph {
            ordered: order.len(),
            total: graph.nodes().len(),
        });
    }

    Ok(order)
}

fn build_dag(graph: &Graph) -> (DiGraph<NodeId, ()>, Vec<NodeIndex>) {
    let mut dag = DiGraph::new();
    let mut by_id: HashMap<&str, NodeIndex> = HashMap::new();
    let mut indices = Vec::with_capacity(graph.nodes().len());

    for node in graph.nodes() {
        let idx = dag.add_node(node.id.clone());
        by_id.insert(node.id.as_str(), idx);
        indices.push(idx);
    }

    // Graph construction already guaranteed referential integrity.
    for edge in graph.edges() {
        dag.add_edge(by_id[edge.source.as_str()], by_id[edge.target.as_str()], ());
    }

    (dag, indices)
}
