use petgraph::graph::NodeIndex;
use petgraph::prelude::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::hash::Hash;

/// Visual class of a state vertex in the DOT export.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeClass {
    Eval,
    Value,
    Error,
}

impl NodeClass {
    fn fill(&self) -> &'static str {
        match self {
            NodeClass::Eval => "#ddffdd",
            NodeClass::Value => "#ffffdd",
            NodeClass::Error => "#ffdddd",
        }
    }
}

/// The reachability graph a machine builds while exploring: one vertex per
/// de-duplicated state, one edge per transition. Backed by a stable graph
/// plus a state → index map so insertion is idempotent.
#[derive(Debug)]
pub struct StateGraph<S: Clone + Eq + Hash> {
    graph: StableDiGraph<S, ()>,
    indices: HashMap<S, NodeIndex>,
}

impl<S: Clone + Eq + Hash> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Eq + Hash> StateGraph<S> {
    pub fn new() -> Self {
        StateGraph {
            graph: StableDiGraph::default(),
            indices: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, state: S) -> NodeIndex {
        match self.indices.get(&state) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(state.clone());
                self.indices.insert(state, idx);
                idx
            }
        }
    }

    pub fn add_edge(&mut self, from: S, to: S) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &S> {
        self.graph.node_weights()
    }

    /// Render the graph as GraphViz text. `describe` yields the label and
    /// visual class of each vertex.
    pub fn to_dot(&self, mut describe: impl FnMut(&S) -> (String, NodeClass)) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph g {{");
        let _ = writeln!(dot, "node [shape=box, style=filled, fontname=\"monospace\"];");
        for idx in self.graph.node_indices() {
            let (label, class) = describe(&self.graph[idx]);
            let _ = writeln!(
                dot,
                "{} [label=\"{}\", fillcolor=\"{}\"];",
                idx.index(),
                escape(&label),
                class.fill()
            );
        }
        for edge in self.graph.edge_references() {
            let _ = writeln!(
                dot,
                "{} -> {};",
                edge.source().index(),
                edge.target().index()
            );
        }
        let _ = writeln!(dot, "}}");
        dot
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_deduplicate_and_edges_are_unique() {
        let mut g: StateGraph<&'static str> = StateGraph::new();
        g.add_edge("a", "b");
        g.add_edge("a", "b");
        g.add_edge("b", "a");
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn dot_output_is_wellformed() {
        let mut g: StateGraph<u32> = StateGraph::new();
        g.add_edge(1, 2);
        let dot = g.to_dot(|n| (format!("s{n}\"x\""), NodeClass::Eval));
        assert!(dot.starts_with("digraph g {"));
        assert!(dot.contains("s1\\\"x\\\""));
        assert!(dot.contains("->"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
