//! Node arena backing the connect operator and the graph dump

use super::value::Value;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub archetype: String,
    pub fields: Vec<(String, Value)>,
}

impl NodeData {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<NodeData>,
    edges: Vec<(NodeId, NodeId)>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// A graph holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                archetype: "Root".to_string(),
                fields: Vec::new(),
            }],
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, archetype: &str, fields: Vec<(String, Value)>) -> NodeId {
        self.nodes.push(NodeData {
            archetype: archetype.to_string(),
            fields,
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Record a directed edge; repeated connections are kept once
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(from, _)| *from == id)
            .map(|(_, to)| *to)
            .collect()
    }

    /// Nodes reachable from root in breadth-first discovery order
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = HashSet::from([NodeId::ROOT]);
        let mut order = vec![NodeId::ROOT];
        let mut queue = VecDeque::from([NodeId::ROOT]);
        while let Some(id) = queue.pop_front() {
            for next in self.successors(id) {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Render the reachable subgraph as a graph-description document
    ///
    /// Labels are escaped for the description language first and then
    /// HTML-entity escaped, so consumers decode entities before parsing.
    pub fn to_dot(&self, label: impl Fn(NodeId) -> String) -> String {
        let order = self.reachable();
        let visible: HashSet<NodeId> = order.iter().copied().collect();

        let mut out = String::from("digraph {\n");
        out.push_str("  node [shape=\"ellipse\", style=\"filled\", fillcolor=\"#eef2ff\"];\n");
        for id in &order {
            out.push_str(&format!(
                "  {} [label=\"{}\"];\n",
                id.0,
                html_escape(&dot_escape(&label(*id)))
            ));
        }
        for (from, to) in &self.edges {
            if visible.contains(from) && visible.contains(to) {
                out.push_str(&format!("  {} -> {};\n", from.0, to.0));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn dot_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
