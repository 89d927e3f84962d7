use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use crate::analysis::network::{HerbNetwork, NodeCategory};
use crate::parsers::pathway_parser::ALL_PATHWAYS;

pub const DEFAULT_NODE_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    /// Prescription and herb nodes plus every endpoint of an edge touching the pathway.
    Pathway(String),
    /// The node and everything within `depth` hops of it.
    Node { id: String, depth: usize },
}

impl Selection {
    pub fn pathway(filter: &str) -> Self {
        if filter.trim().is_empty() || filter == ALL_PATHWAYS {
            Selection::All
        } else {
            Selection::Pathway(filter.to_string())
        }
    }

    pub fn node(id: &str) -> Self {
        Selection::Node { id: id.to_string(), depth: DEFAULT_NODE_DEPTH }
    }
}

/// Read-only: the source graph is never touched, a new graph is returned.
pub fn select(network: &HerbNetwork, selection: &Selection) -> HerbNetwork {
    match selection {
        Selection::All => network.clone(),
        Selection::Pathway(pathway) => {
            let mut keep: FxHashSet<&str> = network
                .nodes()
                .filter(|node| matches!(node.category, NodeCategory::Prescription | NodeCategory::Herb))
                .map(|node| node.id.as_str())
                .collect();

            for (a, b, _) in network.edges() {
                if a == pathway.as_str() || b == pathway.as_str() {
                    keep.insert(a);
                    keep.insert(b);
                }
            }
            network.induced_subgraph(|node| keep.contains(node.id.as_str()))
        }
        Selection::Node { id, depth } => {
            let keep = neighborhood(network, id, *depth);
            network.induced_subgraph(|node| keep.contains(node.id.as_str()))
        }
    }
}

/// Breadth-first closure of `id` up to `depth` hops. Empty when `id` is unknown.
pub fn neighborhood<'a>(network: &'a HerbNetwork, id: &str, depth: usize) -> FxHashSet<&'a str> {
    let mut reached: FxHashSet<&'a str> = FxHashSet::default();
    let start = match network.node(id) {
        Some(node) => node.id.as_str(),
        None => return reached,
    };

    reached.insert(start);
    let mut frontier = vec![start];
    for _ in 0..depth {
        let mut next = Vec::new();
        for current in frontier {
            for neighbor in network.neighbors(current) {
                if reached.insert(neighbor.id.as_str()) {
                    next.push(neighbor.id.as_str());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    reached
}

/// Per-session selection: which pathway filter is active and which node
/// was last clicked. Owned by the caller, never shared between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionState {
    pub pathway_filter: Option<String>,
    pub selected_node: Option<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pathway_filter(&mut self, filter: &str) {
        self.selected_node = None;
        self.pathway_filter = match Selection::pathway(filter) {
            Selection::Pathway(pathway) => Some(pathway),
            _ => None,
        };
    }

    pub fn select_node(&mut self, id: &str) {
        self.pathway_filter = None;
        self.selected_node = Some(id.to_string());
    }

    pub fn reset(&mut self) {
        *self = SelectionState::default();
    }

    /// A clicked node takes precedence over the pathway filter.
    pub fn selection(&self) -> Selection {
        if let Some(id) = &self.selected_node {
            Selection::node(id)
        } else if let Some(pathway) = &self.pathway_filter {
            Selection::Pathway(pathway.clone())
        } else {
            Selection::All
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::network::NetworkNode;

    fn chain() -> HerbNetwork {
        let mut network = HerbNetwork::new();
        network.add_node(NetworkNode::new("P", NodeCategory::Prescription, 12.0));
        for herb in ["H1", "H2"] {
            network.add_node(NetworkNode::new(herb, NodeCategory::Herb, 8.0));
            network.add_edge("P", herb, 1.0);
        }
        for gene in ["G1", "G2", "G3"] {
            network.add_node(NetworkNode::new(gene, NodeCategory::Gene, 3.0));
        }
        network.add_edge("H1", "G1", 2.0);
        network.add_edge("H1", "G2", 2.0);
        network.add_edge("H2", "G3", 2.0);
        network.add_node(NetworkNode::new("PW1", NodeCategory::Pathway, 5.0));
        network.add_node(NetworkNode::new("PW2", NodeCategory::Pathway, 5.0));
        network.add_edge("G1", "PW1", 1.0);
        network.add_edge("G3", "PW2", 1.0);
        network.add_node(NetworkNode::new("LONE", NodeCategory::Gene, 3.0));
        network
    }

    fn ids(network: &HerbNetwork) -> Vec<&str> {
        let mut ids: Vec<&str> = network.nodes().map(|n| n.id.as_str()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn all_is_identity() {
        let network = chain();
        let selected = select(&network, &Selection::All);
        assert_eq!(ids(&selected), ids(&network));
        assert_eq!(
            selected.edges().collect::<Vec<_>>(),
            network.edges().collect::<Vec<_>>()
        );
    }

    #[test]
    fn pathway_keeps_roots_and_one_hop() {
        let network = chain();
        let selected = select(&network, &Selection::pathway("PW1"));
        assert_eq!(ids(&selected), vec!["G1", "H1", "H2", "P", "PW1"]);
        assert_eq!(selected.edge_weight("G1", "PW1"), Some(1.0));
        assert_eq!(selected.edge_weight("H1", "G1"), Some(2.0));
    }

    #[test]
    fn all_string_means_no_filter() {
        assert_eq!(Selection::pathway("All"), Selection::All);
    }

    #[test]
    fn node_selection_is_two_hop_closure() {
        let network = chain();
        let selected = select(&network, &Selection::node("G1"));
        assert_eq!(ids(&selected), vec!["G1", "G2", "H1", "P", "PW1"]);
        assert!(!selected.contains("G3"));
    }

    #[test]
    fn isolated_node_is_a_singleton() {
        let network = chain();
        let selected = select(&network, &Selection::node("LONE"));
        assert_eq!(ids(&selected), vec!["LONE"]);
        assert_eq!(selected.edge_count(), 0);
    }

    #[test]
    fn unknown_node_selects_nothing() {
        let selected = select(&chain(), &Selection::node("nope"));
        assert_eq!(selected.node_count(), 0);
    }

    #[test]
    fn selection_does_not_mutate_source() {
        let network = chain();
        let before = (network.node_count(), network.edge_count());
        let _ = select(&network, &Selection::node("H2"));
        let _ = select(&network, &Selection::pathway("PW2"));
        assert_eq!((network.node_count(), network.edge_count()), before);
    }

    #[test]
    fn session_state_transitions() {
        let mut state = SelectionState::new();
        assert_eq!(state.selection(), Selection::All);

        state.set_pathway_filter("PW1");
        assert_eq!(state.selection(), Selection::Pathway("PW1".to_string()));

        state.select_node("G1");
        assert_eq!(state.selection(), Selection::node("G1"));
        assert_eq!(state.pathway_filter, None);

        state.reset();
        assert_eq!(state, SelectionState::default());
    }
}
