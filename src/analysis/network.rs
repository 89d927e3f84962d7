use indexmap::IndexMap;
use log::{info, warn};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use crate::analysis::row_filter::HerbTargetFilter;
use crate::analysis::score_aggregation::{ScoreTable, SizeScale};
use crate::errors::LoadError;
use crate::parsers::herb_parser::{parse_herb_targets, HerbTarget};
use crate::parsers::pathway_parser::{parse_pathway_scores, pathway_options, PathwayScore};
use crate::utils::config::Prescription;
use crate::utils::fetch::TableSource;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Prescription,
    Herb,
    Gene,
    Pathway,
}

impl NodeCategory {
    /// Shell index in the layout, outward from the prescription.
    pub fn layer(&self) -> usize {
        match self {
            NodeCategory::Prescription => 0,
            NodeCategory::Herb => 1,
            NodeCategory::Gene => 2,
            NodeCategory::Pathway => 3,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            NodeCategory::Prescription => "red",
            NodeCategory::Herb => "orange",
            NodeCategory::Gene => "green",
            NodeCategory::Pathway => "purple",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub id: String,
    pub category: NodeCategory,
    pub size: f64,
    pub color: String,
}

impl NetworkNode {
    pub fn new(id: impl Into<String>, category: NodeCategory, size: f64) -> Self {
        Self {
            id: id.into(),
            category,
            size,
            color: category.color().to_string(),
        }
    }

    pub fn layer(&self) -> usize {
        self.category.layer()
    }
}

/// Undirected prescription–herb–gene–pathway graph. Nodes are keyed by id and
/// iterate in insertion order.
#[derive(Debug, Clone, Default)]
pub struct HerbNetwork {
    graph: UnGraph<NetworkNode, f64>,
    index: IndexMap<String, NodeIndex>,
}

impl HerbNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by id: a second call replaces category, size and colour.
    pub fn add_node(&mut self, node: NetworkNode) -> NodeIndex {
        if let Some(&existing) = self.index.get(&node.id) {
            self.graph[existing] = node;
            return existing;
        }
        let id = node.id.clone();
        let node_index = self.graph.add_node(node);
        self.index.insert(id, node_index);
        node_index
    }

    /// Inserts only when the id is unknown; existing attributes win.
    pub fn ensure_node(&mut self, node: NetworkNode) -> NodeIndex {
        match self.index.get(&node.id) {
            Some(&existing) => existing,
            None => self.add_node(node),
        }
    }

    /// A repeated pair keeps a single edge carrying the latest weight.
    /// Returns `None` when either endpoint is not in the graph.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: f64) -> Option<EdgeIndex> {
        let source = *self.index.get(a)?;
        let target = *self.index.get(b)?;
        Some(self.graph.update_edge(source, target, weight))
    }

    pub fn node(&self, id: &str) -> Option<&NetworkNode> {
        self.index.get(id).map(|&node_index| &self.graph[node_index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn edge_weight(&self, a: &str, b: &str) -> Option<f64> {
        let source = *self.index.get(a)?;
        let target = *self.index.get(b)?;
        self.graph
            .find_edge(source, target)
            .map(|edge| self.graph[edge])
    }

    pub fn neighbors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NetworkNode> + 'a {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&node_index| self.graph.neighbors(node_index))
            .map(move |neighbor| &self.graph[neighbor])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &NetworkNode> {
        self.index.values().map(move |&node_index| &self.graph[node_index])
    }

    /// (a, b, weight) in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()].id.as_str(),
                self.graph[edge.target()].id.as_str(),
                *edge.weight(),
            )
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Copy holding only `keep` nodes and the edges between them.
    pub fn induced_subgraph<F>(&self, mut keep: F) -> HerbNetwork
    where
        F: FnMut(&NetworkNode) -> bool,
    {
        let mut subgraph = HerbNetwork::new();
        for node in self.nodes() {
            if keep(node) {
                subgraph.add_node(node.clone());
            }
        }
        for (a, b, weight) in self.edges() {
            subgraph.add_edge(a, b, weight);
        }
        subgraph
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DisplayConfig {
    pub prescription_size: f64,
    pub herb_size: f64,
    pub sizes: SizeScale,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            prescription_size: 12.0,
            herb_size: 8.0,
            sizes: SizeScale::default(),
        }
    }
}

/// Outcome of one build pass, including everything that was skipped.
#[derive(Debug)]
pub struct NetworkBuild {
    pub network: HerbNetwork,
    pub scores: ScoreTable,
    pub pathway_scores: Vec<PathwayScore>,
    pub pathway_options: Vec<String>,
    pub skipped_herbs: Vec<(String, LoadError)>,
    pub pathway_error: Option<LoadError>,
}

impl NetworkBuild {
    /// User-facing description of every skipped resource.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .skipped_herbs
            .iter()
            .map(|(herb, error)| format!("Skipped herb {}: {}", herb, error))
            .collect();
        if let Some(error) = &self.pathway_error {
            warnings.push(format!("Pathway scores unavailable: {}", error));
        }
        if self.scores.is_empty() {
            warnings.push("No herb target passed the significance filter".to_string());
        }
        warnings
    }
}

pub fn pathway_resource(prescription_name: &str) -> String {
    format!("{}_pathway_scores.xlsx", prescription_name)
}

pub fn herb_resource(herb_code: &str) -> String {
    format!("{}.csv", herb_code)
}

/// Fetches, validates and filters one herb's target table.
pub fn load_herb_targets<S: TableSource + ?Sized>(
    source: &S,
    herb_code: &str,
    filter: &HerbTargetFilter,
) -> Result<Vec<HerbTarget>, LoadError> {
    let table = source.fetch_table(&herb_resource(herb_code))?;
    let significant = filter.apply(&table)?;
    Ok(parse_herb_targets(&significant)?)
}

pub fn load_pathway_scores<S: TableSource + ?Sized>(
    source: &S,
    prescription_name: &str,
) -> Result<Vec<PathwayScore>, LoadError> {
    let table = source.fetch_table(&pathway_resource(prescription_name))?;
    Ok(parse_pathway_scores(&table)?)
}

pub struct NetworkBuilder<'a, S: TableSource + ?Sized> {
    source: &'a S,
    filter: HerbTargetFilter,
    display: DisplayConfig,
}

impl<'a, S: TableSource + ?Sized> NetworkBuilder<'a, S> {
    pub fn new(source: &'a S, filter: HerbTargetFilter, display: DisplayConfig) -> Self {
        Self { source, filter, display }
    }

    /// Herb tables are fetched concurrently and merged in herb order.
    pub fn fetch_herbs(&self, prescription: &Prescription) -> Vec<(String, Result<Vec<HerbTarget>, LoadError>)> {
        prescription
            .herbs
            .par_iter()
            .map(|herb| (herb.clone(), load_herb_targets(self.source, herb, &self.filter)))
            .collect()
    }

    pub fn build(&self, prescription: &Prescription) -> NetworkBuild {
        let herb_results = self.fetch_herbs(prescription);
        let pathway_result = load_pathway_scores(self.source, &prescription.name);
        self.assemble(prescription, herb_results, pathway_result)
    }

    pub fn assemble(
        &self,
        prescription: &Prescription,
        herb_results: Vec<(String, Result<Vec<HerbTarget>, LoadError>)>,
        pathway_result: Result<Vec<PathwayScore>, LoadError>,
    ) -> NetworkBuild {
        let mut network = HerbNetwork::new();
        let mut scores = ScoreTable::new();
        let mut skipped_herbs = Vec::new();

        network.add_node(NetworkNode::new(
            &prescription.name,
            NodeCategory::Prescription,
            self.display.prescription_size,
        ));

        for (herb, result) in herb_results {
            network.add_node(NetworkNode::new(&herb, NodeCategory::Herb, self.display.herb_size));
            network.add_edge(&prescription.name, &herb, prescription.weights.get(&herb));

            match result {
                Ok(targets) => scores.add_targets(&herb, &targets, &prescription.weights),
                Err(error) => {
                    warn!("Skipping herb {}: {}", herb, error);
                    skipped_herbs.push((herb, error));
                }
            }
        }

        let gene_totals = scores.by_gene();
        for (herb, gene, herb_gene_score) in scores.iter() {
            let gene_total = gene_totals.get(gene).copied().unwrap_or(herb_gene_score);
            let gene_size = self.display.sizes.display_size(gene_total);
            network.add_node(NetworkNode::new(gene.as_str(), NodeCategory::Gene, gene_size));
            network.add_edge(herb, gene, herb_gene_score);
        }

        let (pathway_scores, pathway_error) = match pathway_result {
            Ok(pathway_scores) => (pathway_scores, None),
            Err(error) => {
                warn!("No pathway scores for {}: {}", prescription.name, error);
                (Vec::new(), Some(error))
            }
        };

        for row in &pathway_scores {
            network.ensure_node(NetworkNode::new(
                row.gene.as_str(),
                NodeCategory::Gene,
                self.display.sizes.display_size(row.score),
            ));
            network.add_node(NetworkNode::new(
                &row.pathway,
                NodeCategory::Pathway,
                self.display.sizes.display_size(row.total_score),
            ));
            network.add_edge(&row.gene, &row.pathway, row.score);
        }

        info!(
            "Built {} network with {} nodes and {} edges",
            prescription.name,
            network.node_count(),
            network.edge_count()
        );

        NetworkBuild {
            network,
            scores,
            pathway_options: pathway_options(&pathway_scores),
            pathway_scores,
            skipped_herbs,
            pathway_error,
        }
    }
}
