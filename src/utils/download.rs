use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use clap::ValueEnum;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use crate::analysis::network::HerbNetwork;
use crate::errors::ExportError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Group")]
    pub group: String,
    #[serde(rename = "Size")]
    pub size: f64,
    #[serde(rename = "Color")]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportTable {
    Nodes,
    Edges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Tsv => "text/tab-separated-values; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

pub fn node_rows(network: &HerbNetwork) -> Vec<NodeRow> {
    network
        .nodes()
        .map(|node| NodeRow {
            id: node.id.clone(),
            label: node.id.clone(),
            group: node.category.to_string(),
            size: node.size,
            color: node.color.clone(),
        })
        .collect()
}

pub fn edge_rows(network: &HerbNetwork) -> Vec<EdgeRow> {
    network
        .edges()
        .map(|(source, target, weight)| EdgeRow {
            source: source.to_string(),
            target: target.to_string(),
            weight,
        })
        .collect()
}

/// Builds node/edge downloads for one rendered network.
pub struct DownloadManager {
    name: String,
    nodes: Vec<NodeRow>,
    edges: Vec<EdgeRow>,
}

impl DownloadManager {
    pub fn new(name: &str, network: &HerbNetwork) -> Self {
        Self {
            name: name.to_string(),
            nodes: node_rows(network),
            edges: edge_rows(network),
        }
    }

    pub fn file_name(&self, table: ExportTable, format: ExportFormat) -> String {
        let suffix = match table {
            ExportTable::Nodes => "nodes",
            ExportTable::Edges => "edges",
        };
        format!("{}_{}.{}", self.name, suffix, format.extension())
    }

    /// `(file name, bytes)`. CSV output starts with a UTF-8 BOM so
    /// spreadsheet programs pick the right encoding for Korean names.
    pub fn generate_file_content(
        &self,
        table: ExportTable,
        format: ExportFormat,
    ) -> Result<(String, Vec<u8>), ExportError> {
        let content = match (table, format) {
            (ExportTable::Nodes, ExportFormat::Json) => serde_json::to_vec_pretty(&self.nodes)?,
            (ExportTable::Edges, ExportFormat::Json) => serde_json::to_vec_pretty(&self.edges)?,
            (ExportTable::Nodes, _) => delimited(&self.nodes, format)?,
            (ExportTable::Edges, _) => delimited(&self.edges, format)?,
        };
        Ok((self.file_name(table, format), content))
    }

    pub fn write_to(
        &self,
        dir: &Path,
        table: ExportTable,
        format: ExportFormat,
    ) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(dir)?;
        let (file_name, content) = self.generate_file_content(table, format)?;
        let path = dir.join(file_name);
        fs::File::create(&path)?.write_all(&content)?;
        Ok(path)
    }
}

fn delimited<T: Serialize>(rows: &[T], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let (delimiter, prefix) = match format {
        ExportFormat::Tsv => (b'\t', &[][..]),
        _ => (b',', UTF8_BOM),
    };

    let mut wtr = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(prefix.to_vec());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Reads an exported node CSV back, BOM or not.
pub fn read_node_csv(bytes: &[u8]) -> Result<Vec<NodeRow>, ExportError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut rdr = ReaderBuilder::new().from_reader(body);
    rdr.deserialize()
        .map(|row| row.map_err(ExportError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::network::{NetworkNode, NodeCategory};

    fn network() -> HerbNetwork {
        let mut network = HerbNetwork::new();
        network.add_node(NetworkNode::new("생맥산", NodeCategory::Prescription, 12.0));
        network.add_node(NetworkNode::new("SMHB00336", NodeCategory::Herb, 8.0));
        network.add_node(NetworkNode::new("AKT1, isoform 2", NodeCategory::Gene, 3.75));
        network.add_edge("생맥산", "SMHB00336", 3.75);
        network.add_edge("SMHB00336", "AKT1, isoform 2", 7.5);
        network
    }

    #[test]
    fn node_csv_round_trips_in_order() {
        let network = network();
        let manager = DownloadManager::new("생맥산", &network);
        let (file_name, bytes) = manager
            .generate_file_content(ExportTable::Nodes, ExportFormat::Csv)
            .unwrap();

        assert_eq!(file_name, "생맥산_nodes.csv");
        assert!(bytes.starts_with(UTF8_BOM));

        let parsed = read_node_csv(&bytes).unwrap();
        let as_triples = |rows: &[NodeRow]| -> Vec<(String, String, String)> {
            rows.iter()
                .map(|r| (r.id.clone(), r.label.clone(), r.group.clone()))
                .collect()
        };
        assert_eq!(as_triples(&parsed), as_triples(&node_rows(&network)));
        assert_eq!(parsed[2].group, "gene");
    }

    #[test]
    fn edge_tsv_has_no_bom() {
        let manager = DownloadManager::new("x", &network());
        let (_, bytes) = manager
            .generate_file_content(ExportTable::Edges, ExportFormat::Tsv)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("Source\tTarget\tWeight\n"));
        assert!(text.contains("SMHB00336\tAKT1, isoform 2\t7.5"));
    }

    #[test]
    fn json_export_and_file_write() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DownloadManager::new("x", &network());
        let path = manager.write_to(dir.path(), ExportTable::Edges, ExportFormat::Json).unwrap();

        let rows: Vec<EdgeRow> = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].weight, 7.5);
    }
}
