use HerbNet::analysis::network::{herb_resource, pathway_resource, DisplayConfig, NetworkBuilder, NodeCategory};
use HerbNet::analysis::row_filter::HerbTargetFilter;
use HerbNet::analysis::score_aggregation::HerbWeights;
use HerbNet::analysis::subgraph::{select, Selection, SelectionState};
use HerbNet::errors::{FetchError, LoadError};
use HerbNet::parsers::table::Table;
use HerbNet::utils::config::Prescription;
use HerbNet::utils::download::{read_node_csv, DownloadManager, ExportFormat, ExportTable};
use HerbNet::utils::fetch::InMemoryTables;

fn herb_table(rows: &[(&str, &str, &str)]) -> Table {
    Table::from_records(
        &["Gene symbol", "P_value", "Value"],
        rows.iter().map(|&(gene, p, value)| vec![gene, p, value]),
    )
}

fn two_herb_prescription() -> Prescription {
    let mut weights = HerbWeights::new();
    weights.set("A", 3.75);
    weights.set("B", 1.0);
    Prescription::new("P", vec!["A".to_string(), "B".to_string()], weights)
}

fn two_herb_source() -> InMemoryTables {
    let mut source = InMemoryTables::new();
    source.insert(
        herb_resource("A"),
        herb_table(&[("G1", "0.005", "2.0"), ("G2", "0.02", "5.0")]),
    );
    source.insert(herb_resource("B"), herb_table(&[("G1", "0.001", "3.0")]));
    source
}

#[test]
fn two_herbs_share_one_gene() {
    let source = two_herb_source();
    let builder = NetworkBuilder::new(&source, HerbTargetFilter::default(), DisplayConfig::default());
    let build = builder.build(&two_herb_prescription());
    let network = &build.network;

    let mut ids: Vec<&str> = network.nodes().map(|node| node.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["A", "B", "G1", "P"]);

    assert_eq!(network.edge_weight("P", "A"), Some(3.75));
    assert_eq!(network.edge_weight("P", "B"), Some(1.0));
    assert_eq!(network.edge_weight("A", "G1"), Some(7.5));
    assert_eq!(network.edge_weight("B", "G1"), Some(3.0));
    assert_eq!(network.edge_weight("A", "G2"), None);
    assert_eq!(network.edge_count(), 4);

    assert_eq!(network.node("G1").map(|node| node.category), Some(NodeCategory::Gene));
    // G1 total score is 7.5 + 3.0, half of which sits inside the size bounds.
    assert_eq!(network.node("G1").map(|node| node.size), Some(5.25));
    assert!(build.skipped_herbs.is_empty());
    assert!(build.pathway_error.is_some());
}

#[test]
fn missing_herb_is_skipped() {
    let mut source = InMemoryTables::new();
    source.insert(herb_resource("B"), herb_table(&[("G1", "0.001", "3.0")]));

    let builder = NetworkBuilder::new(&source, HerbTargetFilter::default(), DisplayConfig::default());
    let build = builder.build(&two_herb_prescription());

    assert_eq!(build.skipped_herbs.len(), 1);
    let (herb, error) = &build.skipped_herbs[0];
    assert_eq!(herb, "A");
    assert!(matches!(
        error,
        LoadError::Fetch(FetchError::ResourceNotFound { status: 404, .. })
    ));

    assert_eq!(build.network.edge_weight("B", "G1"), Some(3.0));
    assert!(build.network.neighbors("A").all(|node| node.category == NodeCategory::Prescription));
    assert!(build.warnings().iter().any(|warning| warning.contains("Skipped herb A")));
}

#[test]
fn pathway_rows_extend_the_graph_and_drive_selection() {
    let mut source = two_herb_source();
    source.insert(
        pathway_resource("P"),
        Table::from_records(
            &["Gene", "Pathway", "Score", "Total Score"],
            vec![
                vec!["G1", "PI3K-Akt signaling pathway", "4", "20"],
                vec!["G9", "Apoptosis", "2", "6"],
            ],
        ),
    );

    let builder = NetworkBuilder::new(&source, HerbTargetFilter::default(), DisplayConfig::default());
    let build = builder.build(&two_herb_prescription());

    assert_eq!(build.pathway_options, vec!["All", "PI3K-Akt signaling pathway", "Apoptosis"]);
    assert_eq!(build.network.edge_weight("G1", "PI3K-Akt signaling pathway"), Some(4.0));
    assert!(build.network.contains("G9"));

    let everything = select(&build.network, &Selection::pathway("All"));
    assert_eq!(everything.node_count(), build.network.node_count());
    assert_eq!(everything.edge_count(), build.network.edge_count());

    let apoptosis = select(&build.network, &Selection::pathway("Apoptosis"));
    assert!(apoptosis.contains("G9"));
    assert!(apoptosis.contains("A"));
    assert!(!apoptosis.contains("G1"));

    let mut state = SelectionState::new();
    state.set_pathway_filter("Apoptosis");
    state.select_node("G1");
    let around_g1 = select(&build.network, &state.selection());
    for id in ["G1", "A", "B", "P", "PI3K-Akt signaling pathway"] {
        assert!(around_g1.contains(id), "{} should be within two hops of G1", id);
    }
    assert!(!around_g1.contains("G9"));
}

#[test]
fn exported_nodes_parse_back_in_order() {
    let source = two_herb_source();
    let builder = NetworkBuilder::new(&source, HerbTargetFilter::default(), DisplayConfig::default());
    let build = builder.build(&two_herb_prescription());

    let downloads = DownloadManager::new("P", &build.network);
    let (_, bytes) = downloads
        .generate_file_content(ExportTable::Nodes, ExportFormat::Csv)
        .unwrap();
    let parsed = read_node_csv(&bytes).unwrap();

    let expected: Vec<(String, String)> = build
        .network
        .nodes()
        .map(|node| (node.id.clone(), node.category.to_string()))
        .collect();
    let actual: Vec<(String, String)> = parsed
        .iter()
        .map(|row| (row.id.clone(), row.group.clone()))
        .collect();
    assert_eq!(actual, expected);
    assert!(parsed.iter().all(|row| row.id == row.label));
}
