use std::path::Path;
use rustc_hash::FxHashMap;
use HerbNet::analysis::gsea::*;
use HerbNet::analysis::network::herb_resource;
use HerbNet::analysis::score_aggregation::HerbWeights;
use HerbNet::errors::EnrichmentError;
use HerbNet::parsers::table::Table;
use HerbNet::utils::config::Prescription;
use HerbNet::utils::fetch::InMemoryTables;
use HerbNet::utils::gene_mapping::StaticGeneMapper;

/// Answers every category with one term per ranked gene.
struct EchoRunner;

impl EnrichmentRunner for EchoRunner {
    fn prerank(
        &self,
        ranked: &[RankedGene],
        category: GeneSetCategory,
        _workdir: &Path,
    ) -> Result<Vec<EnrichmentTerm>, EnrichmentError> {
        Ok(ranked
            .iter()
            .enumerate()
            .map(|(i, gene)| EnrichmentTerm {
                term: format!("{} {}", category.slug(), gene.id),
                es: 0.5,
                nes: gene.score,
                nominal_p: 0.01,
                fdr: 0.01 * (i + 1) as f64,
                gene_set_size: 10 + i,
                lead_genes: gene.id.clone(),
            })
            .collect())
    }
}

fn source() -> InMemoryTables {
    let mut source = InMemoryTables::new();
    source.insert(
        herb_resource("A"),
        Table::from_records(
            &["Gene symbol", "P_value", "Value"],
            vec![
                vec!["p53", "0.5", "2.0"],
                vec!["AKT1", "n/a", "4.0"],
                vec![" TNF ", "0.001", "0.5"],
            ],
        ),
    );
    source.insert(
        herb_resource("B"),
        Table::from_records(&["Gene symbol", "P_value", "Value"], vec![vec!["TP53", "0.2", "1.0"]]),
    );
    source
}

fn prescription() -> Prescription {
    let mut weights = HerbWeights::new();
    weights.set("A", 2.0);
    Prescription::new("P", vec!["A".to_string(), "B".to_string(), "C".to_string()], weights)
}

#[test]
fn enrichment_ranks_every_numeric_target() {
    let (gene_scores, skipped) = collect_gene_scores(&source(), &prescription());

    // No significance threshold here: only the non-numeric AKT1 row is dropped.
    assert_eq!(gene_scores.len(), 3);
    assert_eq!(gene_scores.get("p53"), Some(&4.0));
    assert_eq!(gene_scores.get("TNF"), Some(&1.0));
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "C");

    let mut aliases = FxHashMap::default();
    aliases.insert("p53".to_string(), "TP53".to_string());
    aliases.insert("TP53".to_string(), "TP53".to_string());
    let dir = tempfile::tempdir().unwrap();

    let report = run_enrichment(&gene_scores, &StaticGeneMapper(aliases), &EchoRunner, dir.path()).unwrap();

    assert_eq!(report.ranked_genes, 2);
    assert_eq!(report.unresolved, vec!["TNF"]);
    assert!(report.failures.is_empty());

    let kegg = &report.results[&GeneSetCategory::Pathway];
    assert_eq!(kegg[0].term, "kegg TP53");
    assert!((kegg[0].nes - 5.0).abs() < 1e-6);

    for file in [
        "plot_go_dotplot.html",
        "plot_kegg_dotplot.html",
        "gsea_go_results.tsv",
        "gsea_kegg_results.tsv",
    ] {
        assert!(dir.path().join(file).is_file(), "{} was not written", file);
    }
}
