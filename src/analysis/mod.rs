pub mod row_filter;
pub mod multiple_testing_correction;
pub mod score_aggregation;
pub mod network;
pub mod subgraph;
pub mod layout;
pub mod network_plot;
pub mod gsea;
pub mod enrichment_plots;
pub mod write_results;
