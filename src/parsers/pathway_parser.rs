use compact_str::CompactString;
use indexmap::IndexSet;
use crate::errors::SchemaError;
use crate::parsers::herb_parser::GeneSymbol;
use crate::parsers::table::{parse_numeric, Table};

pub const GENE_COLUMN: &str = "Gene";
pub const PATHWAY_COLUMN: &str = "Pathway";
pub const SCORE_COLUMN: &str = "Score";
pub const TOTAL_SCORE_COLUMN: &str = "Total Score";

pub const ALL_PATHWAYS: &str = "All";

/// One row of `<prescription>_pathway_scores.xlsx`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayScore {
    pub gene: GeneSymbol,
    pub pathway: String,
    pub score: f64,
    pub total_score: f64,
}

pub fn parse_pathway_scores(table: &Table) -> Result<Vec<PathwayScore>, SchemaError> {
    let gene = table.column_index(GENE_COLUMN)?;
    let pathway = table.column_index(PATHWAY_COLUMN)?;
    let score = table.column_index(SCORE_COLUMN)?;
    let total_score = table.column_index(TOTAL_SCORE_COLUMN)?;

    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            let gene_name = row[gene].trim();
            let pathway_name = row[pathway].trim();
            if gene_name.is_empty() || pathway_name.is_empty() {
                return None;
            }
            Some(PathwayScore {
                gene: CompactString::new(gene_name),
                pathway: pathway_name.to_string(),
                score: parse_numeric(&row[score])?,
                total_score: parse_numeric(&row[total_score])?,
            })
        })
        .collect())
}

/// `"All"` followed by every pathway in first-seen order.
pub fn pathway_options(scores: &[PathwayScore]) -> Vec<String> {
    let unique: IndexSet<&str> = scores.iter().map(|s| s.pathway.as_str()).collect();

    std::iter::once(ALL_PATHWAYS.to_string())
        .chain(unique.into_iter().map(str::to_string))
        .collect()
}
