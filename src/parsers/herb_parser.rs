use compact_str::CompactString;
use crate::errors::SchemaError;
use crate::parsers::table::{parse_numeric, Table};

pub type HerbID = String;
pub type GeneSymbol = CompactString;

pub const GENE_SYMBOL_COLUMN: &str = "Gene symbol";
pub const P_VALUE_COLUMN: &str = "P_value";
pub const VALUE_COLUMN: &str = "Value";
pub const TARGET_ID_COLUMN: &str = "Target id";

/// One row of `<herb_code>.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct HerbTarget {
    pub gene_symbol: GeneSymbol,
    pub p_value: f64,
    pub value: f64,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct HerbTargetSchema {
    gene_symbol: usize,
    p_value: usize,
    value: usize,
    target_id: Option<usize>,
}

impl HerbTargetSchema {
    pub fn from_table(table: &Table) -> Result<Self, SchemaError> {
        Ok(Self {
            gene_symbol: table.column_index(GENE_SYMBOL_COLUMN)?,
            p_value: table.column_index(P_VALUE_COLUMN)?,
            value: table.column_index(VALUE_COLUMN)?,
            target_id: table.optional_column_index(TARGET_ID_COLUMN),
        })
    }

    fn read_row(&self, row: &[String]) -> Option<HerbTarget> {
        let gene_symbol = row[self.gene_symbol].trim();
        if gene_symbol.is_empty() {
            return None;
        }

        Some(HerbTarget {
            gene_symbol: CompactString::new(gene_symbol),
            p_value: parse_numeric(&row[self.p_value])?,
            value: parse_numeric(&row[self.value])?,
            target_id: self
                .target_id
                .map(|index| row[index].trim().to_string())
                .filter(|id| !id.is_empty()),
        })
    }
}

/// Typed view of a herb table. Rows whose numeric columns do not parse, or
/// whose gene symbol is blank, are left out.
pub fn parse_herb_targets(table: &Table) -> Result<Vec<HerbTarget>, SchemaError> {
    let schema = HerbTargetSchema::from_table(table)?;

    Ok(table
        .rows()
        .iter()
        .filter_map(|row| schema.read_row(row))
        .collect())
}
