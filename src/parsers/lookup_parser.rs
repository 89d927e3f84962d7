use rustc_hash::FxHashMap;
use crate::errors::SchemaError;
use crate::parsers::herb_parser::HerbID;
use crate::parsers::table::{parse_numeric, Table};

pub const HERB_NAME_RESOURCE: &str = "all name.xlsx";
pub const KOREAN_NAME_COLUMN: &str = "korean name";
pub const SMHB_ID_COLUMN: &str = "SMHB_ID";

pub const MOLECULE_RESOURCE: &str = "SMIT.xlsx";
pub const MOLECULE_NAME_COLUMN: &str = "Molecule_name";
pub const OB_SCORE_COLUMN: &str = "OB_score";

pub const DEFAULT_MIN_OB_SCORE: f64 = 30.0;

/// Korean herb name → SMHB herb code.
#[derive(Debug, Clone, Default)]
pub struct HerbNameLookup {
    by_name: FxHashMap<String, HerbID>,
    names: Vec<String>,
}

impl HerbNameLookup {
    pub fn from_table(table: &Table) -> Result<Self, SchemaError> {
        let name_column = table.column_index(KOREAN_NAME_COLUMN)?;
        let id_column = table.column_index(SMHB_ID_COLUMN)?;

        let mut lookup = HerbNameLookup::default();
        for row in table.rows() {
            let name = row[name_column].trim();
            let herb_id = row[id_column].trim();
            if name.is_empty() || herb_id.is_empty() {
                continue;
            }
            if lookup
                .by_name
                .insert(name.to_string(), herb_id.to_string())
                .is_none()
            {
                lookup.names.push(name.to_string());
            }
        }
        Ok(lookup)
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name.get(name.trim()).map(String::as_str)
    }

    /// Names in the order the spreadsheet lists them.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeScore {
    pub molecule: String,
    pub ob_score: f64,
}

/// Molecules whose oral bioavailability is at least `min_ob_score`.
/// Rows with a non-numeric score are never admitted.
pub fn admit_by_ob_score(table: &Table, min_ob_score: f64) -> Result<Vec<MoleculeScore>, SchemaError> {
    let name_column = table.column_index(MOLECULE_NAME_COLUMN)?;
    let score_column = table.column_index(OB_SCORE_COLUMN)?;

    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            let molecule = row[name_column].trim();
            let ob_score = parse_numeric(&row[score_column])?;
            (!molecule.is_empty() && ob_score >= min_ob_score).then(|| MoleculeScore {
                molecule: molecule.to_string(),
                ob_score,
            })
        })
        .collect())
}
