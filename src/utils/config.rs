use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context};
use dirs::config_dir;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::analysis::score_aggregation::HerbWeights;
use crate::parsers::herb_parser::HerbID;
use crate::parsers::lookup_parser::{HerbNameLookup, HERB_NAME_RESOURCE};
use crate::utils::fetch::TableSource;

pub const DEFAULT_BASE_URL: &str = "https://github.com/jds4682/pathway_data/raw/refs/heads/main/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PRESCRIPTION: &str = "Saengmaek-san";

lazy_static! {
    static ref DOSE_REGEX: Regex =
        Regex::new(r"^\s*(.+?)\s*=\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*$").unwrap();
    static ref HERB_CODE_REGEX: Regex = Regex::new(r"^SMHB\d+$").unwrap();
}

/// Analysis root: a named set of herbs with their dose weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    pub name: String,
    pub herbs: Vec<HerbID>,
    pub weights: HerbWeights,
}

impl Prescription {
    pub fn new(name: impl Into<String>, herbs: Vec<HerbID>, weights: HerbWeights) -> Self {
        Self { name: name.into(), herbs, weights }
    }

    /// Copy with overridden doses; herbs not yet listed are appended.
    pub fn with_doses(&self, doses: &[(HerbID, f64)]) -> Self {
        let mut prescription = self.clone();
        for (herb, weight) in doses {
            if !prescription.herbs.contains(herb) {
                prescription.herbs.push(herb.clone());
            }
            prescription.weights.set(herb.clone(), *weight);
        }
        prescription
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrescriptionEntry {
    herbs: Vec<HerbID>,
    #[serde(default)]
    weights: IndexMap<HerbID, f64>,
}

/// Named prescriptions, in catalogue order.
#[derive(Debug, Clone)]
pub struct Catalogue {
    prescriptions: IndexMap<String, Prescription>,
}

impl Default for Catalogue {
    fn default() -> Self {
        let mut weights = HerbWeights::new();
        weights.set("SMHB00336", 3.75);
        weights.set("SMHB00041", 3.75);

        let mut prescriptions = IndexMap::new();
        prescriptions.insert(
            DEFAULT_PRESCRIPTION.to_string(),
            Prescription::new(
                DEFAULT_PRESCRIPTION,
                vec!["SMHB00336".to_string(), "SMHB00041".to_string()],
                weights,
            ),
        );
        Self { prescriptions }
    }
}

impl Catalogue {
    /// JSON object: `{ "<name>": { "herbs": [..], "weights": { "<herb>": 3.75 } } }`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let entries: IndexMap<String, PrescriptionEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::new(
                ErrorKind::InvalidData,
                format!("Invalid prescription catalogue {:?}: {}", path.as_ref(), e)
            ))?;

        let prescriptions = entries
            .into_iter()
            .map(|(name, entry)| {
                let prescription = Prescription::new(
                    name.clone(),
                    entry.herbs,
                    entry.weights.into_iter().collect(),
                );
                (name, prescription)
            })
            .collect();

        Ok(Self { prescriptions })
    }

    /// Explicit path first, then `<config dir>/herbnet/catalogue.json`,
    /// then the built-in catalogue.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Catalogue::from_json_file(path);
        }
        match default_catalogue_path() {
            Some(default_path) if default_path.is_file() => Catalogue::from_json_file(default_path),
            _ => Ok(Catalogue::default()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Prescription> {
        self.prescriptions.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.prescriptions.keys().cloned().collect()
    }
}

pub fn default_catalogue_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("herbnet").join("catalogue.json"))
}

/// Parses one free-text dose input, `HERB=WEIGHT`.
pub fn parse_dose(input: &str) -> std::result::Result<(String, f64), String> {
    let caps = DOSE_REGEX
        .captures(input)
        .ok_or_else(|| format!("Invalid dose '{}'. Expected HERB=WEIGHT, e.g. SMHB00336=3.75", input))?;

    let weight: f64 = caps[2]
        .parse()
        .map_err(|_| format!("Invalid dose weight in '{}'", input))?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(format!("Dose weight must be a non-negative number in '{}'", input));
    }

    Ok((caps[1].to_string(), weight))
}

pub fn is_herb_code(herb: &str) -> bool {
    HERB_CODE_REGEX.is_match(herb.trim())
}

/// Herbs given by name are resolved to their SMHB code through the lookup.
pub fn resolve_herb(herb: &str, lookup: Option<&HerbNameLookup>) -> std::result::Result<HerbID, String> {
    let herb = herb.trim();
    if is_herb_code(herb) {
        return Ok(herb.to_string());
    }
    match lookup {
        Some(lookup) => lookup
            .resolve(herb)
            .map(str::to_string)
            .ok_or_else(|| format!("Unknown herb name '{}'", herb)),
        None => Err(format!("'{}' is not a herb code and no name lookup is loaded", herb)),
    }
}

/// Parses `HERB=WEIGHT` inputs. The herb name table is only fetched when
/// some herb is given by name instead of by code.
pub fn resolve_doses<S: TableSource + ?Sized>(
    inputs: &[String],
    source: &S,
) -> anyhow::Result<Vec<(HerbID, f64)>> {
    let parsed = inputs
        .iter()
        .map(|input| parse_dose(input))
        .collect::<std::result::Result<Vec<_>, String>>()
        .map_err(|e| anyhow!(e))?;

    let lookup = if parsed.iter().any(|(herb, _)| !is_herb_code(herb)) {
        let table = source
            .fetch_table(HERB_NAME_RESOURCE)
            .with_context(|| format!("Herb names given but '{}' could not be loaded", HERB_NAME_RESOURCE))?;
        Some(HerbNameLookup::from_table(&table)?)
    } else {
        None
    };

    parsed
        .into_iter()
        .map(|(herb, weight)| {
            resolve_herb(&herb, lookup.as_ref())
                .map(|code| (code, weight))
                .map_err(|e| anyhow!(e))
        })
        .collect()
}
