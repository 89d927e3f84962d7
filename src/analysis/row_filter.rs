use log::{debug, warn};
use crate::analysis::multiple_testing_correction::{adjust_column_p_values, AdjustmentMethod};
use crate::errors::SchemaError;
use crate::parsers::herb_parser::{P_VALUE_COLUMN, VALUE_COLUMN};
use crate::parsers::table::{parse_numeric, Table};

pub const DEFAULT_P_VALUE_THRESHOLD: f64 = 0.01;
pub const DEFAULT_VALUE_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    LessThan(f64),
    GreaterThan(f64),
}

impl Comparison {
    pub fn holds(&self, value: f64) -> bool {
        match *self {
            Comparison::LessThan(threshold) => value < threshold,
            Comparison::GreaterThan(threshold) => value > threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub comparison: Comparison,
}

impl Predicate {
    pub fn less_than(column: &str, threshold: f64) -> Self {
        Self { column: column.to_string(), comparison: Comparison::LessThan(threshold) }
    }

    pub fn greater_than(column: &str, threshold: f64) -> Self {
        Self { column: column.to_string(), comparison: Comparison::GreaterThan(threshold) }
    }
}

/// Keeps the rows where every constrained column is numeric and satisfies
/// its comparison. Predicates are a conjunction, so their order is irrelevant.
pub fn filter_rows(table: &Table, predicates: &[Predicate]) -> Result<Table, SchemaError> {
    let resolved: Vec<(usize, Comparison)> = predicates
        .iter()
        .map(|predicate| Ok((table.column_index(&predicate.column)?, predicate.comparison)))
        .collect::<Result<_, SchemaError>>()?;

    Ok(table.retain_rows(|row| {
        resolved.iter().all(|&(column, comparison)| {
            parse_numeric(&row[column]).is_some_and(|value| comparison.holds(value))
        })
    }))
}

/// Drops rows where any of `columns` is not numeric, without thresholding.
pub fn drop_non_numeric(table: &Table, columns: &[&str]) -> Result<Table, SchemaError> {
    let indices: Vec<usize> = columns
        .iter()
        .map(|column| table.column_index(column))
        .collect::<Result<_, SchemaError>>()?;

    Ok(table.retain_rows(|row| indices.iter().all(|&i| parse_numeric(&row[i]).is_some())))
}

/// Significance filter applied to every herb table before it reaches the graph.
#[derive(Debug, Clone, Copy)]
pub struct HerbTargetFilter {
    pub p_value_threshold: f64,
    pub value_threshold: f64,
    pub fdr_method: AdjustmentMethod,
}

impl Default for HerbTargetFilter {
    fn default() -> Self {
        Self {
            p_value_threshold: DEFAULT_P_VALUE_THRESHOLD,
            value_threshold: DEFAULT_VALUE_THRESHOLD,
            fdr_method: AdjustmentMethod::None,
        }
    }
}

impl HerbTargetFilter {
    pub fn predicates(&self) -> Vec<Predicate> {
        vec![
            Predicate::less_than(P_VALUE_COLUMN, self.p_value_threshold),
            Predicate::greater_than(VALUE_COLUMN, self.value_threshold),
        ]
    }

    pub fn apply(&self, table: &Table) -> Result<Table, SchemaError> {
        let candidate = if matches!(self.fdr_method, AdjustmentMethod::None) {
            table.clone()
        } else {
            warn!(
                "Adjusting target p-values with {:?} before filtering; this is not part of the default pipeline",
                self.fdr_method
            );
            adjust_column_p_values(table, P_VALUE_COLUMN, self.fdr_method)?
        };

        let filtered = filter_rows(&candidate, &self.predicates())?;
        debug!("{} of {} target rows passed the significance filter", filtered.len(), table.len());
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(rows: Vec<Vec<&str>>) -> Table {
        Table::from_records(&["Gene symbol", "P_value", "Value"], rows)
    }

    #[test]
    fn non_numeric_rows_are_excluded() {
        let table = targets(vec![
            vec!["A", "0.001", "5"],
            vec!["B", "NA", "5"],
            vec!["C", "0.001", "high"],
            vec!["D", "", ""],
        ]);
        let kept = HerbTargetFilter::default().apply(&table).unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept.rows()[0][0], "A");
    }

    #[test]
    fn thresholds_are_strict() {
        let table = targets(vec![
            vec!["edge_p", "0.01", "5"],
            vec!["edge_value", "0.001", "1"],
            vec!["inside", "0.0099", "1.0001"],
        ]);
        let kept = HerbTargetFilter::default().apply(&table).unwrap();

        let genes: Vec<&str> = kept.rows().iter().map(|row| row[0].as_str()).collect();
        assert_eq!(genes, vec!["inside"]);
    }

    #[test]
    fn predicate_order_does_not_matter() {
        let table = targets(vec![
            vec!["A", "0.001", "5"],
            vec!["B", "0.5", "5"],
            vec!["C", "0.001", "0.5"],
        ]);
        let forward = HerbTargetFilter::default().predicates();
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(
            filter_rows(&table, &forward).unwrap(),
            filter_rows(&table, &reversed).unwrap()
        );
    }

    #[test]
    fn unknown_column_is_a_schema_error() {
        let table = targets(vec![vec!["A", "0.001", "5"]]);
        let result = filter_rows(&table, &[Predicate::less_than("p-value", 0.05)]);
        assert!(matches!(result, Err(SchemaError::MissingColumn { .. })));
    }

    #[test]
    fn drop_non_numeric_keeps_insignificant_rows() {
        let table = targets(vec![vec!["A", "0.9", "0.1"], vec!["B", "x", "3"]]);
        let kept = drop_non_numeric(&table, &[P_VALUE_COLUMN, VALUE_COLUMN]).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn fdr_stage_is_opt_in() {
        // Raw p-values pass, BH-adjusted ones (0.009 * 3 / rank) do not all pass.
        let table = targets(vec![
            vec!["A", "0.009", "5"],
            vec!["B", "0.009", "5"],
            vec!["C", "0.5", "5"],
        ]);
        let plain = HerbTargetFilter::default().apply(&table).unwrap();
        assert_eq!(plain.len(), 2);

        let with_fdr = HerbTargetFilter {
            fdr_method: AdjustmentMethod::BenjaminiHochberg,
            ..HerbTargetFilter::default()
        };
        assert_eq!(with_fdr.apply(&table).unwrap().len(), 0);
    }
}
