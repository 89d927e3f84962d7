use adjustp::{adjust, Procedure};
use clap::ValueEnum;
use crate::errors::SchemaError;
use crate::parsers::table::{parse_numeric, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdjustmentMethod {
    None,
    Bonferroni,
    BenjaminiHochberg,
    BenjaminiYekutieli,
}

impl AdjustmentMethod {
    fn to_procedure(self) -> Option<Procedure> {
        match self {
            AdjustmentMethod::None => None,
            AdjustmentMethod::Bonferroni => Some(Procedure::Bonferroni),
            AdjustmentMethod::BenjaminiHochberg => Some(Procedure::BenjaminiHochberg),
            AdjustmentMethod::BenjaminiYekutieli => Some(Procedure::BenjaminiYekutieli),
        }
    }
}

pub fn adjust_p_values(p_values: &[f64], method: AdjustmentMethod) -> Vec<f64> {
    match method.to_procedure() {
        Some(procedure) if !p_values.is_empty() => adjust(p_values, procedure),
        _ => p_values.to_vec(),
    }
}

/// Rewrites `column` with adjusted p-values. Only numeric cells take part in
/// the correction; the rest are left as they are for the filter to drop.
pub fn adjust_column_p_values(
    table: &Table,
    column: &str,
    method: AdjustmentMethod,
) -> Result<Table, SchemaError> {
    let column_index = table.column_index(column)?;

    let mut positions = Vec::new();
    let mut p_values = Vec::new();
    for (row_index, row) in table.rows().iter().enumerate() {
        if let Some(p_value) = parse_numeric(&row[column_index]) {
            positions.push(row_index);
            p_values.push(p_value);
        }
    }

    let adjusted = adjust_p_values(&p_values, method);

    let mut adjusted_table = table.clone();
    for (row_index, adjusted_p) in positions.into_iter().zip(adjusted) {
        adjusted_table.set_cell(row_index, column_index, adjusted_p.to_string());
    }
    Ok(adjusted_table)
}
