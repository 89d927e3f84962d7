use std::io::Cursor;
use calamine::{open_workbook_auto_from_rs, Reader};
use csv::ReaderBuilder;
use crate::errors::SchemaError;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    /// `.xlsx`, legacy `.xls`, `.xlsb` and `.ods`; the workbook kind is sniffed from the bytes.
    Spreadsheet,
}

impl TableFormat {
    /// Picks the decoder from the resource's extension; anything that is
    /// not a spreadsheet is read as delimited text.
    pub fn from_resource(resource: &str) -> Self {
        let path = resource
            .split(['?', '#'])
            .next()
            .unwrap_or(resource)
            .to_ascii_lowercase();

        let spreadsheet = [".xlsx", ".xls", ".xlsb", ".ods"]
            .iter()
            .any(|extension| path.ends_with(extension));
        if spreadsheet {
            TableFormat::Spreadsheet
        } else {
            TableFormat::Csv
        }
    }
}

/// Rows × named columns, all cells kept as text until a schema reads them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|header| header.trim().to_string())
            .collect();
        let width = headers.len();

        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Self { headers, rows }
    }

    pub fn from_records<H, R, C>(headers: &[H], records: R) -> Self
    where
        H: AsRef<str>,
        R: IntoIterator<Item = Vec<C>>,
        C: Into<String>,
    {
        Table::new(
            headers.iter().map(|h| h.as_ref().to_string()).collect(),
            records
                .into_iter()
                .map(|record| record.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    pub fn decode(bytes: &[u8], format: TableFormat) -> Result<Self, String> {
        match format {
            TableFormat::Csv => Table::from_csv_bytes(bytes).map_err(|e| e.to_string()),
            TableFormat::Spreadsheet => Table::from_spreadsheet_bytes(bytes),
        }
    }

    /// UTF-8 first, ISO-8859-1 when the body is not valid UTF-8.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, csv::Error> {
        let text = match std::str::from_utf8(bytes) {
            Ok(utf8) => utf8.to_string(),
            Err(_) => bytes.iter().map(|&byte| byte as char).collect(),
        };
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text);

        let mut csv_reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Table::new(headers, rows))
    }

    /// Reads the first worksheet; its first row is the header row.
    pub fn from_spreadsheet_bytes(bytes: &[u8]) -> Result<Self, String> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| format!("Invalid workbook: {}", e))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| "Workbook has no worksheets".to_string())?
            .map_err(|e| format!("Could not read first worksheet: {}", e))?;

        let mut sheet_rows = range.rows();
        let headers: Vec<String> = match sheet_rows.next() {
            Some(header_row) => header_row.iter().map(|cell| cell.to_string()).collect(),
            None => return Ok(Table::default()),
        };

        let rows = sheet_rows
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>())
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Ok(Table::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Result<usize, SchemaError> {
        if self.headers.is_empty() {
            return Err(SchemaError::EmptyTable);
        }
        self.headers
            .iter()
            .position(|header| header == column)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: column.to_string(),
                available: self.headers.clone(),
            })
    }

    pub fn optional_column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == column)
    }

    /// Same headers, only the rows the closure keeps.
    pub fn retain_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[String]) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }
}

/// Numeric coercion used by every filter: trims, rejects NaN, infinities
/// and non-numbers.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_bom_and_padding() {
        let bytes = "\u{feff}Gene symbol,P_value,Value\nTP53,0.001,2.5\nEGFR,0.2\n".as_bytes();
        let table = Table::from_csv_bytes(bytes).unwrap();

        assert_eq!(table.headers(), &["Gene symbol", "P_value", "Value"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1], vec!["EGFR", "0.2", ""]);
    }

    #[test]
    fn latin1_fallback() {
        let mut bytes = b"Gene symbol,P_value,Value\n".to_vec();
        bytes.extend_from_slice(&[b'C', 0xE9, b',', b'0', b',', b'1', b'\n']);
        let table = Table::from_csv_bytes(&bytes).unwrap();

        assert_eq!(table.rows()[0][0], "Cé");
    }

    #[test]
    fn missing_column_names_available_headers() {
        let table = Table::from_records(&["SMHB ID"], vec![vec!["SMHB00001"]]);
        let err = table.column_index("SMHB_ID").unwrap_err();

        assert_eq!(
            err,
            SchemaError::MissingColumn {
                column: "SMHB_ID".to_string(),
                available: vec!["SMHB ID".to_string()],
            }
        );
    }

    #[test]
    fn headers_are_trimmed() {
        let table = Table::from_records(&[" Total Score "], vec![vec!["3"]]);
        assert_eq!(table.column_index("Total Score"), Ok(0));
    }

    #[test]
    fn format_from_resource() {
        assert_eq!(TableFormat::from_resource("SMHB00336.csv"), TableFormat::Csv);
        assert_eq!(
            TableFormat::from_resource("https://host/x/Saengmaek-san_pathway_scores.xlsx?raw=1"),
            TableFormat::Spreadsheet
        );
        assert_eq!(TableFormat::from_resource("all name.XLS"), TableFormat::Spreadsheet);
    }

    #[test]
    fn unreadable_workbook_is_an_error() {
        let err = Table::decode(b"Gene symbol,P_value\nTP53,0.1\n", TableFormat::Spreadsheet).unwrap_err();
        assert!(err.starts_with("Invalid workbook"));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(parse_numeric(" 0.5 "), Some(0.5));
        assert_eq!(parse_numeric("n/a"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("-Infinity"), None);
        assert_eq!(parse_numeric("1e400"), None);
    }
}
