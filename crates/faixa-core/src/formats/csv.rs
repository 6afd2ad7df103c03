//! CSV survey table reader
//!
//! Reads UTF-8 tables (byte-order mark tolerated) whose first row is the
//! header. Cells and headers are trimmed; blank lines are skipped but still
//! count toward row numbers, so row `n` is the `n`-th line after the header.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{FaixaError, Result};

/// Parsed CSV table
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDocument {
    /// File name the table was read from
    pub file: String,

    /// Header names in column order
    pub headers: Vec<String>,

    /// Records in file order
    pub rows: Vec<CsvRow>,
}

/// One data record
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// Line offset from the header; the first line after it is 1
    pub number: usize,

    /// Values keyed by header
    pub values: BTreeMap<String, String>,
}

impl CsvDocument {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read and parse a CSV file
pub fn read_csv(path: &Path) -> Result<CsvDocument> {
    let file = super::file_label(path);
    let bytes = fs::read(path)
        .map_err(|e| FaixaError::parse(&file, format!("Failed to read CSV file: {}", e)))?;
    let content = String::from_utf8(bytes)
        .map_err(|e| FaixaError::parse(&file, format!("File is not valid UTF-8: {}", e)))?;
    parse_csv(&file, &content)
}

/// Parse CSV content already loaded in memory
pub fn parse_csv(file: &str, content: &str) -> Result<CsvDocument> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::All)
        .flexible(false)
        .from_reader(content.as_bytes());

    let header_record = reader
        .headers()
        .map_err(|e| FaixaError::parse(file, format!("Invalid header row: {}", e)))?;
    let header_line = header_record.position().map_or(1, |p| p.line());
    let headers: Vec<String> = header_record.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| FaixaError::parse(file, format!("Malformed record: {}", e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let number = record
            .position()
            .map_or(index + 1, |p| p.line().saturating_sub(header_line) as usize);
        let values: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(CsvRow { number, values });
    }

    tracing::debug!(file, rows = rows.len(), columns = headers.len(), "Parsed CSV table");

    Ok(CsvDocument { file: file.to_string(), headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_and_trimmed_headers() {
        let doc = parse_csv("arvores.csv", "\u{feff} latitude , longitude \n-15.79,-47.88\n").unwrap();
        assert_eq!(doc.headers, vec!["latitude", "longitude"]);
        assert_eq!(doc.rows[0].values["latitude"], "-15.79");
        assert_eq!(doc.rows[0].values["longitude"], "-47.88");
    }

    #[test]
    fn test_quoted_fields_with_commas() {
        let doc = parse_csv("c.csv", "id,descricao\n1,\"Rodovia BR-040, km 12\"\n2,\"dito \"\"x\"\"\"\n").unwrap();
        assert_eq!(doc.rows[0].values["descricao"], "Rodovia BR-040, km 12");
        assert_eq!(doc.rows[1].values["descricao"], "dito \"x\"");
    }

    #[test]
    fn test_unterminated_quote_is_parse_error() {
        let err = parse_csv("risco.csv", "vao,classe\n\"E1 - E2,alta\nE2 - E3,baixa\n").unwrap_err();
        assert!(matches!(err, FaixaError::Parse { .. }));
    }

    #[test]
    fn test_inch_mark_in_unquoted_field() {
        let doc = parse_csv("cruzamentos.csv", "tipo,descricao\nduto,tubo 5\" aco\n").unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.rows[0].values["descricao"], "tubo 5\" aco");
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let err = parse_csv("risco.csv", "vao,classe\nE1,alta,extra\n").unwrap_err();
        assert!(matches!(err, FaixaError::Parse { .. }));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let doc = parse_csv("v.csv", "id,tipo\n1,eucalipto\n\n2,pinus\n").unwrap();
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_row_numbers_follow_file_lines() {
        let doc = parse_csv("v.csv", "\u{feff}id,tipo\n1,eucalipto\n\n2,pinus\n,\n3,\"ipe\nroxo\"\n4,jatoba\n").unwrap();
        let numbers: Vec<usize> = doc.rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 3, 5, 7]);
        assert_eq!(doc.rows[2].values["tipo"], "ipe\nroxo");
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let err = read_csv(Path::new("/nonexistent/faixa/risco.csv")).unwrap_err();
        assert!(matches!(err, FaixaError::Parse { ref file, .. } if file == "risco.csv"));
    }
}
