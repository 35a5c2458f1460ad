//! File parser: delimited text with delimiter detection, JSON and NDJSON.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Result, TabulaError};
use crate::table::{CellValue, Row};

use super::source::{DataTable, FileFormat, SourceMetadata};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Delimiter to use for delimited files (None = auto-detect).
    pub delimiter: Option<u8>,
    /// Quote character.
    pub quote: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
        }
    }
}

/// Parses uploaded files into a [`DataTable`].
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    /// Create a new parser with default configuration.
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    /// Create a parser with custom configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse an uploaded file. The format is chosen from the file extension.
    pub fn parse(&self, name: &str, contents: &[u8]) -> Result<(DataTable, SourceMetadata)> {
        if contents.is_empty() {
            return Err(TabulaError::Schema(format!("File '{}' is empty", name)));
        }

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let table = match extension.as_str() {
            "csv" | "tsv" | "txt" | "psv" => {
                let delimiter = match self.config.delimiter {
                    Some(d) => d,
                    None => detect_delimiter(contents)?,
                };
                self.parse_delimited(contents, delimiter)?
            }
            "json" => parse_json(contents)?,
            "jsonl" | "ndjson" => parse_json_lines(contents)?,
            other => {
                return Err(TabulaError::UnsupportedFormat(format!(
                    "'.{}' files are not supported; upload CSV, TSV, JSON or NDJSON",
                    other
                )));
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(contents);
        let hash = format!("sha256:{:x}", hasher.finalize());

        let metadata = SourceMetadata {
            file: name.to_string(),
            hash,
            size_bytes: contents.len() as u64,
            format: table.format,
            row_count: table.row_count(),
            column_count: table.column_count(),
            loaded_at: Utc::now(),
        };

        Ok((table, metadata))
    }

    /// Parse delimited bytes. Cells stay text; empty cells become `Null`.
    fn parse_delimited(&self, bytes: &[u8], delimiter: u8) -> Result<DataTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .quote(self.config.quote)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

        if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
            return Err(TabulaError::Schema("No columns found".to_string()));
        }
        ensure_unique(&columns)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            // Short rows are padded with nulls, long rows truncated
            let row: Row = columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), CellValue::from_raw(record.get(i).unwrap_or(""))))
                .collect();
            rows.push(row);
        }

        Ok(DataTable::new(
            columns,
            rows,
            FileFormat::Delimited { delimiter },
        ))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(TabulaError::Schema(format!(
                "Duplicate column name '{}'",
                column
            )));
        }
    }
    Ok(())
}

/// Parse a JSON array of objects, falling back to NDJSON when the document
/// has trailing data.
fn parse_json(bytes: &[u8]) -> Result<DataTable> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(items)) => records_to_table(items, FileFormat::Json),
        Ok(Value::Object(obj)) => records_to_table(vec![Value::Object(obj)], FileFormat::Json),
        Ok(_) => Err(TabulaError::Schema(
            "JSON file must hold an array of objects".to_string(),
        )),
        Err(e) if e.is_syntax() && e.line() > 1 => parse_json_lines(bytes),
        Err(e) => Err(e.into()),
    }
}

fn parse_json_lines(bytes: &[u8]) -> Result<DataTable> {
    let mut items = Vec::new();
    for line in BufReader::new(bytes).lines() {
        let line = line.map_err(|e| TabulaError::Schema(format!("Invalid NDJSON: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str::<Value>(&line)?);
    }
    records_to_table(items, FileFormat::JsonLines)
}

/// Build a table from JSON records. Columns are the union of keys in
/// first-seen order.
fn records_to_table(items: Vec<Value>, format: FileFormat) -> Result<DataTable> {
    let mut columns: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(TabulaError::Schema(format!(
                "Record {} is not a JSON object",
                index
            )));
        };
        for key in obj.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
        records.push(obj);
    }

    if columns.is_empty() {
        return Err(TabulaError::Schema("No columns found".to_string()));
    }

    let rows = records
        .into_iter()
        .map(|obj| {
            let values: IndexMap<String, CellValue> = obj
                .into_iter()
                .map(|(k, v)| (k, CellValue::from_json(v)))
                .collect();
            Row::aligned(&columns, values)
        })
        .collect();

    Ok(DataTable::new(columns, rows, format))
}

/// Pick the candidate that splits the sampled lines into the most stable
/// field count. Ties favour the earlier entry in `DELIMITERS`.
fn detect_delimiter(bytes: &[u8]) -> Result<u8> {
    let sample: Vec<String> = BufReader::new(bytes)
        .lines()
        .map_while(|line| line.ok())
        .filter(|line| !line.trim().is_empty())
        .take(10)
        .collect();
    if sample.is_empty() {
        return Err(TabulaError::Schema("No lines to analyze".to_string()));
    }

    let scored = DELIMITERS
        .iter()
        .map(|&delim| (delim, delimiter_score(&sample, delim)))
        .filter(|&(_, score)| score > 0)
        .fold(None::<(u8, usize)>, |best, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        });

    Ok(scored.map(|(delim, _)| delim).unwrap_or(b','))
}

fn delimiter_score(sample: &[String], delim: u8) -> usize {
    let counts: Vec<usize> = sample.iter().map(|line| unquoted_count(line, delim)).collect();
    let header = counts[0];
    if header == 0 {
        return 0;
    }
    let min = counts.iter().copied().min().unwrap_or(0);
    let max = counts.iter().copied().max().unwrap_or(0);
    match max - min {
        // Every line agrees; tabs rarely appear inside values so they win ties.
        0 => header * 1000 + usize::from(delim == b'\t') * 100,
        1 => header * 100,
        _ => header,
    }
}

/// Occurrences of `delim` outside double quotes.
fn unquoted_count(line: &str, delim: u8) -> usize {
    line.bytes()
        .scan(false, |quoted, b| {
            if b == b'"' {
                *quoted = !*quoted;
            }
            Some(b == delim && !*quoted)
        })
        .filter(|&hit| hit)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter_csv() {
        let data = b"a,b,c\n1,2,3\n4,5,6";
        assert_eq!(detect_delimiter(data).unwrap(), b',');
    }

    #[test]
    fn test_detect_delimiter_tsv() {
        let data = b"a\tb\tc\n1\t2\t3\n4\t5\t6";
        assert_eq!(detect_delimiter(data).unwrap(), b'\t');
    }

    #[test]
    fn test_parse_csv() {
        let parser = Parser::new();
        let (table, meta) = parser
            .parse("people.csv", b"name,age,city\nAlice,30,NYC\nBob,,LA")
            .unwrap();

        assert_eq!(table.columns, vec!["name", "age", "city"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0].get("name"), Some(&CellValue::from("Alice")));
        assert_eq!(table.rows[1].get("age"), Some(&CellValue::Null));
        assert_eq!(meta.format.name(), "csv");
        assert!(meta.hash.starts_with("sha256:"));
    }

    #[test]
    fn test_parse_csv_pads_short_rows() {
        let (table, _) = Parser::new().parse("t.csv", b"a,b,c\n1,2\n").unwrap();
        assert_eq!(table.rows[0].get("c"), Some(&CellValue::Null));
        assert_eq!(table.rows[0].len(), 3);
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let err = Parser::new().parse("t.csv", b"a,a\n1,2\n").unwrap_err();
        assert!(matches!(err, TabulaError::Schema(_)));
    }

    #[test]
    fn test_parse_json_union_of_keys() {
        let data = br#"[{"id": 1, "name": "a"}, {"id": 2, "email": "b@x.io"}]"#;
        let (table, _) = Parser::new().parse("users.json", data).unwrap();

        assert_eq!(table.columns, vec!["id", "name", "email"]);
        assert_eq!(table.rows[0].get("email"), Some(&CellValue::Null));
        assert_eq!(table.rows[1].get("id"), Some(&CellValue::Integer(2)));
    }

    #[test]
    fn test_json_falls_back_to_ndjson() {
        let data = b"{\"a\": 1}\n{\"a\": 2}\n";
        let (table, meta) = Parser::new().parse("rows.json", data).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(meta.format, FileFormat::JsonLines);
    }

    #[test]
    fn test_json_non_object_records_rejected() {
        let err = Parser::new().parse("bad.json", b"[1, 2]").unwrap_err();
        assert!(matches!(err, TabulaError::Schema(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Parser::new().parse("book.xlsx", b"PK..").unwrap_err();
        assert!(matches!(err, TabulaError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = Parser::new().parse("empty.csv", b"").unwrap_err();
        assert!(matches!(err, TabulaError::Schema(_)));
    }

    #[test]
    fn test_csv_round_trip_is_lossless() {
        let data = b"code,amount\n007,1.50\n010,\n";
        let (table, _) = Parser::new().parse("codes.csv", data).unwrap();
        assert_eq!(table.render().unwrap(), data.to_vec());
    }
}
