use std::io::BufRead;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: expected {expected} fields, found {found}")]
    FieldCount {
        file: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{file}:{line}: invalid number {value:?}")]
    InvalidNumber {
        file: String,
        line: usize,
        value: String,
    },
    #[error("failed to read {file}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CwndRecord {
    pub time: f64,
    pub node: u32,
    pub old: u32,
    pub new: u32,
}

/// RTT values are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttRecord {
    pub time: f64,
    pub node: u32,
    pub old_ms: u64,
    pub new_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputRecord {
    pub time: f64,
    pub mbps: f64,
}

/// Split each non-comment, non-blank line into exactly `expected` tab
/// separated fields. Line numbers are 1-based.
fn rows<R: BufRead>(
    reader: R,
    file: &str,
    expected: usize,
) -> Result<Vec<(usize, Vec<String>)>, ParseError> {
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ParseError::Io {
            file: file.to_string(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = trimmed.split('\t').map(|f| f.trim().to_string()).collect();
        if fields.len() != expected {
            return Err(ParseError::FieldCount {
                file: file.to_string(),
                line: index + 1,
                expected,
                found: fields.len(),
            });
        }
        rows.push((index + 1, fields));
    }
    Ok(rows)
}

fn field<T: std::str::FromStr>(value: &str, file: &str, line: usize) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        file: file.to_string(),
        line,
        value: value.to_string(),
    })
}

pub fn parse_cwnd<R: BufRead>(reader: R, file: &str) -> Result<Vec<CwndRecord>, ParseError> {
    rows(reader, file, 4)?
        .into_iter()
        .map(|(line, f)| {
            Ok(CwndRecord {
                time: field(&f[0], file, line)?,
                node: field(&f[1], file, line)?,
                old: field(&f[2], file, line)?,
                new: field(&f[3], file, line)?,
            })
        })
        .collect()
}

pub fn parse_rtt<R: BufRead>(reader: R, file: &str) -> Result<Vec<RttRecord>, ParseError> {
    rows(reader, file, 4)?
        .into_iter()
        .map(|(line, f)| {
            Ok(RttRecord {
                time: field(&f[0], file, line)?,
                node: field(&f[1], file, line)?,
                old_ms: field(&f[2], file, line)?,
                new_ms: field(&f[3], file, line)?,
            })
        })
        .collect()
}

pub fn parse_throughput<R: BufRead>(
    reader: R,
    file: &str,
) -> Result<Vec<ThroughputRecord>, ParseError> {
    rows(reader, file, 2)?
        .into_iter()
        .map(|(line, f)| {
            Ok(ThroughputRecord {
                time: field(&f[0], file, line)?,
                mbps: field(&f[1], file, line)?,
            })
        })
        .collect()
}
