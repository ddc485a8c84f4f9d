//! Parser for the pipe-delimited "versions" document
//!
//! ```text
//! Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4|VersionsName!String:0
//! ## seqn = 2241282
//! us|be2bb98dc28aee05bbee519393696cdb|56461|11.0.2.56461
//! eu|be2bb98dc28aee05bbee519393696cdb|56461|11.0.2.56461
//! ```
//!
//! Line 0 names the columns (`name!type:len`, only `name` is kept), line 1 is
//! the sequence-number line and is never treated as data, and every following
//! line is one record. Parsing is total: malformed input only ever produces
//! fewer rows.

use crate::models::ParsedFieldRow;
use tracing::trace;

const SEQN_PREFIX: &str = "##";

/// A parsed document: data rows plus the sequence number, when readable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionsDocument {
    pub seqn: Option<u64>,
    pub rows: Vec<ParsedFieldRow>,
}

/// Parse a versions document into its data rows
pub fn parse(raw: &str) -> Vec<ParsedFieldRow> {
    parse_document(raw).rows
}

/// Parse a versions document, keeping the sequence number of line 1
pub fn parse_document(raw: &str) -> VersionsDocument {
    let lines: Vec<&str> = raw
        .trim()
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    if lines.len() < 3 {
        return VersionsDocument::default();
    }

    let headers: Vec<&str> = lines[0]
        .split('|')
        .map(|spec| spec.split_once('!').map_or(spec, |(name, _)| name))
        .collect();

    let rows = lines[2..]
        .iter()
        .enumerate()
        .filter_map(|(offset, line)| {
            let values: Vec<&str> = line.split('|').collect();
            if values.len() != headers.len() {
                trace!(
                    line = offset + 2,
                    expected = headers.len(),
                    found = values.len(),
                    "Skipping ragged row"
                );
                return None;
            }

            Some(
                headers
                    .iter()
                    .zip(values)
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<ParsedFieldRow>(),
            )
        })
        .collect();

    VersionsDocument {
        seqn: parse_seqn(lines[1]),
        rows,
    }
}

/// `## seqn = 2241282` -> `Some(2241282)`
fn parse_seqn(line: &str) -> Option<u64> {
    let (key, value) = line.strip_prefix(SEQN_PREFIX)?.split_once('=')?;
    if key.trim() != "seqn" {
        return None;
    }
    value.trim().parse().ok()
}
