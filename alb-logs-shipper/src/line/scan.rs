use super::fields::{FIELDS, FIELD_COUNT};
use super::LineParser;
use crate::error::ParseError;

/// Splits the line on single spaces in one left to right pass.
///
/// A quoted field must open with a quote and only ends at a space preceded by a closing quote; a
/// quote preceded by a backslash is not a closing one. Anything after the last field is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanParser;

impl LineParser for ScanParser {
    fn split<'a>(&self, line: &'a str) -> Result<Vec<&'a str>, ParseError> {
        let bytes = line.as_bytes();
        let mut values = Vec::with_capacity(FIELD_COUNT);
        let mut start = 0;

        for field in FIELDS.iter() {
            // fields are separated by exactly one space and never empty
            if start >= bytes.len()
                || bytes[start] == b' '
                || (field.quoted && bytes[start] != b'"')
            {
                return Err(ParseError::Grammar(line.to_owned()));
            }
            let mut end = start + 1;
            while end < bytes.len() {
                if bytes[end] == b' ' && (!field.quoted || closes_quote(bytes, end)) {
                    break;
                }
                end += 1;
            }
            values.push(&line[start..end]);
            start = end + 1;
        }
        Ok(values)
    }
}

fn closes_quote(bytes: &[u8], space: usize) -> bool {
    bytes[space - 1] == b'"' && (space < 2 || bytes[space - 2] != b'\\')
}
