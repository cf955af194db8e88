//! Conversion of raw access log lines into records ready to ship.
//!
//! A line is first split into its [`FIELD_COUNT`] fields by one of two strategies, then handed
//! to [`format_fields`], which both strategies share. The strategies must agree on every line
//! they both accept.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{OutputFormat, ParserStrategy};
use crate::error::ParseError;

pub mod fields;
pub mod pattern;
pub mod quote;
pub mod scan;

pub use fields::{Field, FIELDS, FIELD_COUNT, TIME_FIELD};
pub use pattern::PatternParser;
pub use scan::ScanParser;

/// One shippable record: the entry timestamp and the formatted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

pub trait LineParser: Send + Sync {
    /// Splits `line` into exactly [`FIELD_COUNT`] raw field values, quotes included.
    fn split<'a>(&self, line: &'a str) -> Result<Vec<&'a str>, ParseError>;

    fn parse(&self, format: OutputFormat, line: &str) -> Result<ParsedLine, ParseError> {
        let values = self.split(line)?;
        format_fields(format, line, &values)
    }
}

pub fn parser_for(strategy: ParserStrategy) -> Arc<dyn LineParser> {
    match strategy {
        ParserStrategy::Scan => Arc::new(ScanParser),
        ParserStrategy::Pattern => Arc::new(PatternParser),
    }
}

/// Renders split field values in `format`, dropping the fields that are never shipped.
///
/// Quoted values are decoded and re-quoted so escapes come out in one canonical form. A value
/// that fails to decode is written as it was found, wrapped in a JSON string in JSON output.
pub fn format_fields(
    format: OutputFormat,
    line: &str,
    values: &[&str],
) -> Result<ParsedLine, ParseError> {
    if values.len() != FIELD_COUNT {
        return Err(ParseError::Grammar(line.to_owned()));
    }

    let timestamp = parse_timestamp(values[TIME_FIELD], line)?;
    if format == OutputFormat::Raw {
        return Ok(ParsedLine {
            timestamp,
            line: line.to_owned(),
        });
    }

    let json = format == OutputFormat::Json;
    let mut out = String::with_capacity(line.len() + 256);
    if json {
        out.push('{');
    }

    let mut first = true;
    for (field, value) in FIELDS.iter().zip(values) {
        if field.dropped {
            continue;
        }
        if !first {
            out.push(if json { ',' } else { ' ' });
        }
        first = false;

        let requoted = if field.quoted {
            quote::unquote(value).map(|decoded| quote::quote(&decoded))
        } else {
            None
        };
        let value = requoted.as_deref().unwrap_or(*value);

        if json {
            quote::push_quoted(&mut out, field.name);
            out.push(':');
            if requoted.is_some() || (field.numeric && is_json_number(value)) {
                out.push_str(value);
            } else {
                quote::push_quoted(&mut out, value);
            }
        } else {
            out.push_str(field.name);
            out.push('=');
            out.push_str(value);
        }
    }

    if json {
        out.push('}');
    }
    Ok(ParsedLine {
        timestamp,
        line: out,
    })
}

fn parse_timestamp(value: &str, line: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ParseError::InvalidTimestamp {
            value: value.to_owned(),
            reason: e.to_string(),
            line: line.to_owned(),
        })
}

// ALB writes `-` where a number is not available
fn is_json_number(value: &str) -> bool {
    serde_json::from_str::<serde_json::Number>(value).is_ok()
}
