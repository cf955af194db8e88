use std::sync::LazyLock;

use regex::Regex;

use super::fields::{FIELDS, FIELD_COUNT};
use super::LineParser;
use crate::error::ParseError;

// One named group per field, in log order, from the start of the line. Quoted fields may
// contain spaces; the user agent is the only one allowed to be empty.
static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let groups: Vec<String> = FIELDS
        .iter()
        .map(|field| {
            let body = match (field.quoted, field.name) {
                (true, "user_agent") => r#"".*""#,
                (true, _) => r#"".+""#,
                (false, _) => r"\S+",
            };
            format!("(?P<{}>{body})", field.name)
        })
        .collect();
    Regex::new(&format!("^{}", groups.join(" "))).unwrap()
});

/// Matches the whole line against a regular expression built from the field table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternParser;

impl LineParser for PatternParser {
    fn split<'a>(&self, line: &'a str) -> Result<Vec<&'a str>, ParseError> {
        let captures = LINE_REGEX
            .captures(line)
            .ok_or_else(|| ParseError::Grammar(line.to_owned()))?;

        captures
            .iter()
            .skip(1)
            .take(FIELD_COUNT)
            .map(|group| {
                group
                    .map(|m| m.as_str())
                    .ok_or_else(|| ParseError::Grammar(line.to_owned()))
            })
            .collect()
    }
}
