//! Source path parsing.
//!
//! A source path names the table chain and column(s) a feature property is
//! read from:
//!
//! ```text
//! parcel{sortKey=objid}/[id=parcel_id]parcel_2_tag/[tag_id=id]tag/label
//! ```
//!
//! Segments are separated by `/` outside of brackets and braces. Every
//! segment but the last is a table; the last one is a column list
//! (`a:b`) unless it carries a join condition or flags, or is the only
//! segment.

use crate::error::{Error, Result};
use featsql_proto::FilterExpr;
use serde::Serialize;

/// Table names containing this marker are junction tables.
pub const JUNCTION_MARKER: &str = "_2_";

/// Default sort key and primary key column.
pub const DEFAULT_KEY: &str = "id";

/// The `[local=target]` prefix of a table segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinCondition {
    /// Column on the preceding table.
    pub source_field: String,
    /// Column on this table.
    pub target_field: String,
}

/// Join flavor requested for a table segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

impl JoinType {
    /// SQL prefix placed before `JOIN`.
    pub fn as_sql_prefix(&self) -> &'static str {
        match self {
            JoinType::Inner => "",
            JoinType::Left => "LEFT ",
        }
    }
}

/// One table segment of a source path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSegment {
    /// Table name.
    pub name: String,
    /// Join condition to the preceding table.
    pub join: Option<JoinCondition>,
    /// `{sortKey=..}` override.
    pub sort_key: Option<String>,
    /// `{primaryKey=..}` override.
    pub primary_key: Option<String>,
    /// `{sortKeyUnique=false}` marks a sort key that needs row numbering.
    pub sort_key_unique: bool,
    /// `{joinType=LEFT}`.
    pub join_type: JoinType,
    /// `{filter=<json>}` row filter.
    pub filter: Option<FilterExpr>,
    /// The segment exactly as written.
    pub raw: String,
}

impl TableSegment {
    /// Check if this is a junction table.
    pub fn is_junction(&self) -> bool {
        self.name.contains(JUNCTION_MARKER)
    }

    /// Effective sort key.
    pub fn sort_key(&self) -> &str {
        self.sort_key.as_deref().unwrap_or(DEFAULT_KEY)
    }

    /// Effective primary key.
    pub fn primary_key(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_KEY)
    }

    /// Check if any flag differs from its default.
    pub fn has_flags(&self) -> bool {
        self.sort_key.is_some()
            || self.primary_key.is_some()
            || !self.sort_key_unique
            || self.join_type != JoinType::Inner
            || self.filter.is_some()
    }

    fn parse(path: &str, raw: &str) -> Result<Self> {
        let mut rest = raw;
        let mut join = None;

        if rest.starts_with('[') {
            let end = rest
                .find(']')
                .ok_or_else(|| Error::mapping(path, format!("unclosed join in '{}'", raw)))?;
            let condition = &rest[1..end];
            let (source, target) = condition.split_once('=').ok_or_else(|| {
                Error::mapping(path, format!("join '{}' is not of the form a=b", condition))
            })?;
            let (source, target) = (source.trim(), target.trim());
            if !is_identifier(source) || !is_identifier(target) {
                return Err(Error::mapping(
                    path,
                    format!("join '{}' is not of the form a=b", condition),
                ));
            }
            join = Some(JoinCondition {
                source_field: source.to_string(),
                target_field: target.to_string(),
            });
            rest = &rest[end + 1..];
        }

        let name_end = rest.find('{').unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !is_identifier(name) {
            return Err(Error::mapping(
                path,
                format!("invalid table name '{}'", name),
            ));
        }

        let mut segment = TableSegment {
            name: name.to_string(),
            join,
            sort_key: None,
            primary_key: None,
            sort_key_unique: true,
            join_type: JoinType::Inner,
            filter: None,
            raw: raw.to_string(),
        };

        let mut flags = &rest[name_end..];
        while !flags.is_empty() {
            let close = matching_brace(flags)
                .ok_or_else(|| Error::mapping(path, format!("unclosed flags in '{}'", raw)))?;
            segment.apply_flags(path, &flags[1..close])?;
            flags = &flags[close + 1..];
        }

        Ok(segment)
    }

    fn apply_flags(&mut self, path: &str, content: &str) -> Result<()> {
        if let Some(json) = content.strip_prefix("filter=") {
            let filter = featsql_proto::filter_from_json(json)
                .map_err(|e| Error::mapping(path, format!("invalid row filter: {}", e)))?;
            self.filter = Some(filter);
            return Ok(());
        }

        for flag in content.split(',') {
            let (key, value) = flag
                .split_once('=')
                .ok_or_else(|| Error::mapping(path, format!("invalid flag '{}'", flag)))?;
            let value = value.trim();
            match key.trim() {
                "sortKey" => self.sort_key = Some(value.to_string()),
                "primaryKey" => self.primary_key = Some(value.to_string()),
                "sortKeyUnique" => {
                    self.sort_key_unique = value.parse().map_err(|_| {
                        Error::mapping(path, format!("sortKeyUnique must be true or false, got '{}'", value))
                    })?
                }
                "joinType" => {
                    self.join_type = match value.to_ascii_uppercase().as_str() {
                        "INNER" => JoinType::Inner,
                        "LEFT" => JoinType::Left,
                        _ => {
                            return Err(Error::mapping(
                                path,
                                format!("unknown join type '{}'", value),
                            ))
                        }
                    }
                }
                other => {
                    return Err(Error::mapping(path, format!("unknown flag '{}'", other)));
                }
            }
        }
        Ok(())
    }
}

/// A parsed source path.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePath {
    /// The path as written, without a leading slash.
    pub raw: String,
    /// Table chain, root first.
    pub tables: Vec<TableSegment>,
    /// Column names of the final segment; empty for object paths.
    pub columns: Vec<String>,
}

impl SourcePath {
    /// Parse a source path.
    pub fn parse(text: &str) -> Result<Self> {
        let raw = text.trim().trim_start_matches('/');
        if raw.is_empty() {
            return Err(Error::mapping(text, "empty source path"));
        }

        let segments = split_segments(raw)?;
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::mapping(raw, "empty path segment"));
        }

        let (table_parts, column_part) = match segments.split_last() {
            Some((last, init))
                if !init.is_empty() && !last.starts_with('[') && !last.contains('{') =>
            {
                (init, Some(*last))
            }
            _ => (segments.as_slice(), None),
        };

        let tables = table_parts
            .iter()
            .map(|s| TableSegment::parse(raw, s))
            .collect::<Result<Vec<_>>>()?;

        let columns = match column_part {
            Some(part) => {
                let columns: Vec<String> = part.split(':').map(|c| c.trim().to_string()).collect();
                if let Some(bad) = columns.iter().find(|c| !is_identifier(c)) {
                    return Err(Error::mapping(raw, format!("invalid column name '{}'", bad)));
                }
                columns
            }
            None => vec![],
        };

        Ok(Self {
            raw: raw.to_string(),
            tables,
            columns,
        })
    }

    /// The root table segment.
    pub fn root(&self) -> &TableSegment {
        // parse() guarantees at least one table
        &self.tables[0]
    }

    /// Check if this path addresses a table rather than columns.
    pub fn is_object(&self) -> bool {
        self.columns.is_empty()
    }

    /// The table part of the path, segments joined by `/`.
    pub fn table_path(&self) -> String {
        self.tables
            .iter()
            .map(|t| t.raw.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Split on `/` outside brackets and braces.
fn split_segments(raw: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::mapping(raw, format!("unbalanced '{}'", c)));
                }
            }
            '/' if depth == 0 => {
                segments.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::mapping(raw, "unbalanced brackets"));
    }
    segments.push(&raw[start..]);
    Ok(segments)
}

/// Index of the brace closing the one at position 0.
fn matching_brace(text: &str) -> Option<usize> {
    if !text.starts_with('{') {
        return None;
    }
    let mut depth = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Check whether `prefix` is a segment-wise prefix of `path`.
///
/// `parcel/[id=id]owner` prefixes `parcel/[id=id]owner/name` but not
/// `parcel/[id=id]owner_2_x/...`.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_start_matches('/');
    let path = path.trim_start_matches('/');
    match (split_segments(prefix), split_segments(path)) {
        (Ok(p), Ok(s)) => p.len() <= s.len() && p.iter().zip(s.iter()).all(|(a, b)| a == b),
        _ => false,
    }
}
