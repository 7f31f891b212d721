//! Parser for the `/*--- ... ---*/` fixture metadata block.
//!
//! The block is a small YAML subset: `key: value`, `key: [a, b]`, block
//! lists, `|` / `>` block scalars and one level of nested mappings. It is
//! parsed as data and never handed to an engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const METADATA_OPEN: &str = "/*---";
pub const METADATA_CLOSE: &str = "---*/";

pub const FLAG_ONLY_STRICT: &str = "onlyStrict";
pub const FLAG_NO_STRICT: &str = "noStrict";
pub const FLAG_RAW: &str = "raw";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Scalar(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Sloppy,
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMetadata {
    pub description: Option<String>,
    pub esid: Option<String>,
    pub includes: Vec<String>,
    pub flags: BTreeSet<String>,
    pub features: Vec<String>,
    /// Keys without dedicated fields, kept as informational metadata.
    pub extra: BTreeMap<String, MetadataValue>,
}

impl FixtureMetadata {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_raw(&self) -> bool {
        self.has_flag(FLAG_RAW)
    }

    pub fn strictness(&self) -> Result<Strictness, MetadataError> {
        match (self.has_flag(FLAG_ONLY_STRICT), self.has_flag(FLAG_NO_STRICT)) {
            (true, true) => Err(MetadataError::new(
                0,
                format!("flags `{FLAG_ONLY_STRICT}` and `{FLAG_NO_STRICT}` are mutually exclusive"),
            )),
            (true, false) => Ok(Strictness::Strict),
            _ => Ok(Strictness::Sloppy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{}", line_prefix(.line), .detail)]
pub struct MetadataError {
    /// 1-based line in the fixture file; 0 when not tied to a line.
    pub line: usize,
    pub detail: String,
}

impl MetadataError {
    fn new(line: usize, detail: impl Into<String>) -> Self {
        Self {
            line,
            detail: detail.into(),
        }
    }
}

fn line_prefix(line: &usize) -> String {
    match *line {
        0 => String::new(),
        line => format!("line {line}: "),
    }
}

/// Parses the metadata block of `source`. A source without a block yields
/// empty metadata.
pub fn parse_fixture_metadata(source: &str) -> Result<FixtureMetadata, MetadataError> {
    let Some(open) = source.find(METADATA_OPEN) else {
        return Ok(FixtureMetadata::default());
    };
    let block_start = open + METADATA_OPEN.len();
    let close = source[block_start..].find(METADATA_CLOSE).ok_or_else(|| {
        MetadataError::new(
            line_of(source, open),
            format!("metadata block opened with `{METADATA_OPEN}` is never closed"),
        )
    })?;

    let block = &source[block_start..block_start + close];
    let first_line = line_of(source, block_start);
    let entries = parse_block(block, first_line)?;
    interpret(entries)
}

fn line_of(source: &str, byte_offset: usize) -> usize {
    source[..byte_offset].matches('\n').count() + 1
}

fn parse_block(
    block: &str,
    first_line: usize,
) -> Result<Vec<(usize, String, MetadataValue)>, MetadataError> {
    let lines: Vec<(usize, &str)> = block
        .split('\n')
        .enumerate()
        .map(|(idx, line)| (first_line + idx, line.trim_end_matches('\r')))
        .collect();

    let mut entries: Vec<(usize, String, MetadataValue)> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut idx = 0usize;

    while idx < lines.len() {
        let (line_no, raw) = lines[idx];
        idx += 1;

        if is_skippable(raw) {
            continue;
        }
        if raw.starts_with([' ', '\t']) {
            return Err(MetadataError::new(
                line_no,
                "indented line does not belong to any key",
            ));
        }

        let (key, rest) = split_key(line_no, raw)?;
        if !seen.insert(key.clone()) {
            return Err(MetadataError::new(
                line_no,
                format!("duplicate metadata key `{key}`"),
            ));
        }

        let value = if rest.is_empty() {
            let (value, consumed) = parse_nested(&lines[idx..])?;
            idx += consumed;
            value
        } else if is_block_scalar_indicator(rest) {
            let (text, consumed) = collect_block_scalar(&lines[idx..], rest.starts_with('>'));
            idx += consumed;
            MetadataValue::Scalar(text)
        } else if rest.starts_with('[') {
            MetadataValue::List(parse_flow_list(line_no, rest)?)
        } else {
            MetadataValue::Scalar(unquote(rest))
        };

        entries.push((line_no, key, value));
    }

    Ok(entries)
}

fn is_skippable(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn split_key(line_no: usize, raw: &str) -> Result<(String, &str), MetadataError> {
    let (key, rest) = raw.split_once(':').ok_or_else(|| {
        MetadataError::new(line_no, format!("expected `key: value`, found `{}`", raw.trim()))
    })?;
    let key = key.trim();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MetadataError::new(
            line_no,
            format!("invalid metadata key `{key}`"),
        ));
    }
    Ok((key.to_string(), rest.trim()))
}

fn is_block_scalar_indicator(rest: &str) -> bool {
    matches!(rest, "|" | "|-" | "|+" | ">" | ">-" | ">+")
}

/// Value of a `key:` line with nothing after the colon: a block list, a
/// nested mapping, or an empty scalar. Returns the value and the number of
/// lines consumed.
fn parse_nested(lines: &[(usize, &str)]) -> Result<(MetadataValue, usize), MetadataError> {
    let mut consumed = 0usize;
    let mut items = Vec::new();
    let mut map = BTreeMap::new();

    while consumed < lines.len() {
        let (line_no, raw) = lines[consumed];
        if is_skippable(raw) {
            consumed += 1;
            continue;
        }
        if !raw.starts_with([' ', '\t']) && !raw.starts_with('-') {
            break;
        }
        let trimmed = raw.trim();
        if let Some(item) = trimmed.strip_prefix('-') {
            if !map.is_empty() {
                return Err(MetadataError::new(
                    line_no,
                    "list item mixed into a nested mapping",
                ));
            }
            items.push(unquote(item.trim()));
        } else {
            if !items.is_empty() {
                return Err(MetadataError::new(
                    line_no,
                    "mapping entry mixed into a list",
                ));
            }
            let (key, value) = split_key(line_no, trimmed)?;
            if map.insert(key.clone(), unquote(value)).is_some() {
                return Err(MetadataError::new(
                    line_no,
                    format!("duplicate nested key `{key}`"),
                ));
            }
        }
        consumed += 1;
    }

    let value = if !items.is_empty() {
        MetadataValue::List(items)
    } else if !map.is_empty() {
        MetadataValue::Map(map)
    } else {
        MetadataValue::Scalar(String::new())
    };
    Ok((value, consumed))
}

fn collect_block_scalar(lines: &[(usize, &str)], folded: bool) -> (String, usize) {
    let mut consumed = 0usize;
    let mut body: Vec<&str> = Vec::new();

    while consumed < lines.len() {
        let (_, raw) = lines[consumed];
        if !raw.trim().is_empty() && !raw.starts_with([' ', '\t']) {
            break;
        }
        body.push(raw);
        consumed += 1;
    }

    while body.last().is_some_and(|line| line.trim().is_empty()) {
        body.pop();
    }

    let indent = body
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let dedented: Vec<&str> = body
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect();

    let text = if folded {
        dedented
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        dedented.join("\n")
    };
    (text, consumed)
}

fn parse_flow_list(line_no: usize, rest: &str) -> Result<Vec<String>, MetadataError> {
    let inner = rest
        .strip_prefix('[')
        .and_then(|value| value.strip_suffix(']'))
        .ok_or_else(|| MetadataError::new(line_no, format!("unterminated list `{rest}`")))?;
    Ok(inner
        .split(',')
        .map(|item| unquote(item.trim()))
        .filter(|item| !item.is_empty())
        .collect())
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

fn interpret(
    entries: Vec<(usize, String, MetadataValue)>,
) -> Result<FixtureMetadata, MetadataError> {
    let mut metadata = FixtureMetadata::default();

    for (line_no, key, value) in entries {
        match key.as_str() {
            "description" => metadata.description = Some(expect_scalar(line_no, &key, value)?),
            "esid" => metadata.esid = Some(expect_scalar(line_no, &key, value)?),
            "includes" => metadata.includes = expect_list(line_no, &key, value)?,
            "features" => metadata.features = expect_list(line_no, &key, value)?,
            "flags" => metadata.flags = expect_list(line_no, &key, value)?.into_iter().collect(),
            _ => {
                metadata.extra.insert(key, value);
            }
        }
    }

    metadata.strictness()?;
    Ok(metadata)
}

fn expect_scalar(line_no: usize, key: &str, value: MetadataValue) -> Result<String, MetadataError> {
    match value {
        MetadataValue::Scalar(text) => Ok(text),
        _ => Err(MetadataError::new(
            line_no,
            format!("`{key}` must be a scalar"),
        )),
    }
}

fn expect_list(
    line_no: usize,
    key: &str,
    value: MetadataValue,
) -> Result<Vec<String>, MetadataError> {
    match value {
        MetadataValue::List(items) => Ok(items),
        MetadataValue::Scalar(text) if text.is_empty() => Ok(Vec::new()),
        MetadataValue::Scalar(text) => Ok(vec![text]),
        MetadataValue::Map(_) => Err(MetadataError::new(
            line_no,
            format!("`{key}` must be a list"),
        )),
    }
}
