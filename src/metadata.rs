//! Project metadata stored in `recipe.piml`.
//!
//! The file is line oriented. Scalars are written as `(key) value`, lists as a
//! `(key)` header followed by indented `> item` lines:
//!
//! ```text
//! (name) demo
//! (version) 1.2.3
//! (tools)
//!     > cargo-nextest
//!     > cargo-deny
//! ```
//!
//! Lines starting with `#` are comments. Unknown keys are ignored and missing
//! keys keep their default, so older and newer files both load.

use std::fmt::Write;
use std::fs;

use camino::Utf8Path;

use crate::error::MetadataError;

/// Default metadata file name in the project root.
pub const FILE_NAME: &str = "recipe.piml";

/// Structured project facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub license: String,
    pub repository: String,
    pub homepage: String,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
    /// Installable developer tools, installed in this order.
    pub tools: Vec<String>,
}

/// Reads and parses a metadata file.
pub fn load(path: impl AsRef<Utf8Path>) -> Result<Metadata, MetadataError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| MetadataError::Io(path.to_owned(), e))?;

    parse(&text).map_err(|(line, message)| MetadataError::Parse {
        path: path.to_owned(),
        line,
        message,
    })
}

/// Serializes metadata and writes it to `path`, replacing the file.
///
/// The format has no escapes, so a value containing a line break is refused
/// before anything is written.
pub fn save(path: impl AsRef<Utf8Path>, metadata: &Metadata) -> Result<(), MetadataError> {
    let path = path.as_ref();

    if let Some(key) = multiline_key(metadata) {
        return Err(MetadataError::Multiline {
            path: path.to_owned(),
            key: key.to_string(),
        });
    }

    fs::write(path, render(metadata)).map_err(|e| MetadataError::Io(path.to_owned(), e))
}

fn has_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

fn multiline_key(metadata: &Metadata) -> Option<&'static str> {
    let scalars = [
        ("name", &metadata.name),
        ("version", &metadata.version),
        ("description", &metadata.description),
        ("license", &metadata.license),
        ("repository", &metadata.repository),
        ("homepage", &metadata.homepage),
    ];
    let lists = [
        ("authors", &metadata.authors),
        ("keywords", &metadata.keywords),
        ("tools", &metadata.tools),
    ];

    scalars
        .into_iter()
        .find(|(_, value)| has_break(value))
        .map(|(key, _)| key)
        .or_else(|| {
            lists
                .into_iter()
                .find(|(_, items)| items.iter().any(|item| has_break(item)))
                .map(|(key, _)| key)
        })
}

enum Field<'a> {
    Scalar(&'a mut String),
    List(&'a mut Vec<String>),
}

impl Metadata {
    fn field(&mut self, key: &str) -> Option<Field<'_>> {
        let field = match key {
            "name" => Field::Scalar(&mut self.name),
            "version" => Field::Scalar(&mut self.version),
            "description" => Field::Scalar(&mut self.description),
            "license" => Field::Scalar(&mut self.license),
            "repository" => Field::Scalar(&mut self.repository),
            "homepage" => Field::Scalar(&mut self.homepage),
            "authors" => Field::List(&mut self.authors),
            "keywords" => Field::List(&mut self.keywords),
            "tools" => Field::List(&mut self.tools),
            _ => return None,
        };

        Some(field)
    }
}

/// Parses metadata text. Errors carry the 1-based line number.
pub fn parse(text: &str) -> Result<Metadata, (usize, String)> {
    let mut metadata = Metadata::default();
    // Key of the list currently collecting `>` items, if any.
    let mut list: Option<String> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let number = index + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(item) = line.strip_prefix('>') {
            let key = list
                .as_deref()
                .ok_or_else(|| (number, "list item outside of a list".to_string()))?;

            if let Some(Field::List(items)) = metadata.field(key) {
                items.push(item.trim().to_string());
            }
            continue;
        }

        let rest = line
            .strip_prefix('(')
            .ok_or_else(|| (number, format!("expected `(key)`, found `{line}`")))?;
        let (key, value) = rest
            .split_once(')')
            .ok_or_else(|| (number, format!("unterminated key in `{line}`")))?;
        let key = key.trim();
        let value = value.trim();

        list = None;
        match metadata.field(key) {
            Some(Field::Scalar(slot)) => *slot = value.to_string(),
            Some(Field::List(items)) => {
                items.clear();
                if !value.is_empty() && value != "nil" {
                    return Err((number, format!("list `{key}` cannot have an inline value")));
                }
                list = Some(key.to_string());
            }
            None => {
                tracing::debug!(key, line = number, "ignoring unknown metadata key");
                // Swallow the items of an unknown list as well.
                if value.is_empty() {
                    list = Some(key.to_string());
                }
            }
        }
    }

    Ok(metadata)
}

/// Renders every populated field in a fixed order.
pub fn render(metadata: &Metadata) -> String {
    let mut out = String::new();

    let scalars = [
        ("name", &metadata.name),
        ("version", &metadata.version),
        ("description", &metadata.description),
        ("license", &metadata.license),
        ("repository", &metadata.repository),
        ("homepage", &metadata.homepage),
    ];

    for (key, value) in scalars {
        if !value.is_empty() {
            let _ = writeln!(out, "({key}) {value}");
        }
    }

    let lists = [
        ("authors", &metadata.authors),
        ("keywords", &metadata.keywords),
        ("tools", &metadata.tools),
    ];

    for (key, items) in lists {
        if !items.is_empty() {
            let _ = writeln!(out, "({key})");
            for item in items {
                let _ = writeln!(out, "    > {item}");
            }
        }
    }

    out
}
