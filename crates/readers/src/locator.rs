//! Source locator parsing: scheme, path, and the optional
//! `#format[:selector]` fragment, plus content sniffing for sources
//! neither the fragment nor the extension can classify.

use fsq_common::{FsqError, Result};

/// Where the bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Local filesystem path.
    File,
    /// HTTP or HTTPS URL.
    Http,
    /// S3-compatible object store.
    S3,
}

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Parquet,
    Json,
    Jsonl,
    Html,
    Markdown,
    Xml,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Parquet => "parquet",
            Format::Json => "json",
            Format::Jsonl => "jsonl",
            Format::Html => "html",
            Format::Markdown => "markdown",
            Format::Xml => "xml",
        }
    }
}

/// Fragment selector, interpreted per format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Table index for HTML/Markdown; negative counts from the end.
    Index(i64),
    /// Dotted path with optional `[i]`/`[]` for JSON documents.
    Path(String),
    /// Repeating element name for XML.
    Element(String),
}

/// A locator split into scheme, fragment-free path, and fragment parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocator {
    pub scheme: Scheme,
    /// Path or URL without the fragment.
    pub path: String,
    /// Format, from the fragment or the extension; `None` until sniffed.
    pub format: Option<Format>,
    pub selector: Option<Selector>,
}

/// Static `extension → format` table.
pub const EXTENSION_TABLE: &[(&str, Format)] = &[
    ("csv", Format::Csv),
    ("parquet", Format::Parquet),
    ("json", Format::Json),
    ("jsonl", Format::Jsonl),
    ("ndjson", Format::Jsonl),
    ("html", Format::Html),
    ("htm", Format::Html),
    ("md", Format::Markdown),
    ("markdown", Format::Markdown),
    ("xml", Format::Xml),
];

/// Static `fragment format → format` table.
pub const FRAGMENT_TABLE: &[(&str, Format)] = &[
    ("csv", Format::Csv),
    ("parquet", Format::Parquet),
    ("json", Format::Json),
    ("jsonl", Format::Jsonl),
    ("html", Format::Html),
    ("markdown", Format::Markdown),
    ("xml", Format::Xml),
];

/// Splits and normalizes a locator string.
///
/// Resolution order for the format: explicit fragment wins, else the
/// extension of the last path component, else `None` (the registry
/// sniffs the first bytes).
pub fn resolve(locator: &str) -> Result<ResolvedLocator> {
    let (path, fragment) = match locator.rsplit_once('#') {
        Some((p, f)) if !p.is_empty() => (p, Some(f)),
        _ => (locator, None),
    };

    let scheme = if path.starts_with("http://") || path.starts_with("https://") {
        Scheme::Http
    } else if path.starts_with("s3://") {
        Scheme::S3
    } else {
        Scheme::File
    };

    let (mut format, mut selector) = (None, None);
    if let Some(frag) = fragment {
        let (fmt, sel) = parse_fragment(locator, frag)?;
        format = fmt;
        selector = sel;
    }
    if format.is_none() {
        format = extension_format(path);
    }
    // A selector without an explicit format still needs one to interpret
    // it against; extension or sniffing will supply it.
    if let (Some(f), Some(sel)) = (format, selector.clone()) {
        selector = Some(normalize_selector(locator, f, sel)?);
    }

    Ok(ResolvedLocator {
        scheme,
        path: path.to_string(),
        format,
        selector,
    })
}

fn parse_fragment(locator: &str, frag: &str) -> Result<(Option<Format>, Option<Selector>)> {
    if frag.is_empty() {
        return Ok((None, None));
    }
    let (fmt_part, sel_part) = match frag.split_once(':') {
        Some((f, s)) => (f.trim(), Some(s)),
        None => (frag.trim(), None),
    };
    let format = if fmt_part.is_empty() {
        None
    } else {
        Some(
            FRAGMENT_TABLE
                .iter()
                .find(|(name, _)| *name == fmt_part)
                .map(|(_, f)| *f)
                .ok_or_else(|| {
                    FsqError::UnknownFormat(format!(
                        "'{locator}': unknown fragment format '{fmt_part}'"
                    ))
                })?,
        )
    };
    let selector = match sel_part {
        None => None,
        Some(s) if s.trim().is_empty() => {
            return Err(FsqError::UnknownFormat(format!(
                "'{locator}': empty selector after ':'"
            )))
        }
        Some(s) => Some(Selector::Path(s.trim().to_string())),
    };
    Ok((format, selector))
}

/// Re-types the raw selector once the format is known.
pub fn normalize_selector(locator: &str, format: Format, sel: Selector) -> Result<Selector> {
    let raw = match &sel {
        Selector::Path(s) => s.clone(),
        Selector::Index(i) => i.to_string(),
        Selector::Element(e) => e.clone(),
    };
    match format {
        Format::Html | Format::Markdown => raw
            .parse::<i64>()
            .map(Selector::Index)
            .map_err(|_| {
                FsqError::UnknownFormat(format!(
                    "'{locator}': {} selector must be a table index, got '{raw}'",
                    format.as_str()
                ))
            }),
        Format::Xml => Ok(Selector::Element(raw)),
        Format::Json => Ok(Selector::Path(raw)),
        Format::Csv | Format::Parquet | Format::Jsonl => Err(FsqError::UnknownFormat(format!(
            "'{locator}': {} sources take no selector",
            format.as_str()
        ))),
    }
}

fn extension_format(path: &str) -> Option<Format> {
    let last = path.rsplit(['/', '\\']).next()?;
    let ext = last.rsplit_once('.')?.1.to_ascii_lowercase();
    EXTENSION_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, f)| *f)
}

/// Classifies content from (up to) the first 4 KiB of a source.
pub fn sniff_format(head: &[u8]) -> Format {
    if head.starts_with(b"PAR1") {
        return Format::Parquet;
    }
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") || lower.contains("<table")
    {
        return Format::Html;
    }
    if text.lines().any(is_markdown_separator_row) {
        return Format::Markdown;
    }
    if trimmed.starts_with('<') {
        return Format::Xml;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        // Two self-contained object lines read as JSONL.
        let mut lines = trimmed.lines().filter(|l| !l.trim().is_empty());
        let first_ok = lines
            .next()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).is_ok())
            .unwrap_or(false);
        let second_ok = lines
            .next()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).is_ok())
            .unwrap_or(false);
        if first_ok && second_ok {
            return Format::Jsonl;
        }
        return Format::Json;
    }
    Format::Csv
}

/// A `|---|---|` style row: pipes, dashes, colons, and spaces with at
/// least one dash.
fn is_markdown_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_wins_over_extension() {
        let r = resolve("data.csv#json:items").unwrap();
        assert_eq!(r.format, Some(Format::Json));
        assert_eq!(r.selector, Some(Selector::Path("items".into())));
    }

    #[test]
    fn extension_classifies_when_no_fragment() {
        assert_eq!(resolve("dir/data.parquet").unwrap().format, Some(Format::Parquet));
        assert_eq!(resolve("x.md").unwrap().format, Some(Format::Markdown));
        assert_eq!(resolve("noext").unwrap().format, None);
    }

    #[test]
    fn schemes_are_recognized() {
        assert_eq!(resolve("https://x.test/d.csv").unwrap().scheme, Scheme::Http);
        assert_eq!(resolve("s3://bucket/key.parquet").unwrap().scheme, Scheme::S3);
        assert_eq!(resolve("/tmp/d.csv").unwrap().scheme, Scheme::File);
    }

    #[test]
    fn html_selector_accepts_negative_indices() {
        let r = resolve("page.html#html:-1").unwrap();
        assert_eq!(r.selector, Some(Selector::Index(-1)));
    }

    #[test]
    fn json_path_selector_passes_through() {
        let r = resolve("api.json#json:data.users").unwrap();
        assert_eq!(r.selector, Some(Selector::Path("data.users".into())));
    }

    #[test]
    fn xml_selector_is_an_element_name() {
        let r = resolve("feed.xml#xml:record").unwrap();
        assert_eq!(r.selector, Some(Selector::Element("record".into())));
    }

    #[test]
    fn unknown_fragment_format_fails() {
        let err = resolve("data#avro").unwrap_err();
        assert!(matches!(err, FsqError::UnknownFormat(_)), "{err}");
    }

    #[test]
    fn selector_on_selector_free_format_fails() {
        assert!(resolve("a.csv#csv:1").is_err());
    }

    #[test]
    fn sniffing_order() {
        assert_eq!(sniff_format(b"PAR1...."), Format::Parquet);
        assert_eq!(sniff_format(b"<html><body>"), Format::Html);
        assert_eq!(sniff_format(b"| a | b |\n|---|---|\n| 1 | 2 |"), Format::Markdown);
        assert_eq!(sniff_format(b"<data><r/></data>"), Format::Xml);
        assert_eq!(sniff_format(b"[{\"a\":1}]"), Format::Json);
        assert_eq!(sniff_format(b"{\"a\":1}\n{\"a\":2}\n"), Format::Jsonl);
        assert_eq!(sniff_format(b"a,b\n1,2\n"), Format::Csv);
    }
}
