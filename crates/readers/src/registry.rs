//! Binds resolved locators to concrete readers.
//!
//! Resolution order: explicit `#format` fragment, then the path
//! extension, then content sniffing over the first 4 KiB. Unknown
//! sources fail with [`FsqError::UnknownFormat`].

use fsq_common::{FetchSettings, FsqError, Result};
use tracing::debug;

use crate::csv::CsvReader;
use crate::fetch::ByteSource;
use crate::json::{JsonReader, JsonlReader};
use crate::locator::{normalize_selector, resolve, Format, ResolvedLocator, Selector};
use crate::parquet::ParquetReader;
use crate::reader::{Reader, ReaderContext};
use crate::{html, markdown, xml};

/// How many bytes sniffing inspects.
const SNIFF_BYTES: usize = 4096;

/// Resolves a locator and opens a reader for it.
///
/// The same locator opened twice yields two independent readers; opened
/// readers are never cached or shared.
pub fn open_reader(
    locator: &str,
    ctx: ReaderContext,
    fetch: FetchSettings,
) -> Result<Box<dyn Reader>> {
    let resolved = resolve(locator)?;
    let bytes = ByteSource::open(resolved.scheme, &resolved.path, fetch)?;

    let format = match resolved.format {
        Some(f) => f,
        // A local directory is a partitioned parquet dataset; anything
        // else gets classified by its first bytes.
        None if is_local_dir(&resolved) => Format::Parquet,
        None => {
            let head = bytes.fetch_prefix(SNIFF_BYTES)?;
            let sniffed = crate::locator::sniff_format(&head);
            debug!(locator, format = sniffed.as_str(), "sniffed source format");
            sniffed
        }
    };
    // A selector left untyped because the format came from sniffing.
    let selector = match resolved.selector.clone() {
        Some(sel) if resolved.format.is_none() => Some(normalize_selector(locator, format, sel)?),
        other => other,
    };

    build_reader(locator, &resolved, format, selector, bytes, ctx)
}

fn is_local_dir(resolved: &ResolvedLocator) -> bool {
    resolved.scheme == crate::locator::Scheme::File
        && std::path::Path::new(&resolved.path).is_dir()
}

fn build_reader(
    locator: &str,
    resolved: &ResolvedLocator,
    format: Format,
    selector: Option<Selector>,
    bytes: ByteSource,
    ctx: ReaderContext,
) -> Result<Box<dyn Reader>> {
    match format {
        Format::Csv => Ok(Box::new(CsvReader::open(bytes, ctx)?)),
        Format::Parquet => Ok(Box::new(ParquetReader::open(
            resolved.scheme,
            &resolved.path,
            bytes,
            ctx,
        )?)),
        Format::Json => {
            let path = match &selector {
                Some(Selector::Path(p)) => Some(p.as_str()),
                None => None,
                Some(other) => {
                    return Err(FsqError::UnknownFormat(format!(
                        "'{locator}': json selector must be a path, got {other:?}"
                    )))
                }
            };
            Ok(Box::new(JsonReader::open(bytes, path, ctx)?))
        }
        Format::Jsonl => Ok(Box::new(JsonlReader::open(bytes, ctx)?)),
        Format::Html => {
            let index = selector_index(locator, &selector)?;
            Ok(Box::new(html::open(bytes, index, ctx)?))
        }
        Format::Markdown => {
            let index = selector_index(locator, &selector)?;
            Ok(Box::new(markdown::open(bytes, index, ctx)?))
        }
        Format::Xml => {
            let element = match &selector {
                Some(Selector::Element(e)) => Some(e.as_str()),
                None => None,
                Some(other) => {
                    return Err(FsqError::UnknownFormat(format!(
                        "'{locator}': xml selector must be an element name, got {other:?}"
                    )))
                }
            };
            Ok(Box::new(xml::open(bytes, element, ctx)?))
        }
    }
}

fn selector_index(locator: &str, selector: &Option<Selector>) -> Result<i64> {
    match selector {
        None => Ok(0),
        Some(Selector::Index(i)) => Ok(*i),
        Some(other) => Err(FsqError::UnknownFormat(format!(
            "'{locator}': selector must be a table index, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsq_common::Row;
    use tempfile::TempDir;

    #[test]
    fn extension_dispatch_and_sniffing_fallback() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("d.csv");
        std::fs::write(&csv, "a\n1\n").unwrap();
        let mut reader = open_reader(
            csv.to_str().unwrap(),
            ReaderContext::default(),
            FetchSettings::default(),
        )
        .unwrap();
        assert_eq!(reader.schema().unwrap().names(), vec!["a"]);

        // No extension: the content decides.
        let noext = dir.path().join("mystery");
        std::fs::write(&noext, "{\"a\":1}\n{\"a\":2}\n").unwrap();
        let mut reader = open_reader(
            noext.to_str().unwrap(),
            ReaderContext::default(),
            FetchSettings::default(),
        )
        .unwrap();
        let rows: Vec<Row> = reader
            .schema()
            .map(|_| ())
            .and_then(|_| reader.rows())
            .unwrap()
            .collect::<fsq_common::Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn fragment_overrides_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, r#"{"rows":[{"x":1}]}"#).unwrap();
        let locator = format!("{}#json:rows", path.display());
        let mut reader =
            open_reader(&locator, ReaderContext::default(), FetchSettings::default()).unwrap();
        assert_eq!(reader.schema().unwrap().names(), vec!["x"]);
    }

    #[test]
    fn unknown_sources_fail_with_unknown_format() {
        let err = match open_reader(
            "data#avro",
            ReaderContext::default(),
            FetchSettings::default(),
        ) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, FsqError::UnknownFormat(_)), "{err}");
    }
}
