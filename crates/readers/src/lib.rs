//! Source resolution and format readers for FSQ.
//!
//! Architecture role:
//! - resolves locator strings (path/URL + `#format[:selector]` fragment)
//!   to concrete readers, with content sniffing as the fallback
//! - implements the reader pushdown contract (required columns, simple
//!   filters, row caps, partition filters) per format
//! - provides the byte-source layer for local, HTTP(S), and S3 bytes
//!
//! Key modules:
//! - [`locator`] / [`registry`]
//! - [`reader`] (the contract)
//! - [`fetch`] (byte source)
//! - format readers: [`csv`], [`parquet`], [`json`], [`html`],
//!   [`markdown`], [`xml`]

pub mod csv;
pub mod fetch;
pub mod html;
pub mod json;
pub mod locator;
pub mod markdown;
pub mod parquet;
pub mod reader;
pub mod registry;
pub mod table;
pub mod xml;

pub use fetch::ByteSource;
pub use locator::{resolve, sniff_format, Format, ResolvedLocator, Scheme, Selector};
pub use reader::{Reader, ReaderContext, RowsIter};
pub use registry::open_reader;
