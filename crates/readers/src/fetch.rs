//! Byte-source layer: local files plus HTTP(S)/S3 objects fetched
//! through `object_store`, driven synchronously with retry/backoff.
//!
//! Readers consume this layer; it is not a reader itself.

use std::fs;
use std::io::Read;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use fsq_common::{FetchSettings, FsqError, Result};
use object_store::{parse_url_opts, ObjectStore};
use tracing::{debug, warn};
use url::Url;

use crate::locator::Scheme;

/// Bytes for one source: a local path or a remote object.
#[derive(Debug, Clone)]
pub enum ByteSource {
    /// Local filesystem file.
    Local(PathBuf),
    /// HTTP(S)/S3 object.
    Remote(Arc<RemoteObject>),
}

/// A remote object plus the store client and runtime that fetch it.
pub struct RemoteObject {
    url: String,
    store: Box<dyn ObjectStore>,
    path: object_store::path::Path,
    settings: FetchSettings,
    runtime: tokio::runtime::Runtime,
    len: OnceLock<u64>,
    /// Whole-object cache filled when a ranged get falls back.
    full: Mutex<Option<Bytes>>,
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject").field("url", &self.url).finish()
    }
}

impl ByteSource {
    /// Opens a byte source for a resolved scheme and path.
    ///
    /// S3 credentials come from the process environment; a missing key
    /// pair surfaces as [`FsqError::Auth`] before any request is made.
    pub fn open(scheme: Scheme, path: &str, settings: FetchSettings) -> Result<Self> {
        match scheme {
            Scheme::File => Ok(ByteSource::Local(PathBuf::from(path))),
            Scheme::Http | Scheme::S3 => {
                if scheme == Scheme::S3
                    && (std::env::var("AWS_ACCESS_KEY_ID").is_err()
                        || std::env::var("AWS_SECRET_ACCESS_KEY").is_err())
                {
                    return Err(FsqError::Auth(format!(
                        "S3 source '{path}' requires AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY in the environment"
                    )));
                }
                let url = Url::parse(path).map_err(|e| FsqError::io(path, e))?;
                let mut opts: Vec<(String, String)> = Vec::new();
                if let Some(t) = settings.timeout_secs {
                    opts.push(("timeout".into(), format!("{t} seconds")));
                }
                if let Some(t) = settings.connect_timeout_secs {
                    opts.push(("connect_timeout".into(), format!("{t} seconds")));
                }
                let (store, object_path) = parse_url_opts(&url, opts)
                    .map_err(|e| FsqError::io(path, format!("failed to build object store: {e}")))?;
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| FsqError::io(path, e))?;
                Ok(ByteSource::Remote(Arc::new(RemoteObject {
                    url: path.to_string(),
                    store,
                    path: object_path,
                    settings,
                    runtime,
                    len: OnceLock::new(),
                    full: Mutex::new(None),
                })))
            }
        }
    }

    /// Display form for errors and warnings.
    pub fn display(&self) -> String {
        match self {
            ByteSource::Local(p) => p.display().to_string(),
            ByteSource::Remote(r) => r.url.clone(),
        }
    }

    /// Total length in bytes.
    pub fn len(&self) -> Result<u64> {
        match self {
            ByteSource::Local(p) => Ok(fs::metadata(p).map_err(|e| FsqError::io(p.display().to_string(), e))?.len()),
            ByteSource::Remote(r) => r.len(),
        }
    }

    /// The whole object.
    pub fn fetch_all(&self) -> Result<Bytes> {
        match self {
            ByteSource::Local(p) => fs::read(p)
                .map(Bytes::from)
                .map_err(|e| FsqError::io(p.display().to_string(), e)),
            ByteSource::Remote(r) => r.fetch_all(),
        }
    }

    /// A byte range; falls back to a full download when the origin does
    /// not honor ranges.
    pub fn fetch_range(&self, range: Range<u64>) -> Result<Bytes> {
        match self {
            ByteSource::Local(p) => {
                let mut f = fs::File::open(p).map_err(|e| FsqError::io(p.display().to_string(), e))?;
                use std::io::Seek;
                f.seek(std::io::SeekFrom::Start(range.start))
                    .map_err(|e| FsqError::io(p.display().to_string(), e))?;
                let mut buf = vec![0u8; (range.end - range.start) as usize];
                f.read_exact(&mut buf)
                    .map_err(|e| FsqError::io(p.display().to_string(), e))?;
                Ok(Bytes::from(buf))
            }
            ByteSource::Remote(r) => r.fetch_range(range),
        }
    }

    /// Up to the first `n` bytes, for content sniffing.
    pub fn fetch_prefix(&self, n: usize) -> Result<Bytes> {
        match self {
            ByteSource::Local(p) => {
                let mut f = fs::File::open(p).map_err(|e| FsqError::io(p.display().to_string(), e))?;
                let mut buf = vec![0u8; n];
                let mut read = 0;
                while read < n {
                    match f.read(&mut buf[read..]) {
                        Ok(0) => break,
                        Ok(k) => read += k,
                        Err(e) => return Err(FsqError::io(p.display().to_string(), e)),
                    }
                }
                buf.truncate(read);
                Ok(Bytes::from(buf))
            }
            ByteSource::Remote(r) => {
                let len = r.len()?;
                let end = (n as u64).min(len);
                if end == 0 {
                    return Ok(Bytes::new());
                }
                r.fetch_range(0..end)
            }
        }
    }
}

impl RemoteObject {
    fn len(&self) -> Result<u64> {
        if let Some(l) = self.len.get() {
            return Ok(*l);
        }
        let head = self.with_retry("head", || {
            self.runtime.block_on(self.store.head(&self.path))
        })?;
        let _ = self.len.set(head.size as u64);
        Ok(head.size as u64)
    }

    fn fetch_all(&self) -> Result<Bytes> {
        if let Some(b) = self.full.lock().ok().and_then(|g| g.clone()) {
            return Ok(b);
        }
        let bytes = self.with_retry("get", || {
            self.runtime
                .block_on(async { self.store.get(&self.path).await?.bytes().await })
        })?;
        if let Ok(mut g) = self.full.lock() {
            *g = Some(bytes.clone());
        }
        Ok(bytes)
    }

    fn fetch_range(&self, range: Range<u64>) -> Result<Bytes> {
        if let Some(b) = self.full.lock().ok().and_then(|g| g.clone()) {
            return Ok(slice_range(&b, &range));
        }
        let r = range.start as usize..range.end as usize;
        match self.with_retry("get_range", || {
            self.runtime.block_on(self.store.get_range(&self.path, r.clone()))
        }) {
            Ok(b) => Ok(b),
            Err(e) => {
                // Origin without range support: download once, serve slices.
                warn!(url = %self.url, error = %e, "ranged get failed; falling back to full download");
                let all = self.fetch_all()?;
                Ok(slice_range(&all, &range))
            }
        }
    }

    fn with_retry<T>(
        &self,
        op: &str,
        mut attempt: impl FnMut() -> std::result::Result<T, object_store::Error>,
    ) -> Result<T> {
        let mut last_err = None;
        for n in 1..=self.settings.retry_attempts.max(1) {
            match attempt() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    debug!(url = %self.url, op, attempt = n, error = %e, "remote fetch attempt failed");
                    last_err = Some(e);
                    if n < self.settings.retry_attempts {
                        thread::sleep(Duration::from_millis(self.settings.retry_backoff_ms));
                    }
                }
            }
        }
        Err(FsqError::io(
            &self.url,
            format!(
                "{op} failed after {} attempts: {}",
                self.settings.retry_attempts.max(1),
                last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".into())
            ),
        ))
    }
}

fn slice_range(all: &Bytes, range: &Range<u64>) -> Bytes {
    let start = (range.start as usize).min(all.len());
    let end = (range.end as usize).min(all.len());
    all.slice(start..end)
}
