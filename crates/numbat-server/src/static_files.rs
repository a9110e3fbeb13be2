//! Static file serving.
//!
//! [`StaticFiles`] serves a directory tree through the dispatcher, either
//! mounted under a prefix with [`Router::serve_files`](crate::Router::serve_files)
//! or one file at a time with [`Router::file`](crate::Router::file). It
//! handles:
//!
//! - index file fallback for directories (`index.html` by default)
//! - `ETag` / `If-None-Match` and `Last-Modified` / `If-Modified-Since`
//! - single byte ranges (`Range: bytes=...`)
//! - precompressed `.gz` siblings when the client accepts gzip
//! - MIME type detection by extension
//!
//! Requests containing `..`, hidden segments (unless enabled) or resolving
//! outside the root are refused with 403. Directories are never listed.
//!
//! ```rust
//! use numbat_server::StaticFiles;
//!
//! let files = StaticFiles::new("./public")
//!     .cache_control("max-age=3600")
//!     .precompressed_gzip(true);
//! assert_eq!(files.index_file(), Some("index.html"));
//! ```

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use http::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_RANGE, ETAG,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RANGE, VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use numbat_core::{BoxFuture, Context, ErrorResponse, Handler};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Errors raised while resolving or reading a static file.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// No file at the requested path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is refused (traversal, hidden file, symlink, outside root).
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Only GET and HEAD are served.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// I/O error while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `Range` header cannot be satisfied.
    #[error("invalid range: {reason}")]
    InvalidRange {
        /// Why the range was rejected.
        reason: String,
        /// Size of the file the range was applied to.
        size: u64,
    },
}

impl StaticFileError {
    /// The HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    fn write_to(&self, ctx: &mut Context) {
        let status = self.status_code();
        match self {
            Self::Io(err) => tracing::error!(error = %err, path = ctx.path(), "static file read failed"),
            Self::InvalidRange { size, .. } => {
                ctx.set_header(CONTENT_RANGE.as_str(), &format!("bytes */{size}"));
            }
            _ => tracing::debug!(error = %self, path = ctx.path(), "static file refused"),
        }
        let message = status.canonical_reason().unwrap_or("error").to_ascii_lowercase();
        ctx.json(status, &ErrorResponse::new(message));
    }
}

/// Serves files below a root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: Option<String>,
    cache_control: Option<String>,
    etag: bool,
    last_modified: bool,
    precompressed_gzip: bool,
    serve_hidden: bool,
    follow_symlinks: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Serves files under `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_file: Some("index.html".to_string()),
            cache_control: None,
            etag: true,
            last_modified: true,
            precompressed_gzip: false,
            serve_hidden: false,
            follow_symlinks: true,
            mime_types: HashMap::new(),
        }
    }

    /// Sets the file served for directory requests.
    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Disables index file fallback; directory requests become 404.
    #[must_use]
    pub fn no_index(mut self) -> Self {
        self.index_file = None;
        self
    }

    /// Sets a `Cache-Control` value for every served file.
    #[must_use]
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Enables or disables `ETag` validation.
    #[must_use]
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag = enabled;
        self
    }

    /// Enables or disables `Last-Modified` validation.
    #[must_use]
    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified = enabled;
        self
    }

    /// Serves `name.gz` in place of `name` to clients accepting gzip.
    #[must_use]
    pub fn precompressed_gzip(mut self, enabled: bool) -> Self {
        self.precompressed_gzip = enabled;
        self
    }

    /// Allows path segments starting with `.`.
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Whether symlinks inside the root are followed. Targets must still
    /// resolve inside the root.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.follow_symlinks = enabled;
        self
    }

    /// Maps a file extension (without the dot) to a content type.
    #[must_use]
    pub fn mime_type(mut self, extension: impl Into<String>, mime: impl Into<String>) -> Self {
        self.mime_types
            .insert(extension.into().to_ascii_lowercase(), mime.into());
        self
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The index file name, if directory fallback is enabled.
    #[must_use]
    pub fn index_file(&self) -> Option<&str> {
        self.index_file.as_deref()
    }

    /// Serves `request_path`, relative to the root, into `ctx`.
    ///
    /// Failures are answered with their status and an [`ErrorResponse`].
    pub async fn serve(&self, ctx: &mut Context, request_path: &str) {
        if let Err(err) = self.try_serve(ctx, request_path).await {
            err.write_to(ctx);
        }
    }

    /// Like [`serve`](Self::serve) but returns the failure instead of
    /// answering it.
    pub async fn try_serve(
        &self,
        ctx: &mut Context,
        request_path: &str,
    ) -> Result<(), StaticFileError> {
        check_method(ctx.method())?;
        let mut path = self.resolve(request_path).await?;

        if tokio::fs::metadata(&path).await?.is_dir() {
            let index = self
                .index_file
                .as_ref()
                .map(|index| path.join(index))
                .ok_or_else(|| StaticFileError::NotFound(request_path.to_string()))?;
            match tokio::fs::metadata(&index).await {
                Ok(meta) if meta.is_file() => path = index,
                _ => return Err(StaticFileError::NotFound(request_path.to_string())),
            }
        }

        self.send_file(ctx, &path).await
    }

    /// Serves the file at `path` as is, without root confinement.
    pub(crate) async fn serve_path(&self, ctx: &mut Context, path: &Path) {
        let result = match check_method(ctx.method()) {
            Ok(()) => self.send_file(ctx, path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            let err = match err {
                StaticFileError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    StaticFileError::NotFound(path.display().to_string())
                }
                other => other,
            };
            err.write_to(ctx);
        }
    }

    async fn resolve(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');
        if relative.contains('\\') || relative.contains('\0') {
            return Err(StaticFileError::Forbidden(request_path.to_string()));
        }

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(name) => {
                    let hidden = name.to_str().map_or(true, |n| n.starts_with('.'));
                    if hidden && !self.serve_hidden {
                        return Err(StaticFileError::Forbidden(request_path.to_string()));
                    }
                }
                Component::CurDir => {}
                _ => return Err(StaticFileError::Forbidden(request_path.to_string())),
            }
        }

        let full = self.root.join(relative);
        let link = tokio::fs::symlink_metadata(&full)
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        if link.file_type().is_symlink() && !self.follow_symlinks {
            return Err(StaticFileError::Forbidden(request_path.to_string()));
        }

        let canonical = tokio::fs::canonicalize(&full)
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        let root = tokio::fs::canonicalize(&self.root).await?;
        if !canonical.starts_with(&root) {
            return Err(StaticFileError::Forbidden(request_path.to_string()));
        }
        Ok(canonical)
    }

    async fn send_file(&self, ctx: &mut Context, path: &Path) -> Result<(), StaticFileError> {
        let (actual, encoding) = self.pick_variant(path, ctx.headers()).await;
        let meta = tokio::fs::metadata(&actual).await?;
        if !meta.is_file() {
            return Err(StaticFileError::NotFound(path.display().to_string()));
        }
        let size = meta.len();
        let modified = meta.modified().ok();
        let etag = if self.etag {
            modified.and_then(|m| make_etag(m, size))
        } else {
            None
        };

        if self.precompressed_gzip {
            ctx.response_headers_mut()
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));
        }
        if let Some(cc) = &self.cache_control {
            ctx.set_header(CACHE_CONTROL.as_str(), cc);
        }
        if let Some(tag) = &etag {
            ctx.set_header(ETAG.as_str(), tag);
        }
        if self.last_modified {
            if let Some(m) = modified {
                ctx.set_header(LAST_MODIFIED.as_str(), &httpdate::fmt_http_date(m));
            }
        }

        if self.not_modified(ctx.headers(), etag.as_deref(), modified) {
            ctx.status(StatusCode::NOT_MODIFIED);
            return Ok(());
        }

        let mime = self.detect_mime_type(path);
        ctx.set_header(ACCEPT_RANGES.as_str(), "bytes");
        if let Some(enc) = encoding {
            ctx.set_header(CONTENT_ENCODING.as_str(), enc);
        }

        match parse_range(ctx.headers(), size)? {
            Some((start, end)) => {
                let body = read_range(&actual, start, end).await?;
                ctx.set_header(CONTENT_RANGE.as_str(), &format!("bytes {start}-{end}/{size}"));
                ctx.bytes(StatusCode::PARTIAL_CONTENT, &body, Some(&mime));
            }
            None => {
                let body = tokio::fs::read(&actual).await?;
                ctx.bytes(StatusCode::OK, &body, Some(&mime));
            }
        }
        Ok(())
    }

    async fn pick_variant(&self, path: &Path, headers: &HeaderMap) -> (PathBuf, Option<&'static str>) {
        if self.precompressed_gzip && accepts_gzip(headers) {
            let mut name = path.as_os_str().to_owned();
            name.push(".gz");
            let gz = PathBuf::from(name);
            if tokio::fs::metadata(&gz).await.is_ok_and(|m| m.is_file()) {
                return (gz, Some("gzip"));
            }
        }
        (path.to_path_buf(), None)
    }

    fn not_modified(&self, headers: &HeaderMap, etag: Option<&str>, modified: Option<SystemTime>) -> bool {
        if let Some(inm) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
            return etag.is_some_and(|tag| etag_matches(inm, tag));
        }
        if !self.last_modified {
            return false;
        }
        let since = headers
            .get(IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok());
        match (modified, since) {
            (Some(modified), Some(since)) => unix_secs(modified) <= unix_secs(since),
            _ => false,
        }
    }

    fn detect_mime_type(&self, path: &Path) -> String {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if let Some(custom) = self.mime_types.get(&ext) {
            return custom.clone();
        }
        mime_for_extension(&ext).to_string()
    }
}

/// Serves one fixed file, registered by [`Router::file`](crate::Router::file).
pub(crate) struct FileHandler {
    files: StaticFiles,
    path: PathBuf,
}

impl FileHandler {
    pub(crate) fn new(path: PathBuf) -> Self {
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            files: StaticFiles::new(root),
            path,
        }
    }
}

impl Handler for FileHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(self.files.serve_path(ctx, &self.path))
    }
}

fn check_method(method: &Method) -> Result<(), StaticFileError> {
    if *method == Method::GET || *method == Method::HEAD {
        Ok(())
    } else {
        Err(StaticFileError::MethodNotAllowed)
    }
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim();
            let refused = parts.any(|p| matches!(p.trim(), "q=0" | "q=0.0" | "q=0.00" | "q=0.000"));
            coding.eq_ignore_ascii_case("gzip") && !refused
        })
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

fn make_etag(modified: SystemTime, size: u64) -> Option<String> {
    let since = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("\"{:x}-{:x}\"", since.as_secs(), size))
}

// Weak comparison, as If-None-Match requires.
fn etag_matches(header: &str, etag: &str) -> bool {
    let bare = etag.trim_start_matches("W/");
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == bare
    })
}

fn parse_range(headers: &HeaderMap, size: u64) -> Result<Option<(u64, u64)>, StaticFileError> {
    let Some(value) = headers.get(RANGE) else {
        return Ok(None);
    };
    let invalid = |reason: &str| StaticFileError::InvalidRange {
        reason: reason.to_string(),
        size,
    };

    let spec = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("bytes="))
        .ok_or_else(|| invalid("only byte ranges are supported"))?;
    // Multiple ranges and empty files are answered with the full body.
    if spec.contains(',') || size == 0 {
        return Ok(None);
    }
    let (first, last) = spec
        .trim()
        .split_once('-')
        .ok_or_else(|| invalid("missing '-'"))?;

    let (start, end) = if first.is_empty() {
        let suffix: u64 = last.parse().map_err(|_| invalid("bad suffix length"))?;
        if suffix == 0 {
            return Err(invalid("empty suffix range"));
        }
        (size.saturating_sub(suffix), size - 1)
    } else {
        let start: u64 = first.parse().map_err(|_| invalid("bad range start"))?;
        let end = if last.is_empty() {
            size - 1
        } else {
            last.parse::<u64>().map_err(|_| invalid("bad range end"))?
        };
        (start, end)
    };

    if start > end || start >= size {
        return Err(invalid("range not satisfiable"));
    }
    Ok(Some((start, end.min(size - 1))))
}

async fn read_range(path: &Path, start: u64, end: u64) -> Result<Vec<u8>, StaticFileError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let len = usize::try_from(end - start + 1).map_err(|_| StaticFileError::InvalidRange {
        reason: "range too large".to_string(),
        size: end + 1,
    })?;
    let mut buf = vec![0; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        "webmanifest" => "application/manifest+json",
        _ => "application/octet-stream",
    }
}
