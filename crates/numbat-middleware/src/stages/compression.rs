//! Gzip response compression.
//!
//! When the client sends `Accept-Encoding` containing `gzip`, the writer
//! stack gets a [`GzipResponseWriter`] layer. The layer buffers the first
//! `min_length` bytes of the body and then decides:
//!
//! - already-compressed content types (images, archives, audio, video,
//!   wasm) are passed through untouched
//! - anything else is gzip-encoded, `Content-Length` is removed and
//!   `Content-Encoding: gzip` is set
//!
//! Bodies that never reach `min_length` are sent uncompressed. Every
//! negotiated response carries `Vary: Accept-Encoding`.

use std::io::{self, Write};
use std::panic::AssertUnwindSafe;

use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::FutureExt;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue, StatusCode};
use numbat_config::GzipSection;
use numbat_core::{is_bodyless, BoxFuture, Context, ResponseWriter, Unwrapped};

use crate::{Middleware, Next};

const DEFAULT_MIN_LENGTH: usize = 256;

const SKIPPED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "video/",
    "audio/",
    "application/zip",
    "application/gzip",
    "application/x-gzip",
    "application/x-compressed",
    "application/x-bzip2",
    "application/x-xz",
    "application/zstd",
    "application/wasm",
];

/// Gzip compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Level 1.
    Fast,
    /// Level 6.
    #[default]
    Default,
    /// Level 9.
    Best,
    /// An explicit level from 0 to 9. Out-of-range values use the default.
    Custom(u32),
}

impl CompressionLevel {
    fn to_flate2(self) -> Compression {
        match self {
            Self::Fast => Compression::fast(),
            Self::Default => Compression::default(),
            Self::Best => Compression::best(),
            Self::Custom(level) if level <= 9 => Compression::new(level),
            Self::Custom(level) => {
                tracing::warn!(level, "invalid gzip level, using default");
                Compression::default()
            }
        }
    }
}

/// Settings for [`Gzip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipConfig {
    /// Compression level.
    pub level: CompressionLevel,
    /// Bodies shorter than this are sent uncompressed. Zero means 256.
    pub min_length: usize,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            level: CompressionLevel::Default,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        match level {
            1 => Self::Fast,
            6 => Self::Default,
            9 => Self::Best,
            other => Self::Custom(other),
        }
    }
}

impl From<&GzipSection> for GzipConfig {
    fn from(section: &GzipSection) -> Self {
        Self {
            level: CompressionLevel::from(section.level),
            min_length: section.min_length,
        }
    }
}

fn should_skip(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    SKIPPED_CONTENT_TYPES.iter().any(|skip| ct.starts_with(skip))
}

/// Gzip compression middleware.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: Compression,
    min_length: usize,
}

impl Gzip {
    /// Creates the middleware.
    #[must_use]
    pub fn new(config: GzipConfig) -> Self {
        Self {
            level: config.level.to_flate2(),
            min_length: if config.min_length == 0 {
                DEFAULT_MIN_LENGTH
            } else {
                config.min_length
            },
        }
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(GzipConfig::default())
    }
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"))
}

impl Middleware for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !accepts_gzip(ctx.headers()) {
                next.run(ctx).await;
                return;
            }

            ctx.response_headers_mut()
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));
            let (level, min_length) = (self.level, self.min_length);
            ctx.wrap_writer(|inner| Box::new(GzipResponseWriter::new(inner, level, min_length)));

            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            if let Err(err) = ctx.unwrap_writer() {
                tracing::warn!(error = %err, "failed to finish gzip stream");
            }
            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
        })
    }
}

/// A writer layer that gzip-encodes the body once it is long enough.
pub struct GzipResponseWriter {
    inner: Box<dyn ResponseWriter>,
    encoder: Option<GzEncoder<Vec<u8>>>,
    buf: Vec<u8>,
    level: Compression,
    min_length: usize,
    decided: bool,
    status: Option<StatusCode>,
    head_written: bool,
}

impl std::fmt::Debug for GzipResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipResponseWriter")
            .field("buffered", &self.buf.len())
            .field("decided", &self.decided)
            .field("compressing", &self.encoder.is_some())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl GzipResponseWriter {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Box<dyn ResponseWriter>, level: Compression, min_length: usize) -> Self {
        Self {
            inner,
            encoder: None,
            buf: Vec::new(),
            level,
            min_length,
            decided: false,
            status: None,
            head_written: false,
        }
    }

    /// True once the body is being gzip-encoded.
    pub fn is_compressing(&self) -> bool {
        self.encoder.is_some()
    }

    fn decide(&mut self) {
        self.decided = true;
        let headers = self.inner.headers();
        let skip = headers.contains_key(CONTENT_ENCODING)
            || headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(should_skip);
        if skip {
            return;
        }

        let headers = self.inner.headers_mut();
        headers.remove(CONTENT_LENGTH);
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        self.encoder = Some(GzEncoder::new(Vec::new(), self.level));
    }

    fn write_pending_head(&mut self) {
        if self.head_written {
            return;
        }
        if let Some(status) = self.status {
            self.inner.write_head(status);
            self.head_written = true;
        }
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        self.write_pending_head();
        if self.buf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.buf);
        match self.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(&buf)?;
                self.drain()
            }
            None => self.inner.write(&buf),
        }
    }

    /// Moves encoded bytes from the encoder into the wrapped writer.
    fn drain(&mut self) -> io::Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        let out = std::mem::take(encoder.get_mut());
        if out.is_empty() {
            return Ok(());
        }
        self.inner.write(&out)
    }
}

impl ResponseWriter for GzipResponseWriter {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        if is_bodyless(status) {
            self.decided = true;
            self.inner.write_head(status);
            self.head_written = true;
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.decided {
            self.buf.extend_from_slice(data);
            if self.buf.len() >= self.min_length {
                self.decide();
                return self.flush_buffer();
            }
            return Ok(());
        }
        match self.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(data)?;
                self.drain()
            }
            None => self.inner.write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.flush()?;
            self.drain()?;
        }
        self.inner.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.decided = true;
        self.write_pending_head();
        if !self.buf.is_empty() {
            let buf = std::mem::take(&mut self.buf);
            self.inner.write(&buf)?;
        }
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder.finish()?;
            if !tail.is_empty() {
                self.inner.write(&tail)?;
            }
        }
        Ok(())
    }

    fn into_inner(self: Box<Self>) -> Unwrapped {
        Unwrapped::Inner(self.inner)
    }
}
