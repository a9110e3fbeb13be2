//! Response writers.
//!
//! A request's response is produced through a stack of [`ResponseWriter`]s.
//! The bottom of the stack is always a [`ResponseBuffer`]; middleware such
//! as compression push wrappers on top and pop them when they are done.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;

/// A sink for one HTTP response: a status, headers and body bytes.
///
/// The first call to [`write_head`](ResponseWriter::write_head) fixes the
/// status; later calls are ignored. Writing body bytes before a status is
/// set implies `200 OK`.
pub trait ResponseWriter: Send + Sync {
    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers. Changes after the head is written have no
    /// effect on the status line but still reach the buffered response.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the status code.
    fn write_head(&mut self, status: StatusCode);

    /// Appends body bytes.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Pushes any buffered bytes toward the client.
    fn flush(&mut self) -> io::Result<()>;

    /// Completes this layer. Called once before the layer is popped.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Pops this layer, returning what sits beneath it.
    fn into_inner(self: Box<Self>) -> Unwrapped;
}

/// Result of popping a writer layer.
pub enum Unwrapped {
    /// The wrapped writer.
    Inner(Box<dyn ResponseWriter>),
    /// The bottom of the stack was reached.
    Base(ResponseBuffer),
}

/// The base writer that accumulates a complete response in memory.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    flushes: usize,
}

impl ResponseBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The status written so far, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body bytes written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of times the buffer was flushed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Converts the buffer into an HTTP response.
    ///
    /// `Content-Length` always reflects the real body length. With
    /// `head_only` the body bytes are dropped but the length is kept, so a
    /// HEAD response advertises what the GET would have sent.
    #[must_use]
    pub fn into_response(self, head_only: bool) -> Response<Full<Bytes>> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let mut headers = self.headers;

        if is_bodyless(status) {
            headers.remove(CONTENT_LENGTH);
        } else {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }

        let body = if head_only || is_bodyless(status) {
            Bytes::new()
        } else {
            self.body.freeze()
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Statuses that never carry a body.
#[must_use]
pub fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

impl ResponseWriter for ResponseBuffer {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn into_inner(self: Box<Self>) -> Unwrapped {
        Unwrapped::Base(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;

    #[test]
    fn test_first_status_wins() {
        let mut buf = ResponseBuffer::new();
        buf.write_head(StatusCode::CREATED);
        buf.write_head(StatusCode::NOT_FOUND);
        assert_eq!(buf.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn test_write_implies_ok() {
        let mut buf = ResponseBuffer::new();
        buf.write(b"hello").unwrap();
        buf.write_head(StatusCode::NOT_FOUND);
        assert_eq!(buf.status(), Some(StatusCode::OK));
        assert_eq!(buf.body(), b"hello");
    }

    #[test]
    fn test_flush_is_counted() {
        let mut buf = ResponseBuffer::new();
        buf.flush().unwrap();
        buf.flush().unwrap();
        assert_eq!(buf.flush_count(), 2);
    }

    #[tokio::test]
    async fn test_into_response_sets_length() {
        let mut buf = ResponseBuffer::new();
        buf.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        buf.write(b"abc").unwrap();

        let response = buf.into_response(false);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn test_into_response_head_keeps_length_drops_body() {
        let mut buf = ResponseBuffer::new();
        buf.write(b"abcdef").unwrap();

        let response = buf.into_response(true);
        assert_eq!(response.headers()[CONTENT_LENGTH], "6");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[test]
    fn test_into_response_no_content_has_no_length() {
        let mut buf = ResponseBuffer::new();
        buf.write_head(StatusCode::NO_CONTENT);
        let response = buf.into_response(false);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_default_status_is_ok() {
        let response = ResponseBuffer::new().into_response(false);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "0");
    }
}
