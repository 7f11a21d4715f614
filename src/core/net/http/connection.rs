use embassy_net::tcp::TcpSocket;
use embedded_io_async::Write as _;
use heapless::{String, Vec};
use log::debug;
use serde::Serialize;

use super::{
    Error,
    HttpResult,
    headers::{
        ContentHeaders,
        ContentType,
        HttpMethod,
        ResponseHeaders,
        TargetWriter as _,
        TextEncoding,
        find_content_length,
        find_header,
        parse_request_line,
        read_heading,
    },
};

const HEADER_BUFFER_SIZE: usize = 1024;
const BODY_BUFFER_SIZE: usize = 1024;
const STREAM_CHUNK_SIZE: usize = 1024;
const CONTENT_TYPE_MAX_LEN: usize = 128;
const RESPONSE_HEAD_SIZE: usize = 256;

/// A trait for reading the request body chunk by chunk.
pub(crate) trait AsyncChunkedReader {
    /// Declared body length, `None` when the body ends with the connection.
    fn content_length(&self) -> Option<u32>;

    /// Declared `Content-Type` of the body.
    fn content_type(&self) -> Option<&str>;

    /// Read the next body chunk and pass it to `op`.
    ///
    /// `op` receives an empty slice once the whole body was read. A peer
    /// closing before the declared length is [`Error::Closed`].
    fn read_and_then<R>(
        &mut self,
        op: impl FnOnce(&[u8]) -> R,
    ) -> impl Future<Output = Result<R, Error>>;
}

/// HTTP connection context
pub(crate) struct HttpConnection<'a> {
    pub(crate) method: HttpMethod,
    pub(crate) path: String<64>,

    socket: TcpSocket<'a>,
    content_type: Option<String<CONTENT_TYPE_MAX_LEN>>,
    content_length: Option<u32>,
    received: u32,
    finished: bool,
    header_end: usize,
    header_buf: Vec<u8, HEADER_BUFFER_SIZE>,
    body_buf: Vec<u8, BODY_BUFFER_SIZE>,
}

impl<'a> HttpConnection<'a> {
    /// Create a new HTTP connection from a socket.
    pub(crate) async fn from_socket(mut socket: TcpSocket<'a>) -> Result<Self, Error> {
        let mut header_buf = Vec::<u8, HEADER_BUFFER_SIZE>::new();
        let _ = header_buf.resize(HEADER_BUFFER_SIZE, 0);
        let (header_end, header_len) = read_heading(header_buf.as_mut_slice(), &mut socket).await?;
        let header_end = header_end.ok_or(Error::Parse)?;
        header_buf.truncate(header_len);

        // Only parse the headers portion, the rest may be binary body data
        let header_str =
            core::str::from_utf8(&header_buf[..header_end]).map_err(|_| Error::Parse)?;
        let (method, raw_path, rest_headers) =
            parse_request_line(header_str).ok_or(Error::Parse)?;

        let content_length = find_content_length(rest_headers);
        let content_type = match find_header(rest_headers, "content-type") {
            Some(value) => Some(String::try_from(value).map_err(|()| Error::Parse)?),
            None => None,
        };
        let mut path = String::new();
        path.push_str(raw_path).map_err(|()| Error::Parse)?;

        debug!("http: {:?} {}", method, path.as_str());
        Ok(Self {
            method,
            path,
            socket,
            content_type,
            content_length,
            received: 0,
            finished: false,
            header_end,
            header_buf,
            body_buf: Vec::new(),
        })
    }

    /// Write the headers to the connection
    pub(crate) async fn write_headers(&mut self, headers: &ResponseHeaders) -> HttpResult {
        let mut head = String::<RESPONSE_HEAD_SIZE>::new();
        headers.write_to(&mut head)?;
        self.socket.write_all(head.as_bytes()).await?;
        self.socket.flush().await?;
        Ok(())
    }

    /// Write the body to the connection
    pub(crate) async fn write_body(&mut self, body: &[u8]) -> HttpResult {
        for chunk in body.chunks(STREAM_CHUNK_SIZE) {
            self.socket.write_all(chunk).await?;
        }
        self.socket.flush().await?;
        Ok(())
    }

    /// Write a plain text response
    pub(crate) async fn write_text(&mut self, headers: ResponseHeaders, body: &str) -> HttpResult {
        let content = ContentHeaders::new(ContentType::TextPlain)
            .with_text_encoding(TextEncoding::Utf8)
            .with_length(body.len());
        self.write_headers(&headers.with_content(content)).await?;
        self.write_body(body.as_bytes()).await
    }

    /// Write JSON to the connection
    ///
    /// Writes both headers and body.
    pub(crate) async fn write_json<T: Serialize>(&mut self, data: &T) -> HttpResult {
        let _ = self.body_buf.resize(BODY_BUFFER_SIZE, 0);
        let n = serde_json_core::to_slice(data, self.body_buf.as_mut_slice())
            .map_err(|_| Error::FormatHeaders)?;
        self.body_buf.truncate(n);
        let headers = ResponseHeaders::success()
            .with_content(ContentHeaders::new(ContentType::Json).with_length(n));

        self.write_headers(&headers).await?;
        self.socket.write_all(self.body_buf.as_slice()).await?;
        self.socket.flush().await?;
        Ok(())
    }

    /// Read and drop the rest of the request body
    pub(crate) async fn discard_body(&mut self) -> HttpResult {
        while self.read_and_then(|chunk| !chunk.is_empty()).await? {}
        Ok(())
    }

    /// Send the FIN and wait for pending response bytes to leave.
    pub(crate) async fn close(&mut self) {
        self.socket.close();
        let _ = self.socket.flush().await;
    }

    /// Get request method and path
    pub(crate) fn route(&self) -> (HttpMethod, &'_ str) {
        (self.method, self.path.as_str())
    }

    fn remaining(&self) -> Option<u32> {
        self.content_length.map(|len| len.saturating_sub(self.received))
    }
}

impl AsyncChunkedReader for HttpConnection<'_> {
    fn content_length(&self) -> Option<u32> {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn read_and_then<R>(&mut self, op: impl FnOnce(&[u8]) -> R) -> Result<R, Error> {
        if self.finished || self.remaining() == Some(0) {
            self.finished = true;
            return Ok(op(&[]));
        }
        let limit = self
            .remaining()
            .map_or(BODY_BUFFER_SIZE, |rest| (rest as usize).min(BODY_BUFFER_SIZE));

        // Body bytes that arrived together with the headers
        if self.header_buf.len() > self.header_end {
            let end = self.header_buf.len().min(self.header_end + limit);
            self.body_buf.clear();
            let _ = self
                .body_buf
                .extend_from_slice(&self.header_buf[self.header_end..end]);
            self.header_end = end;
            self.received += self.body_buf.len() as u32;
            return Ok(op(self.body_buf.as_slice()));
        }

        let _ = self.body_buf.resize(limit, 0);
        let n = self.socket.read(self.body_buf.as_mut_slice()).await?;
        if n == 0 {
            if self.content_length.is_some() {
                debug!(
                    "http: peer closed at {}/{:?} bytes",
                    self.received, self.content_length
                );
                return Err(Error::Closed);
            }
            self.finished = true;
            return Ok(op(&[]));
        }
        self.received += n as u32;
        self.body_buf.truncate(n);
        Ok(op(self.body_buf.as_slice()))
    }
}
