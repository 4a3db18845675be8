//! DAP wire protocol codec
//!
//! The DAP protocol uses HTTP-style headers followed by JSON body:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```

use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::common::Result;

/// Sanity limit - 100MB should be plenty for any DAP message
const MAX_CONTENT_LENGTH: usize = 100 * 1024 * 1024;

/// Longest header line accepted, terminator included
const MAX_HEADER_LINE: u64 = 8 * 1024;

/// Outcome of reading one frame
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete payload, exactly as many bytes as the header declared
    Payload(Vec<u8>),
    /// The stream closed before a complete frame arrived
    EndOfStream,
    /// The header could not be understood
    Malformed(String),
}

/// Reads `Content-Length` framed payloads from a byte stream
///
/// Only the session's receive loop reads, so no locking happens here.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next frame from the stream
    ///
    /// I/O failures other than end of file are returned as errors.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut content_length: Option<usize> = None;

        // Read headers line by line until we get an empty line
        loop {
            let mut line = Vec::new();
            let mut limited = (&mut self.reader).take(MAX_HEADER_LINE);
            let bytes_read = match limited.read_until(b'\n', &mut line).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::EndOfStream),
                Err(e) => return Err(e.into()),
            };

            if bytes_read as u64 >= MAX_HEADER_LINE && line.last() != Some(&b'\n') {
                return Ok(Frame::Malformed(format!(
                    "header line longer than {MAX_HEADER_LINE} bytes"
                )));
            }
            if bytes_read == 0 || line.last() != Some(&b'\n') {
                return Ok(Frame::EndOfStream);
            }

            let line = trim_line_ending(&line);
            if line.is_empty() {
                break;
            }

            let Ok(text) = std::str::from_utf8(line) else {
                return Ok(Frame::Malformed("header is not valid UTF-8".to_string()));
            };
            let Some((name, value)) = text.split_once(':') else {
                return Ok(Frame::Malformed(format!("header without separator: {text:?}")));
            };

            // Ignore other headers (like Content-Type)
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                match value.trim().parse() {
                    Ok(len) => content_length = Some(len),
                    Err(_) => {
                        return Ok(Frame::Malformed(format!(
                            "Invalid Content-Length: {}",
                            value.trim()
                        )))
                    }
                }
            }
        }

        let Some(len) = content_length else {
            return Ok(Frame::Malformed("Missing Content-Length header".to_string()));
        };

        if len > MAX_CONTENT_LENGTH {
            return Ok(Frame::Malformed(format!(
                "Content-Length too large: {} bytes",
                len
            )));
        }

        let mut body = vec![0u8; len];
        match self.reader.read_exact(&mut body).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::EndOfStream),
            Err(e) => return Err(e.into()),
        }

        tracing::trace!(
            target: "dap_session::wire",
            "--> Content-Length: {}\r\n\r\n{}",
            len,
            String::from_utf8_lossy(&body)
        );

        Ok(Frame::Payload(body))
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Writes `Content-Length` framed payloads to a byte stream
///
/// Clones share one lock, held for the whole header + payload write, so
/// concurrent senders never interleave bytes of two frames.
#[derive(Clone)]
pub struct FrameWriter {
    inner: SharedWriter,
}

impl FrameWriter {
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write one frame and flush it
    pub async fn send_frame(&self, payload: &[u8]) -> Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());

        let mut writer = self.inner.lock().await;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Serialize a JSON message and send it as one frame
    pub async fn send_json(&self, message: &Value) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        tracing::trace!(
            target: "dap_session::wire",
            "<-- Content-Length: {}\r\n\r\n{}",
            payload.len(),
            message
        );

        self.send_frame(&payload).await
    }
}
