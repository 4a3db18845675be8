//! Output multiplexer
//!
//! Turns text produced by the debuggee or the adapter itself into `output`
//! events, one event per line so clients render output as it arrives.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::common::Result;
use crate::dap::{EventMessage, FrameWriter, OutputCategory, OutputEventBody};

/// Read size for redirected streams
const READ_CHUNK: usize = 4096;

/// Emits `output` events through the shared frame writer
#[derive(Clone)]
pub struct OutputMultiplexer {
    writer: FrameWriter,
}

impl OutputMultiplexer {
    pub fn new(writer: FrameWriter) -> Self {
        Self { writer }
    }

    /// Send text as output events, one per line
    pub async fn send_output(&self, category: OutputCategory, output: &str) -> Result<()> {
        self.on_redirected_bytes(category, output.as_bytes()).await
    }

    /// Send raw bytes as output events, one per line
    ///
    /// Lines keep their terminator. A trailing fragment without one is
    /// sent right away rather than held for the next call.
    pub async fn on_redirected_bytes(&self, category: OutputCategory, bytes: &[u8]) -> Result<()> {
        for line in split_lines(bytes) {
            // JSON strings must be UTF-8; invalid sequences become U+FFFD
            let output = String::from_utf8_lossy(line);
            let body = serde_json::to_value(OutputEventBody {
                category,
                output: &output,
            })?;
            let event = serde_json::to_value(EventMessage::new("output", Some(body)))?;
            self.writer.send_json(&event).await?;
        }
        Ok(())
    }
}

/// Split on line feeds, keeping each terminator with its line
pub fn split_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes.split_inclusive(|b| *b == b'\n')
}

/// Length of a multi-byte UTF-8 sequence cut off at the end of `bytes`
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Forwards everything read from a stream to an [`OutputMultiplexer`]
pub struct OutputRedirector {
    category: OutputCategory,
    task: JoinHandle<()>,
}

impl OutputRedirector {
    /// Start forwarding `reader` under `category`
    pub fn spawn<R>(mut reader: R, category: OutputCategory, output: OutputMultiplexer) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            // Bytes of a character split across two reads
            let mut pending = Vec::new();
            loop {
                let n = match reader.read(&mut buf).await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!(%category, "Failed to read redirected output: {}", e);
                        break;
                    }
                };

                pending.extend_from_slice(&buf[..n]);
                let end = if n == 0 {
                    pending.len()
                } else {
                    pending.len() - incomplete_utf8_suffix(&pending)
                };

                if let Err(e) = output.on_redirected_bytes(category, &pending[..end]).await {
                    tracing::warn!(%category, "Failed to forward redirected output: {}", e);
                    break;
                }
                pending.drain(..end);

                if n == 0 {
                    break;
                }
            }
            tracing::debug!(%category, "Output redirection finished");
        });

        Self { category, task }
    }

    pub fn category(&self) -> OutputCategory {
        self.category
    }

    /// Whether the source stream has closed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop forwarding; bytes not yet read are dropped
    pub fn stop(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::{Frame, FrameReader};
    use serde_json::{json, Value};
    use tokio::io::{AsyncWriteExt, BufReader};

    type Reader = FrameReader<BufReader<tokio::io::DuplexStream>>;

    fn multiplexer() -> (OutputMultiplexer, Reader) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            OutputMultiplexer::new(FrameWriter::new(server)),
            FrameReader::new(BufReader::new(client)),
        )
    }

    async fn next_body(reader: &mut Reader) -> Option<Value> {
        match reader.read_frame().await.unwrap() {
            Frame::Payload(payload) => {
                let event: Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(event["type"], "event");
                assert_eq!(event["event"], "output");
                Some(event["body"].clone())
            }
            _ => None,
        }
    }

    #[test]
    fn test_split_lines() {
        let lines: Vec<&[u8]> = split_lines(b"line1\nline2").collect();
        assert_eq!(lines, vec![&b"line1\n"[..], &b"line2"[..]]);

        let lines: Vec<&[u8]> = split_lines(b"a\n\nb\n").collect();
        assert_eq!(lines, vec![&b"a\n"[..], &b"\n"[..], &b"b\n"[..]]);

        assert_eq!(split_lines(b"").count(), 0);
    }

    #[test]
    fn test_incomplete_utf8_suffix() {
        assert_eq!(incomplete_utf8_suffix(b"abc"), 0);
        assert_eq!(incomplete_utf8_suffix(&[b'a', 0xC3]), 1);
        assert_eq!(incomplete_utf8_suffix("é".as_bytes()), 0);
        assert_eq!(incomplete_utf8_suffix(&[0xE2, 0x82]), 2);
        assert_eq!(incomplete_utf8_suffix(&[0xF0, 0x9F, 0x98]), 3);
        assert_eq!(incomplete_utf8_suffix("😀".as_bytes()), 0);
        assert_eq!(incomplete_utf8_suffix(&[]), 0);
    }

    #[tokio::test]
    async fn test_one_event_per_line() {
        let (output, mut reader) = multiplexer();
        output
            .on_redirected_bytes(OutputCategory::Stdout, b"line1\nline2")
            .await
            .unwrap();
        drop(output);

        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stdout", "output": "line1\n"}))
        );
        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stdout", "output": "line2"}))
        );
        assert_eq!(next_body(&mut reader).await, None);
    }

    #[tokio::test]
    async fn test_empty_input_sends_nothing() {
        let (output, mut reader) = multiplexer();
        output.send_output(OutputCategory::Console, "").await.unwrap();
        drop(output);

        assert_eq!(next_body(&mut reader).await, None);
    }

    #[tokio::test]
    async fn test_content_is_not_trimmed() {
        let (output, mut reader) = multiplexer();
        output
            .send_output(OutputCategory::Stderr, "  indented\r\n")
            .await
            .unwrap();

        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stderr", "output": "  indented\r\n"}))
        );
    }

    #[tokio::test]
    async fn test_redirector_forwards_stream() {
        let (output, mut reader) = multiplexer();
        let (mut program, pipe) = tokio::io::duplex(1024);

        let redirector = OutputRedirector::spawn(pipe, OutputCategory::Stdout, output.clone());
        assert_eq!(redirector.category(), OutputCategory::Stdout);

        program.write_all(b"hello\n").await.unwrap();
        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stdout", "output": "hello\n"}))
        );

        drop(program);
        while !redirector.is_finished() {
            tokio::task::yield_now().await;
        }
        redirector.stop();
    }

    #[tokio::test]
    async fn test_redirector_keeps_characters_split_across_reads() {
        let (output, mut reader) = multiplexer();
        let (mut program, pipe) = tokio::io::duplex(1024);
        let redirector = OutputRedirector::spawn(pipe, OutputCategory::Stdout, output);

        program.write_all(&[0xC3]).await.unwrap();
        // Let the redirector consume the lead byte on its own
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        program.write_all(&[0xA9, b'\n']).await.unwrap();

        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stdout", "output": "é\n"}))
        );
        redirector.stop();
    }

    #[tokio::test]
    async fn test_redirector_flushes_truncated_tail_at_end() {
        let (output, mut reader) = multiplexer();
        let (mut program, pipe) = tokio::io::duplex(1024);
        let redirector = OutputRedirector::spawn(pipe, OutputCategory::Stderr, output);

        program.write_all(&[b'x', 0xE2, 0x82]).await.unwrap();
        drop(program);

        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stderr", "output": "x"}))
        );
        assert_eq!(
            next_body(&mut reader).await,
            Some(json!({"category": "stderr", "output": "\u{FFFD}"}))
        );
        redirector.stop();
    }
}
