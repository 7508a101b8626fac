//! Content-Length framed JSON-RPC transport.
//!
//! LSP messages are framed as a block of `Key: Value\r\n` header lines,
//! a blank line, then exactly `Content-Length` bytes of UTF-8 JSON. The
//! reader half is owned by a single task; the writer half serializes frames
//! under a mutex so concurrent senders never interleave bytes.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::TransportError;

/// Hard cap on a single frame body. A larger advertised length kills the
/// transport instead of attempting the allocation.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Writer half. Cheap to share behind an `Arc`; `send` serializes whole
/// frames under an internal mutex.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps a byte sink.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Serializes `message` and writes exactly one frame.
    pub async fn send(&self, message: &Value) -> Result<(), TransportError> {
        let body =
            serde_json::to_vec(message).map_err(|e| TransportError::InvalidBody(e.to_string()))?;
        if body.len() as u64 > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge(body.len() as u64));
        }
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        let mut writer = self.inner.lock().await;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(&body).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Reader half. Owned by exactly one task.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a byte source.
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    /// Yields the next complete frame, or `None` on a clean end-of-stream at
    /// a frame boundary. Every error is fatal for the transport.
    pub async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        let mut content_length: Option<u64> = None;
        let mut saw_header_bytes = false;

        loop {
            let mut line = Vec::new();
            let read = self.inner.read_until(b'\n', &mut line).await?;
            if read == 0 {
                if saw_header_bytes {
                    return Err(TransportError::TruncatedFrame);
                }
                return Ok(None);
            }
            saw_header_bytes = true;

            let line = std::str::from_utf8(&line)
                .map_err(|_| TransportError::MalformedHeader("non-UTF-8 header".to_string()))?;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(TransportError::MalformedHeader(trimmed.to_string()));
            };
            if name.eq_ignore_ascii_case("Content-Length") {
                let parsed: i64 = value.trim().parse().map_err(|_| {
                    TransportError::MalformedHeader(format!("bad Content-Length: {value}"))
                })?;
                if parsed < 0 {
                    return Err(TransportError::MalformedHeader(format!(
                        "negative Content-Length: {parsed}"
                    )));
                }
                content_length = Some(parsed as u64);
            }
            // Other headers (Content-Type, ...) are ignored.
        }

        let length = content_length
            .ok_or_else(|| TransportError::MalformedHeader("missing Content-Length".to_string()))?;
        if length > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge(length));
        }

        let mut body = vec![0u8; length as usize];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => TransportError::TruncatedFrame,
                _ => TransportError::Io(e),
            })?;

        let message =
            serde_json::from_slice(&body).map_err(|e| TransportError::InvalidBody(e.to_string()))?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn roundtrip_preserves_message() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_rx, _server_tx) = tokio::io::split(server);
        let (_client_rx, client_tx) = tokio::io::split(client);

        let writer = FrameWriter::new(client_tx);
        let mut reader = FrameReader::new(server_rx);

        let message = json!({"jsonrpc": "2.0", "id": 7, "method": "textDocument/hover",
                             "params": {"line": 3, "character": 14}});
        writer.send(&message).await.unwrap();

        let received = reader.recv().await.unwrap().unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn multiple_frames_in_sequence() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_rx, _keep) = tokio::io::split(server);
        let (_keep2, client_tx) = tokio::io::split(client);

        let writer = FrameWriter::new(client_tx);
        let mut reader = FrameReader::new(server_rx);

        for id in 0..5 {
            writer.send(&json!({"id": id})).await.unwrap();
        }
        for id in 0..5 {
            let msg = reader.recv().await.unwrap().unwrap();
            assert_eq!(msg["id"], id);
        }
    }

    #[tokio::test]
    async fn unknown_headers_are_ignored() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        let body = br#"{"ok":true}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        tx.write_all(frame.as_bytes()).await.unwrap();
        tx.write_all(body).await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        let msg = reader.recv().await.unwrap().unwrap();
        assert_eq!(msg["ok"], true);
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_content_length_is_fatal() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tx.write_all(b"Content-Type: application/json\r\n\r\n{}")
            .await
            .unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn negative_content_length_is_fatal() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tx.write_all(b"Content-Length: -5\r\n\r\n").await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn oversized_frame_is_fatal() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        let frame = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        tx.write_all(frame.as_bytes()).await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_fatal() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tx.write_all(b"Content-Length: 100\r\n\r\n{\"partial\":")
            .await
            .unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::TruncatedFrame)
        ));
    }

    #[tokio::test]
    async fn invalid_json_body_is_fatal() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tx.write_all(b"Content-Length: 9\r\n\r\nnot json!")
            .await
            .unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::InvalidBody(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_sends_never_interleave() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_rx, _keep) = tokio::io::split(server);
        let (_keep2, client_tx) = tokio::io::split(client);

        let writer = Arc::new(FrameWriter::new(client_tx));
        let mut handles = Vec::new();
        for id in 0..32 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                let padding = "x".repeat(512);
                writer.send(&json!({"id": id, "pad": padding})).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut reader = FrameReader::new(server_rx);
        let mut seen = Vec::new();
        for _ in 0..32 {
            let msg = reader.recv().await.unwrap().unwrap();
            seen.push(msg["id"].as_i64().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }
}
