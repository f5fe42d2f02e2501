//! LSP base-protocol framing over an async byte-stream pair.
//!
//! Each message is `Content-Length: N\r\n\r\n` followed by exactly `N` bytes
//! of UTF-8 JSON. Other headers are accepted and skipped. This module knows
//! nothing about JSON-RPC; it just moves frames.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const CONTENT_LENGTH: &str = "Content-Length:";

/// Transport-level failure: either a read/write error on the underlying
/// stream, or a frame that doesn't honor the base-protocol header contract.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Writes one framed message. Exposed as a free function so [`Connection`]
/// can hold only the writer half behind a lock while the reader half is
/// moved, unshared, into the background reader task.
///
/// [`Connection`]: crate::lsp::rpc::Connection
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("{CONTENT_LENGTH} {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed message, blocking until a full frame (or EOF/error)
/// arrives. `Content-Length: 0` is legal and yields an empty body.
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        let trimmed = trim_crlf(&line);
        if trimmed.is_empty() {
            break;
        }
        if let Some(rest) = strip_header(trimmed, CONTENT_LENGTH) {
            let value = std::str::from_utf8(rest)
                .map_err(|_| TransportError::Protocol("invalid Content-Length encoding"))?
                .trim();
            content_length = Some(
                value
                    .parse()
                    .map_err(|_| TransportError::Protocol("invalid Content-Length value"))?,
            );
        }
        // Unknown headers (Content-Type, etc.) are ignored.
    }

    let content_length =
        content_length.ok_or(TransportError::Protocol("missing Content-Length"))?;

    let mut body = vec![0u8; content_length];
    tokio::io::AsyncReadExt::read_exact(reader, &mut body).await?;
    Ok(body)
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn strip_header<'a>(line: &'a [u8], name: &str) -> Option<&'a [u8]> {
    let name = name.as_bytes();
    if line.len() >= name.len() && line[..name.len()].eq_ignore_ascii_case(name) {
        Some(&line[name.len()..])
    } else {
        None
    }
}

/// Owns one side of the framed wire: a reader used exclusively by the
/// background reader loop, and a writer shared (behind a mutex) by every
/// caller of `Connection::call`/`notify`.
pub struct Transport<R, W> {
    pub(crate) reader: R,
    pub(crate) writer: Mutex<W>,
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: Mutex::new(writer),
        }
    }

    /// Splits into the exclusively-owned reader and the lockable writer,
    /// consuming the transport. The reader moves into the background reader
    /// task; the writer is shared behind the returned mutex.
    pub fn into_parts(self) -> (R, Mutex<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_message(&mut client, br#"{"hello":"world"}"#)
            .await
            .unwrap();
        let mut reader = tokio::io::BufReader::new(&mut server);
        let body = read_message(&mut reader).await.unwrap();
        assert_eq!(body, br#"{"hello":"world"}"#);
    }

    #[tokio::test]
    async fn empty_content_length_is_legal() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_message(&mut client, b"").await.unwrap();
        let mut reader = tokio::io::BufReader::new(&mut server);
        let body = read_message(&mut reader).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unknown_headers_are_skipped() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let body = br#"{"a":1}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        client.write_all(frame.as_bytes()).await.unwrap();
        client.write_all(body).await.unwrap();
        let mut reader = tokio::io::BufReader::new(&mut server);
        let got = read_message(&mut reader).await.unwrap();
        assert_eq!(got, body);
    }

    #[tokio::test]
    async fn missing_content_length_is_a_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"Content-Type: x\r\n\r\n").await.unwrap();
        let mut reader = tokio::io::BufReader::new(&mut server);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn eof_before_headers_is_closed() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let mut reader = tokio::io::BufReader::new(&mut server);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
