//! `Content-Length`-framed JSON-RPC codec shared by the LSP child
//! conversation.
//!
//! Grounded on the header-parsing loop in the teacher's
//! `lsp_client.rs::reader_loop`, pulled out into a standalone encode/decode
//! pair so it is independently testable against SPEC_FULL.md §8 property 8
//! (frame round-trip).

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum allowed message body size. Guards against a malicious or
/// corrupt `Content-Length` header driving an unbounded allocation.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Serialize `msg` to UTF-8 JSON and frame it with a `Content-Length`
/// header.
pub fn encode(msg: &Value) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Value) -> Result<()> {
    let framed = encode(msg)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message: headers until a blank line, then exactly
/// `Content-Length` bytes of JSON body. Returns `Ok(None)` on a clean EOF
/// before any header bytes are read.
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;
    let mut saw_any_header_byte = false;
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .context("reading frame header")?;
        if n == 0 {
            if saw_any_header_byte {
                bail!("connection closed mid-header");
            }
            return Ok(None);
        }
        saw_any_header_byte = true;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(len_str) = trimmed
            .strip_prefix("Content-Length:")
            .map(str::trim)
            .or_else(|| trimmed.strip_prefix("Content-Length: "))
        {
            content_length = Some(
                len_str
                    .trim()
                    .parse()
                    .context("Content-Length header is not a valid number")?,
            );
        }
        // Other headers (Content-Type, ...) are tolerated and ignored.
    }

    let length = content_length.context("missing Content-Length header")?;
    if length > MAX_MESSAGE_SIZE {
        bail!("message size {length} exceeds maximum of {MAX_MESSAGE_SIZE}");
    }

    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .context("reading frame body")?;
    let value: Value = serde_json::from_slice(&body).context("invalid JSON-RPC message")?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn frame_round_trips() {
        let msg = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "foo", "params": {}});
        let framed = encode(&msg).unwrap();
        let mut reader = BufReader::new(framed.as_slice());
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn missing_content_length_errors() {
        let raw = b"Content-Type: application/json\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(raw.as_slice());
        assert!(read_message(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn clean_eof_before_any_bytes_returns_none() {
        let raw: Vec<u8> = Vec::new();
        let mut reader = BufReader::new(raw.as_slice());
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_header_is_an_error() {
        let raw = b"Content-Length: 10\r\n".to_vec();
        let mut reader = BufReader::new(raw.as_slice());
        assert!(read_message(&mut reader).await.is_err());
    }
}
