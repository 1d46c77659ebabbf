//! Framed transport: `Content-Length: N\r\n\r\n<N bytes of UTF-8 JSON>` (§4.A).
//!
//! These are free functions rather than a type because both the pipe and
//! the TCP transport (§4.C) satisfy the identical byte-level contract; only
//! how the reader/writer halves are obtained differs, and that's the
//! supervisor's concern, not this module's.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Read one frame's JSON body. Returns `Ok(None)` on clean EOF before any
/// header line is read. A truncated header or body is an error (§4.A).
pub async fn read_frame<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_any_header = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if saw_any_header {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated frame header",
                ));
            }
            return Ok(None); // clean EOF between frames
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break; // blank line: end of headers
        }
        saw_any_header = true;

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
            // Unknown headers are tolerated and ignored (§4.A).
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, format!("truncated frame body: {e}"))
        })?;
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Serialize and write one frame. Callers are responsible for serializing
/// writes against each other (§4.A: "concurrent writers are serialized
/// behind a single mutex") — this function itself does one atomic
/// write_all-then-flush with no intervening await points that could
/// interleave with another writer sharing the same underlying stream.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trip_any_json_value() {
        let (mut client, server) = tokio::io::duplex(4096);
        let value = json!({"jsonrpc": "2.0", "id": "1", "method": "ping", "params": {}});
        write_frame(&mut client, &value).await.unwrap();

        let mut reader = BufReader::new(server);
        let got = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(got, value);
    }

    #[tokio::test]
    async fn zero_length_body_is_legal() {
        let (mut client, server) = tokio::io::duplex(4096);
        client
            .write_all(b"Content-Length: 2\r\n\r\n{}")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let got = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(got, json!({}));
    }

    #[tokio::test]
    async fn tolerates_unknown_headers_and_bare_newline() {
        let (mut client, server) = tokio::io::duplex(4096);
        client
            .write_all(b"X-Custom: ignored\nContent-Length: 13\n\n{\"a\":\"bcd\"}\n\n")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let got = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(got, json!({"a": "bcd"}));
    }

    #[tokio::test]
    async fn clean_eof_before_any_header_is_none() {
        let (client, server) = tokio::io::duplex(16);
        drop(client);
        let mut reader = BufReader::new(server);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut client, server) = tokio::io::duplex(4096);
        client
            .write_all(b"Content-Length: 100\r\n\r\n{\"a\":1}")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        assert!(read_frame(&mut reader).await.is_err());
    }
}
