use std::io;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tracing::warn;

const CONTENT_LENGTH: &str = "Content-Length:";

/// Reads one `Content-Length`-framed message body.
///
/// `Ok(None)` means the stream is closed: clean EOF before any header byte,
/// or a body shorter than its declared length. A message with a missing,
/// zero, or unparsable `Content-Length` comes back as `Ok(Some(vec![]))`;
/// callers skip it rather than terminate. Unknown headers are ignored and
/// header values are trimmed.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut content_length: usize = 0;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix(CONTENT_LENGTH) {
            let value = value.trim();
            content_length = match value.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    warn!("invalid Content-Length value: {value}");
                    0
                }
            };
        }
    }

    if content_length == 0 {
        return Ok(Some(Vec::new()));
    }

    let mut body = vec![0u8; content_length];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            warn!("short read: expected {content_length} body bytes");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Writes one framed message and flushes. Writers must serialize whole calls
/// to keep framing intact.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}
