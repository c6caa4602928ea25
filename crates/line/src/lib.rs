//! Line-oriented I/O over an async byte stream.
//!
//! SMTP is a CRLF-delimited text protocol; this crate turns the raw stream
//! into lines and back. Replies are written verbatim, so callers append the
//! terminator themselves.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

pub async fn write<S: AsyncWrite + Unpin>(
    stream: &mut S,
    src: impl AsRef<[u8]>,
) -> std::io::Result<()> {
    let src = src.as_ref();
    debug!("write: {:?}", String::from_utf8_lossy(src));
    stream.write_all(src).await
}

pub async fn write_flush<S: AsyncWrite + Unpin>(
    stream: &mut S,
    src: impl AsRef<[u8]>,
) -> std::io::Result<()> {
    write(stream, src).await?;
    stream.flush().await
}

#[derive(Debug)]
pub enum ReadLineError {
    Io(std::io::Error),
    /// The stream closed before a line terminator was seen. Not the same
    /// thing as an empty line, which reads as `Ok` with an empty buffer.
    Eof,
}

impl From<std::io::Error> for ReadLineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Read one line into `buf`, stripping the trailing CR/LF.
///
/// ```
/// # tokio_test::block_on(async {
/// let mut buf = Vec::new();
/// line::read_line(&mut "EHLO client.example\r\n".as_bytes(), &mut buf)
///     .await
///     .unwrap();
/// assert_eq!(buf, b"EHLO client.example");
/// # });
/// ```
pub async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<(), ReadLineError> {
    assert!(buf.is_empty(), "buffer must be empty");

    if reader.read_until(b'\n', buf).await? == 0 {
        return Err(ReadLineError::Eof);
    }

    debug!("read: {:?}", String::from_utf8_lossy(buf));

    let rpos = buf
        .iter()
        .rposition(|&c| c != b'\r' && c != b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    buf.truncate(rpos);

    Ok(())
}

/// A buffered connection to a peer.
pub struct Connection<IO: AsyncRead + AsyncWrite + Unpin> {
    stream: BufReader<IO>,
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Connection<IO> {
    pub fn new(stream: IO) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub fn stream_mut(&mut self) -> &mut BufReader<IO> {
        &mut self.stream
    }

    pub async fn write(&mut self, src: impl AsRef<[u8]>) -> std::io::Result<()> {
        write(&mut self.stream, src).await
    }

    pub async fn write_flush(&mut self, src: impl AsRef<[u8]>) -> std::io::Result<()> {
        write_flush(&mut self.stream, src).await
    }
}
