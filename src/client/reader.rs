//! Line framing over a raw byte stream.

use crate::error::{Error, Result};
use crate::protocol::Line;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Capacity of a single receive.
pub const READ_BUF_LEN: usize = 1500;

/// Buffered reader that splits a stream into `\n`-terminated lines.
///
/// The buffer and cursor belong to one transport. Bytes received past the
/// end of a line stay buffered for the next call, so a reader must not be
/// shared between connections or between concurrent callers.
pub struct FramedReader<R> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; READ_BUF_LEN].into_boxed_slice(),
            pos: 0,
            filled: 0,
            read_timeout: None,
        }
    }

    /// Fail any single receive that takes longer than `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read the next line, including its `\n`.
    ///
    /// At most `max_len - 1` bytes are accepted; a line that has not ended by
    /// then fails with [`Error::LineTooLong`]. Returns `Ok(None)` once the peer
    /// closes the stream. A partial line cut off by the close is discarded.
    pub async fn read_line(&mut self, max_len: usize) -> Result<Option<Line>> {
        let limit = max_len.saturating_sub(1);
        let mut out = Vec::with_capacity(limit.min(READ_BUF_LEN));

        while out.len() < limit {
            if self.pos == self.filled && !self.fill().await? {
                if !out.is_empty() {
                    warn!(bytes = out.len(), "connection closed mid-line, discarding partial line");
                }
                return Ok(None);
            }

            let available = &self.buf[self.pos..self.filled];
            let take = available.len().min(limit - out.len());
            match available[..take].iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    out.extend_from_slice(&available[..=idx]);
                    self.pos += idx + 1;
                    return Ok(Some(Line::new(out)));
                }
                None => {
                    out.extend_from_slice(&available[..take]);
                    self.pos += take;
                }
            }
        }

        Err(Error::LineTooLong { limit })
    }

    /// Receive the next chunk into the buffer. Returns `false` on end of stream.
    async fn fill(&mut self) -> Result<bool> {
        loop {
            let read = self.inner.read(&mut self.buf);
            let result = match self.read_timeout {
                Some(timeout) => tokio::time::timeout(timeout, read)
                    .await
                    .map_err(|_| Error::Timeout(timeout))?,
                None => read.await,
            };

            match result {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pos = 0;
                    self.filled = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ChunkedStream;
    use super::*;

    async fn collect_lines(stream: ChunkedStream, max_len: usize) -> Vec<Vec<u8>> {
        let mut reader = FramedReader::new(stream);
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line(max_len).await.unwrap() {
            lines.push(line.as_bytes().to_vec());
        }
        lines
    }

    #[tokio::test]
    async fn test_read_lines_whole_buffer() {
        let lines = collect_lines(ChunkedStream::new(b"one\ntwo\n.\n", 4096), 128).await;
        assert_eq!(lines, vec![b"one\n".to_vec(), b"two\n".to_vec(), b".\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_chunking_does_not_change_lines() {
        let data = b"reverse\t10\t2\t3\nsum\t0\t0\t1\n\nlonger line with spaces\n.\n";
        let expected = collect_lines(ChunkedStream::new(data, data.len()), 128).await;
        assert_eq!(expected.len(), 5);
        for chunk in [1, 2, 3, 7, 16, 1500] {
            let lines = collect_lines(ChunkedStream::new(data, chunk), 128).await;
            assert_eq!(lines, expected, "chunk size {chunk}");
        }
    }

    #[tokio::test]
    async fn test_lines_larger_than_receive_buffer() {
        let mut data = vec![b'x'; READ_BUF_LEN * 2 + 10];
        data.push(b'\n');
        data.extend_from_slice(b"tail\n");
        let lines = collect_lines(ChunkedStream::new(&data, 4096), 8192).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), READ_BUF_LEN * 2 + 11);
        assert_eq!(lines[1], b"tail\n");
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mut reader = FramedReader::new(ChunkedStream::new(b"OK 1.1.19.1\n", 3));
        let err = reader.read_line(10).await.unwrap_err();
        assert!(matches!(err, Error::LineTooLong { limit: 9 }));
    }

    #[tokio::test]
    async fn test_line_exactly_at_bound() {
        // max_len counts a terminator slot, so 9 bytes including the newline fit in 10.
        let mut reader = FramedReader::new(ChunkedStream::new(b"12345678\n", 1));
        let line = reader.read_line(10).await.unwrap().unwrap();
        assert_eq!(line.as_bytes(), b"12345678\n");
    }

    #[tokio::test]
    async fn test_end_of_stream_is_not_an_error() {
        let mut reader = FramedReader::new(ChunkedStream::new(b"", 1));
        assert!(reader.read_line(128).await.unwrap().is_none());

        let mut reader = FramedReader::new(ChunkedStream::new(b"partial", 2));
        assert!(reader.read_line(128).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_receive_is_retried() {
        let stream = ChunkedStream::new(b"abc\n", 1).with_errors(&[
            std::io::ErrorKind::Interrupted,
            std::io::ErrorKind::Interrupted,
        ]);
        let mut reader = FramedReader::new(stream);
        let line = reader.read_line(5).await.unwrap().unwrap();
        assert_eq!(line.as_bytes(), b"abc\n");
    }

    #[tokio::test]
    async fn test_receive_error_propagates() {
        let stream =
            ChunkedStream::new(b"abc\n", 1).with_errors(&[std::io::ErrorKind::ConnectionReset]);
        let mut reader = FramedReader::new(stream);
        let err = reader.read_line(128).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut reader =
            FramedReader::new(client).with_read_timeout(Some(Duration::from_millis(20)));
        let err = reader.read_line(128).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
