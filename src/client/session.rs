//! Command/response exchanges on an admin connection.

use super::reader::FramedReader;
use crate::error::{Error, Result};
use crate::protocol::{
    decode_status_line, decode_version_line, decode_worker_line, Command, Line, SplitMode,
    StatusRecord, WorkerMarker, WorkerRecord,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Line bounds and tokenization used when decoding responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Bound for `status` and `workers` rows, newline included, plus one.
    pub max_line_len: usize,
    /// Bound for the `version` reply, newline included, plus one.
    pub max_version_len: usize,
    pub split_mode: SplitMode,
    pub worker_marker: WorkerMarker,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_len: 1024,
            max_version_len: 64,
            split_mode: SplitMode::Strict,
            worker_marker: WorkerMarker::Keep,
        }
    }
}

impl Limits {
    pub fn max_len_for(&self, command: Command) -> usize {
        match command {
            Command::Version => self.max_version_len,
            Command::Status | Command::Workers => self.max_line_len,
        }
    }
}

/// Write the request line for `command` in full.
pub async fn send<W>(transport: &mut W, command: Command) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    transport.write_all(command.request_line()).await?;
    transport.flush().await?;
    debug!(%command, "sent command");
    Ok(())
}

/// Lazily read the response lines for `command`.
///
/// Multi-line responses end at the `.` sentinel, which is consumed but not
/// yielded; `version` ends after its single line. If the response ends any
/// other way the last item is the error, after which the stream is done.
pub fn receive_lines<'a, R>(
    reader: &'a mut FramedReader<R>,
    command: Command,
    max_len: usize,
) -> impl Stream<Item = Result<Line>> + 'a
where
    R: AsyncRead + Unpin + 'a,
{
    stream::unfold(Some(reader), move |state| async move {
        let reader = state?;
        match reader.read_line(max_len).await {
            Ok(Some(line)) if command.is_multi_line() => {
                if line.is_sentinel() {
                    None
                } else {
                    Some((Ok(line), Some(reader)))
                }
            }
            Ok(Some(line)) => Some((Ok(line), None)),
            Ok(None) => Some((Err(Error::EndOfStream { command }), None)),
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Records decoded from one multi-line response.
///
/// Decoding is tolerant: malformed rows are set aside and the rest of the
/// response is still read. If the exchange ended abnormally, `incomplete`
/// holds the reason and `records` holds whatever was decoded before it.
#[derive(Debug)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub malformed: Vec<Error>,
    pub incomplete: Option<Error>,
}

impl<T> Listing<T> {
    /// Whether the response reached its sentinel.
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_none()
    }

    fn failed(error: Error) -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
            incomplete: Some(error),
        }
    }
}

/// Client for one admin connection.
///
/// Issues one command at a time and drains its response before returning.
/// The transport is borrowed (`&mut TcpStream` works) and never closed here.
pub struct AdminClient<S> {
    reader: FramedReader<S>,
    limits: Limits,
}

impl<S> AdminClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S, limits: Limits) -> Self {
        Self {
            reader: FramedReader::new(transport),
            limits,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reader = self.reader.with_read_timeout(timeout);
        self
    }

    pub async fn send(&mut self, command: Command) -> Result<()> {
        send(self.reader.get_mut(), command).await
    }

    /// Raw response lines for a `command` that has already been sent.
    pub fn receive_lines(&mut self, command: Command) -> impl Stream<Item = Result<Line>> + '_ {
        let max_len = self.limits.max_len_for(command);
        receive_lines(&mut self.reader, command, max_len)
    }

    /// Query the server version string.
    pub async fn version(&mut self) -> Result<String> {
        self.send(Command::Version).await?;
        let lines = self.receive_lines(Command::Version);
        futures::pin_mut!(lines);
        match lines.next().await {
            Some(line) => Ok(decode_version_line(line?.text(Command::Version)?)),
            None => Err(Error::EndOfStream {
                command: Command::Version,
            }),
        }
    }

    /// Query per-function queue status.
    pub async fn status(&mut self) -> Listing<StatusRecord> {
        let mode = self.limits.split_mode;
        self.listing(Command::Status, |line| decode_status_line(line, mode))
            .await
    }

    /// Query connected workers and their registered functions.
    pub async fn workers(&mut self) -> Listing<WorkerRecord> {
        let Limits {
            split_mode,
            worker_marker,
            ..
        } = self.limits;
        self.listing(Command::Workers, |line| {
            decode_worker_line(line, split_mode, worker_marker)
        })
        .await
    }

    async fn listing<T, F>(&mut self, command: Command, decode: F) -> Listing<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        if let Err(e) = self.send(command).await {
            warn!(%command, error = %e, "failed to send command");
            return Listing::failed(e);
        }

        let mut listing = Listing {
            records: Vec::new(),
            malformed: Vec::new(),
            incomplete: None,
        };

        let lines = self.receive_lines(command);
        futures::pin_mut!(lines);
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => match line.text(command).and_then(&decode) {
                    Ok(record) => listing.records.push(record),
                    Err(e) => {
                        warn!(%command, error = %e, "skipping malformed line");
                        listing.malformed.push(e);
                    }
                },
                Err(e) if e.is_transport() => {
                    warn!(%command, error = %e, "connection lost mid-response");
                    listing.incomplete = Some(e);
                }
                Err(e) => {
                    warn!(%command, error = %e, "protocol violation, abandoning response");
                    listing.incomplete = Some(e);
                }
            }
        }

        debug!(
            %command,
            records = listing.records.len(),
            malformed = listing.malformed.len(),
            "decoded response"
        );
        listing
    }
}
