//! Admin protocol definitions and response decoding.
//!
//! The job server's administrative port speaks a newline-delimited text
//! protocol. Each query is a single line; the reply is either one line
//! (`version`) or a run of lines terminated by a line holding only `.`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line that ends a multi-line response.
pub const SENTINEL: &[u8] = b".\n";

/// Column some servers place between the client id and the function list
/// of a `workers` row.
const FUNCTION_LIST_MARKER: &str = ":";

/// The read-only queries understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    Status,
    Workers,
}

impl Command {
    /// The literal request line written to the server.
    pub fn request_line(self) -> &'static [u8] {
        match self {
            Command::Version => b"version\n",
            Command::Status => b"status\n",
            Command::Workers => b"workers\n",
        }
    }

    /// Whether the response is a sentinel-terminated run of lines.
    pub fn is_multi_line(self) -> bool {
        !matches!(self, Command::Version)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Status => "status",
            Command::Workers => "workers",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single newline-terminated line as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    bytes: Vec<u8>,
}

impl Line {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw bytes, including the terminating `\n`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this is the `.` line ending a multi-line response.
    pub fn is_sentinel(&self) -> bool {
        self.as_bytes() == SENTINEL
    }

    /// Line content without the trailing newline.
    ///
    /// Content that is not valid UTF-8 is a malformed `command` line.
    pub fn text(&self, command: Command) -> Result<&str> {
        let body = self.bytes.strip_suffix(b"\n").unwrap_or(&self.bytes);
        std::str::from_utf8(body).map_err(|e| {
            Error::malformed(command, &String::from_utf8_lossy(body), format!("not UTF-8: {e}"))
        })
    }
}

/// How consecutive delimiters are tokenized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMode {
    /// Every delimiter separates a field; empty fields are kept.
    #[default]
    Strict,
    /// Runs of delimiters collapse and empty fields are dropped.
    SkipEmpty,
}

impl SplitMode {
    fn split(self, line: &str, delimiter: char) -> Vec<&str> {
        match self {
            SplitMode::Strict => line.split(delimiter).collect(),
            SplitMode::SkipEmpty => line.split(delimiter).filter(|f| !f.is_empty()).collect(),
        }
    }
}

/// How the fourth column of a `workers` row is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMarker {
    /// Every field after the client id is a function name.
    #[default]
    Keep,
    /// A bare `:` right after the client id is a separator, not a function.
    SkipColon,
}

/// One row of the `status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub function_name: String,
    pub total_jobs: u64,
    pub running_jobs: u64,
    pub available_workers: u64,
}

/// One row of the `workers` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub file_descriptor: String,
    pub ip_address: String,
    pub client_id: String,
    /// Registered function names, in the order the server listed them.
    pub functions: Vec<String>,
}

/// Decode a tab-delimited `status` row.
///
/// Columns past the fourth are ignored.
pub fn decode_status_line(line: &str, mode: SplitMode) -> Result<StatusRecord> {
    let fields = mode.split(line, '\t');
    if fields.len() < 4 {
        return Err(Error::malformed(
            Command::Status,
            line,
            format!("expected 4 tab-separated fields, found {}", fields.len()),
        ));
    }

    let number = |name: &str, value: &str| {
        value.parse::<u64>().map_err(|_| {
            Error::malformed(Command::Status, line, format!("{name} is not a number: {value:?}"))
        })
    };

    Ok(StatusRecord {
        function_name: fields[0].to_string(),
        total_jobs: number("total jobs", fields[1])?,
        running_jobs: number("running jobs", fields[2])?,
        available_workers: number("available workers", fields[3])?,
    })
}

/// Decode a space-delimited `workers` row.
///
/// Fields after the client id form the function list. With
/// [`WorkerMarker::SkipColon`] a bare `:` in the fourth column is dropped.
pub fn decode_worker_line(
    line: &str,
    mode: SplitMode,
    marker: WorkerMarker,
) -> Result<WorkerRecord> {
    let fields = mode.split(line, ' ');
    let [file_descriptor, ip_address, client_id, rest @ ..] = fields.as_slice() else {
        return Err(Error::malformed(
            Command::Workers,
            line,
            format!("expected at least 3 space-separated fields, found {}", fields.len()),
        ));
    };

    let rest = match (marker, rest) {
        (WorkerMarker::SkipColon, [first, tail @ ..]) if *first == FUNCTION_LIST_MARKER => tail,
        _ => rest,
    };

    Ok(WorkerRecord {
        file_descriptor: file_descriptor.to_string(),
        ip_address: ip_address.to_string(),
        client_id: client_id.to_string(),
        functions: rest.iter().map(|f| f.to_string()).collect(),
    })
}

/// The `version` reply, verbatim.
pub fn decode_version_line(line: &str) -> String {
    line.to_string()
}
