//! Server status report: gathers the three queries and renders them.

use crate::client::{AdminClient, Connector, Limits, Listing};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{StatusRecord, WorkerRecord};
use serde::Serialize;
use std::fmt::Write as _;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Everything shown for one server.
#[derive(Debug, Serialize)]
pub struct Report {
    pub server: String,
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_error: Option<String>,
    pub status: Section<StatusRecord>,
    pub workers: Section<WorkerRecord>,
}

/// One decoded listing, with its problems flattened to messages.
#[derive(Debug, Serialize)]
pub struct Section<T> {
    pub records: Vec<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Section<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    fn skipped(reason: &str) -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
            error: Some(format!("not queried: {reason}")),
        }
    }
}

impl<T> From<Listing<T>> for Section<T> {
    fn from(listing: Listing<T>) -> Self {
        Self {
            records: listing.records,
            malformed: listing.malformed.iter().map(ToString::to_string).collect(),
            error: listing.incomplete.map(|e| e.to_string()),
        }
    }
}

/// Connect to `server` and collect a report.
///
/// A connection failure is returned as an error before anything is queried.
/// Failures after that are recorded in the report.
pub async fn fetch_report<C: Connector>(
    connector: &C,
    server: &ServerConfig,
    limits: Limits,
) -> Result<Report> {
    let mut transport = connector.connect(server).await?;
    let report = collect_report(&mut transport, server, limits).await;
    if let Err(e) = transport.shutdown().await {
        debug!(error = %e, "shutdown after report failed");
    }
    Ok(report)
}

/// Run `version`, `status` and `workers` in order over one connection.
///
/// Once a response ends abnormally the connection is out of step with the
/// protocol, so the remaining queries are not sent.
pub async fn collect_report<S>(transport: &mut S, server: &ServerConfig, limits: Limits) -> Report
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = AdminClient::new(transport, limits).with_read_timeout(server.read_timeout());

    let (version, version_error) = match client.version().await {
        Ok(version) => (Some(version), None),
        Err(e) => {
            warn!(error = %e, "version query failed");
            (None, Some(e.to_string()))
        }
    };

    if version_error.is_some() {
        return Report {
            server: server.address(),
            version,
            version_error,
            status: Section::skipped("version query failed"),
            workers: Section::skipped("version query failed"),
        };
    }

    let status = client.status().await;
    let workers = if status.is_complete() {
        Section::from(client.workers().await)
    } else {
        Section::skipped("status response incomplete")
    };

    Report {
        server: server.address(),
        version,
        version_error,
        status: status.into(),
        workers,
    }
}

impl Report {
    /// Plain-text rendering for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Gearman Server Status for {}", self.server);
        match (&self.version, &self.version_error) {
            (Some(version), _) => {
                let _ = writeln!(out, "Server Version: {version}");
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Server Version: unavailable ({error})");
            }
            (None, None) => {}
        }

        out.push_str("\nStatus\n");
        render_section(
            &mut out,
            &["Function", "Total", "Running", "Available Workers"],
            &self.status,
            |r| {
                vec![
                    r.function_name.clone(),
                    r.total_jobs.to_string(),
                    r.running_jobs.to_string(),
                    r.available_workers.to_string(),
                ]
            },
        );

        out.push_str("\nWorkers\n");
        render_section(
            &mut out,
            &["File Descriptor", "IP Address", "Client ID", "Function"],
            &self.workers,
            |r| {
                vec![
                    r.file_descriptor.clone(),
                    r.ip_address.clone(),
                    r.client_id.clone(),
                    r.functions.join(" "),
                ]
            },
        );
        out
    }
}

fn write_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", padded.join("  ").trim_end());
}

fn render_section<T>(
    out: &mut String,
    headers: &[&str],
    section: &Section<T>,
    row: impl Fn(&T) -> Vec<String>,
) {
    let rows: Vec<Vec<String>> = section.records.iter().map(row).collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.len());
        }
    }

    write_row(out, &widths, headers.iter().copied());
    for cells in &rows {
        write_row(out, &widths, cells.iter().map(String::as_str));
    }

    for malformed in &section.malformed {
        let _ = writeln!(out, "! skipped {malformed}");
    }
    if !section.is_complete() {
        let error = section.error.as_deref().unwrap_or_default();
        let _ = writeln!(out, "! incomplete: {error}");
    }
}
