// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the print agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locally-unique job identifier, opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority. Higher-priority jobs are dequeued before lower ones;
/// jobs of equal priority are served FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Lifecycle states of a print job. See the state machine in the spooler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Printing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// A job in one of these states is no longer active and may move to history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// The document content a job prints. Exactly one variant is populated per
/// job; `pdfBase64` takes precedence over `pdf`/`pdfPath` when both a byte
/// source and a path are supplied for the same job (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    /// Raw PDF bytes, usually arrived as base64 over the wire and decoded
    /// before reaching this type.
    PdfBytes(Vec<u8>),
    /// Path to a PDF already on disk. The spooler does not own this file
    /// and will not delete it.
    PdfPath(String),
    /// PDF to be fetched over HTTP(S) before printing.
    PdfUrl(String),
    /// Raw HTML content. Materializing this is out of scope for this core;
    /// enqueue validation accepts it, materialization rejects it.
    Html(String),
    /// HTML to be fetched over HTTP(S). Same materialization limitation as
    /// `Html`.
    HtmlUrl(String),
}

/// Printing options requested for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub printer_name: Option<String>,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default = "default_page_size")]
    pub page_size: Option<String>,
    pub margins: Option<Margins>,
    #[serde(default = "default_print_background")]
    pub print_background: bool,
}

fn default_copies() -> u32 {
    1
}

fn default_page_size() -> Option<String> {
    Some("A4".to_string())
}

fn default_print_background() -> bool {
    true
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            printer_name: None,
            copies: default_copies(),
            page_size: default_page_size(),
            margins: None,
            print_background: default_print_background(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// A print job as tracked by the spooler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Identifier assigned by the remote command-center server, for jobs
    /// that originated there. `None` for locally-submitted jobs.
    pub server_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub status: JobStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub payload: Payload,
    pub options: PrintOptions,
    /// Arbitrary passthrough metadata accepted on `/api/print` and echoed
    /// back verbatim on status reads; not interpreted by the spooler.
    pub metadata: Option<serde_json::Value>,
    /// Materialized PDF on disk, set once the materializer has run.
    pub temp_path: Option<String>,
}

impl Job {
    pub fn new(payload: Payload, priority: Priority, options: PrintOptions) -> Self {
        Self {
            id: JobId::new(),
            server_job_id: None,
            created_at: Utc::now(),
            priority,
            status: JobStatus::Queued,
            retry_count: 0,
            last_error: None,
            payload,
            options,
            metadata: None,
            temp_path: None,
        }
    }
}

/// A printer enumerated from the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_default: bool,
}
