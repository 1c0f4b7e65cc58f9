// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP calls to the remote command-center server.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::auth_headers;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn user_agent() -> String {
    format!("CleverPrintingAgent/{AGENT_VERSION}")
}

pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(user_agent())
        .build()
        .expect("reqwest client configuration is valid")
}

#[derive(Debug, Deserialize)]
pub struct PendingJobsResponse {
    pub jobs: Vec<RemoteJobDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJobDto {
    pub id: String,
    pub printer_name: Option<String>,
    pub copies: Option<u32>,
    pub page_size: Option<String>,
    pub margins: Option<agent_core::types::Margins>,
    pub print_background: Option<bool>,
    pub priority: Option<agent_core::types::Priority>,
    pub pdf_base64: Option<String>,
    pub pdf: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_url: Option<String>,
    pub html: Option<String>,
    #[serde(alias = "url")]
    pub html_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[instrument(skip(http, api_key))]
pub async fn fetch_pending_jobs(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<Vec<RemoteJobDto>> {
    let url = join(base_url, "api/command-center/printing/pending-jobs?limit=10")?;
    let res = http
        .get(url)
        .headers(auth_headers(api_key))
        .send()
        .await
        .map_err(|e| AgentError::RemoteTransportError(e.to_string()))?;

    if !res.status().is_success() {
        return Err(AgentError::RemoteTransportError(format!(
            "pending-jobs returned {}",
            res.status()
        )));
    }

    let body: PendingJobsResponse = res
        .json()
        .await
        .map_err(|e| AgentError::RemoteTransportError(e.to_string()))?;
    Ok(body.jobs)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest<'a> {
    hostname: &'a str,
    agent_version: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

#[instrument(skip(http, api_key))]
pub async fn send_heartbeat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    hostname: &str,
    status: &str,
    error_message: Option<&str>,
) -> Result<()> {
    let url = join(base_url, "api/command-center/printing/heartbeat")?;
    let res = http
        .post(url)
        .headers(auth_headers(api_key))
        .json(&HeartbeatRequest {
            hostname,
            agent_version: AGENT_VERSION,
            status,
            error_message,
        })
        .send()
        .await
        .map_err(|e| AgentError::RemoteTransportError(e.to_string()))?;

    if !res.status().is_success() {
        return Err(AgentError::RemoteTransportError(format!(
            "heartbeat returned {}",
            res.status()
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReportRequest<'a> {
    job_id: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

/// Map a job's terminal spooler status to the vocabulary the server
/// expects: anything other than a clean completion is reported as
/// `"failed"`, including a user cancellation.
pub fn server_status_for(status: agent_core::types::JobStatus) -> &'static str {
    use agent_core::types::JobStatus::*;
    match status {
        Completed => "printed",
        _ => "failed",
    }
}

#[instrument(skip(http, api_key))]
pub async fn send_status_report(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    server_job_id: &str,
    status: &str,
    error_message: Option<&str>,
) -> Result<()> {
    let url = join(
        base_url,
        &format!("api/command-center/printing/jobs/{server_job_id}/status"),
    )?;
    let res = http
        .post(url)
        .headers(auth_headers(api_key))
        .json(&StatusReportRequest {
            job_id: server_job_id,
            status,
            error_message,
        })
        .send()
        .await
        .map_err(|e| AgentError::RemoteTransportError(e.to_string()))?;

    if !res.status().is_success() {
        return Err(AgentError::RemoteTransportError(format!(
            "status report returned {}",
            res.status()
        )));
    }
    Ok(())
}

/// Probe connectivity to the server, classifying the common DNS/connect/
/// timeout failure modes into a human-readable reason.
#[instrument(skip(http, api_key))]
pub async fn test_connection(http: &reqwest::Client, base_url: &str, api_key: &str) -> Result<()> {
    let url = join(base_url, "api/print-jobs/health")?;
    let res = http
        .get(url)
        .headers(auth_headers(api_key))
        .send()
        .await
        .map_err(classify_connection_error)?;

    if !res.status().is_success() {
        return Err(AgentError::RemoteTransportError(format!(
            "health probe returned {}",
            res.status()
        )));
    }
    Ok(())
}

fn classify_connection_error(e: reqwest::Error) -> AgentError {
    let reason = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection refused or host unreachable"
    } else {
        "request failed"
    };
    AgentError::RemoteTransportError(format!("{reason}: {e}"))
}

fn join(base_url: &str, path: &str) -> Result<Url> {
    let base = Url::parse(base_url)
        .map_err(|e| AgentError::RemoteTransportError(format!("invalid serverBaseUrl: {e}")))?;
    base.join(path)
        .map_err(|e| AgentError::RemoteTransportError(format!("invalid server path: {e}")))
}
