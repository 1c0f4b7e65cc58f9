// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The three periodic tasks that make up the remote client: polling for
// new jobs, heartbeating, and reporting terminal job status back to the
// server.

use std::sync::Arc;
use std::time::Duration;

use agent_core::config::ConfigStore;
use agent_core::error::AgentError;
use agent_core::types::{Job, Payload, PrintOptions};
use agent_spooler::{Spooler, SpoolerEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::client::{self, RemoteJobDto};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);
/// Backoff ladder used only when `pollBackoffEnabled` is set; resets to the
/// first step as soon as the server has work again.
const BACKOFF_STEPS_SECS: [u64; 4] = [5, 8, 15, 30];

pub struct RemoteClient {
    spooler: Arc<Spooler>,
    config: Arc<ConfigStore>,
    http: reqwest::Client,
    hostname: String,
}

impl RemoteClient {
    pub fn new(spooler: Arc<Spooler>, config: Arc<ConfigStore>) -> Arc<Self> {
        Arc::new(Self {
            spooler,
            config,
            http: client::build_http_client(),
            hostname: hostname(),
        })
    }

    /// Spawn the poll, heartbeat, and status-report tasks. Each is
    /// independent — a slow or failing server doesn't block the others.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).poll_loop()),
            tokio::spawn(Arc::clone(self).heartbeat_loop()),
            tokio::spawn(Arc::clone(self).status_report_loop()),
        ]
    }

    fn credentials(&self) -> Option<(String, String)> {
        let snapshot = self.config.snapshot();
        match (snapshot.server_base_url, snapshot.api_key) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    #[instrument(skip_all)]
    async fn poll_loop(self: Arc<Self>) {
        let mut backoff_step = 0usize;
        loop {
            let backoff_enabled = self.config.snapshot().poll_backoff_enabled;
            let Some((base_url, api_key)) = self.credentials() else {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            };

            let found_work = match client::fetch_pending_jobs(&self.http, &base_url, &api_key).await
            {
                Ok(jobs) => {
                    let had_jobs = !jobs.is_empty();
                    self.enqueue_batch(jobs).await;
                    had_jobs
                }
                Err(e) => {
                    warn!(error = %e, "polling for pending jobs failed");
                    false
                }
            };

            if !backoff_enabled {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            backoff_step = if found_work {
                0
            } else {
                (backoff_step + 1).min(BACKOFF_STEPS_SECS.len() - 1)
            };
            tokio::time::sleep(Duration::from_secs(BACKOFF_STEPS_SECS[backoff_step])).await;
        }
    }

    async fn enqueue_batch(&self, jobs: Vec<RemoteJobDto>) {
        for dto in jobs {
            let server_job_id = dto.id.clone();
            let job = match build_job(dto) {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "skipping malformed remote job");
                    self.report_enqueue_failure(&server_job_id, &e).await;
                    continue;
                }
            };
            match self.spooler.enqueue(job).await {
                Ok(_) => {}
                Err(AgentError::QueueFull) => {
                    warn!("local queue is full, stopping this batch without reporting failure");
                    break;
                }
                // The server already considers this id in flight; nothing
                // went wrong, so there is nothing to report.
                Err(AgentError::DuplicateServerJob(_)) => {}
                Err(e) => {
                    warn!(error = %e, "rejecting malformed remote job");
                    self.report_enqueue_failure(&server_job_id, &e).await;
                }
            }
        }
    }

    /// Report an enqueue failure (other than a full queue or in-flight
    /// dedup) back to the server as `failed`, so it does not redeliver the
    /// same malformed job forever.
    async fn report_enqueue_failure(&self, server_job_id: &str, error: &AgentError) {
        let Some((base_url, api_key)) = self.credentials() else {
            return;
        };
        if let Err(e) = client::send_status_report(
            &self.http,
            &base_url,
            &api_key,
            server_job_id,
            "failed",
            Some(&error.to_string()),
        )
        .await
        {
            warn!(server_job_id, error = %e, "failed to report enqueue failure to server");
        }
    }

    #[instrument(skip_all)]
    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            if let Some((base_url, api_key)) = self.credentials() {
                if let Err(e) =
                    client::send_heartbeat(&self.http, &base_url, &api_key, &self.hostname, "online", None)
                        .await
                {
                    warn!(error = %e, "heartbeat failed");
                } else {
                    info!("heartbeat sent");
                }
            }
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    }

    #[instrument(skip_all)]
    async fn status_report_loop(self: Arc<Self>) {
        let mut events = self.spooler.subscribe();
        loop {
            match events.recv().await {
                Ok(SpoolerEvent::Completed(job)) => self.report_terminal(&job, None).await,
                Ok(SpoolerEvent::Failed(job, error)) => self.report_terminal(&job, Some(error)).await,
                Ok(SpoolerEvent::Updated(job)) if job.status.is_terminal() => {
                    self.report_terminal(&job, job.last_error.clone()).await
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status-report loop lagged behind spooler events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn report_terminal(&self, job: &Job, error: Option<String>) {
        let Some(server_job_id) = &job.server_job_id else {
            return;
        };
        let Some((base_url, api_key)) = self.credentials() else {
            return;
        };
        let status = client::server_status_for(job.status);
        if let Err(e) = client::send_status_report(
            &self.http,
            &base_url,
            &api_key,
            server_job_id,
            status,
            error.as_deref(),
        )
        .await
        {
            warn!(job_id = %job.id, error = %e, "failed to report job status to server");
        }
    }

    /// Best-effort final heartbeat sent on orderly shutdown, before the
    /// poll/heartbeat/status-report tasks are aborted.
    pub async fn send_offline_heartbeat(&self) {
        let Some((base_url, api_key)) = self.credentials() else {
            return;
        };
        if let Err(e) =
            client::send_heartbeat(&self.http, &base_url, &api_key, &self.hostname, "offline", None)
                .await
        {
            warn!(error = %e, "final offline heartbeat failed");
        }
    }

    /// One-shot probe used by the local API's connectivity check.
    pub async fn test_connection(&self) -> agent_core::error::Result<()> {
        let (base_url, api_key) = self
            .credentials()
            .ok_or_else(|| AgentError::RemoteTransportError("serverBaseUrl/apiKey not set".into()))?;
        client::test_connection(&self.http, &base_url, &api_key).await
    }
}

fn build_job(dto: RemoteJobDto) -> Result<Job, AgentError> {
    let b64 = dto.pdf_base64.or(dto.pdf);
    let payload = if let Some(b64) = b64 {
        use base64::Engine as _;
        let b64 = b64
            .strip_prefix("data:application/pdf;base64,")
            .unwrap_or(&b64);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| AgentError::InvalidPayload(format!("invalid pdfBase64: {e}")))?;
        Payload::PdfBytes(bytes)
    } else if let Some(path) = dto.pdf_path {
        Payload::PdfPath(path)
    } else if let Some(url) = dto.pdf_url {
        Payload::PdfUrl(url)
    } else if let Some(html) = dto.html {
        Payload::Html(html)
    } else if let Some(url) = dto.html_url {
        Payload::HtmlUrl(url)
    } else {
        return Err(AgentError::InvalidPayload(
            "remote job has no recognized payload field".into(),
        ));
    };

    let options = PrintOptions {
        printer_name: dto.printer_name,
        copies: dto.copies.unwrap_or(1),
        page_size: dto.page_size.or_else(|| Some("A4".to_string())),
        margins: dto.margins,
        print_background: dto.print_background.unwrap_or(true),
    };

    let mut job = Job::new(payload, dto.priority.unwrap_or_default(), options);
    job.server_job_id = Some(dto.id);
    job.metadata = dto.metadata;
    Ok(job)
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        if let Ok(h) = std::env::var("HOSTNAME") {
            if !h.is_empty() {
                return h;
            }
        }
    }
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dto() -> RemoteJobDto {
        RemoteJobDto {
            id: "server-42".into(),
            printer_name: Some("Office_Laser".into()),
            copies: Some(2),
            page_size: None,
            margins: None,
            print_background: None,
            priority: None,
            pdf_base64: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b"%PDF-1.4",
            )),
            pdf: None,
            pdf_path: None,
            pdf_url: None,
            html: None,
            html_url: None,
            metadata: None,
        }
    }

    #[test]
    fn build_job_prefers_pdf_base64_over_pdf() {
        let mut dto = sample_dto();
        dto.pdf = Some("should-be-ignored".into());
        let job = build_job(dto).unwrap();
        assert!(matches!(job.payload, Payload::PdfBytes(_)));
        assert_eq!(job.server_job_id.as_deref(), Some("server-42"));
    }

    #[test]
    fn build_job_rejects_empty_dto() {
        let mut dto = sample_dto();
        dto.pdf_base64 = None;
        let err = build_job(dto).unwrap_err();
        assert!(matches!(err, AgentError::InvalidPayload(_)));
    }
}
