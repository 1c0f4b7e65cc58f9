// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The PDF Materializer: turns a job's payload into a PDF file on disk that
// the print executor can hand to the OS. Treats PDF bytes as opaque — no
// parsing, rasterizing, or re-encoding happens here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::types::Payload;
use tokio::time::timeout;
use tracing::instrument;

const FETCH_DEADLINE: Duration = Duration::from_secs(30);

/// A PDF ready to print, and whether the materializer is responsible for
/// deleting it once the job leaves the active set.
#[derive(Debug, Clone)]
pub struct MaterializedFile {
    pub path: PathBuf,
    pub owned: bool,
}

/// Resolve `payload` to a file on disk.
///
/// `pdfPath` is passed through untouched (the caller retains ownership and
/// must not delete it out from under an in-flight job). `pdfBytes` and
/// `pdfUrl` are written to a fresh temp file under `temp_dir`, which the
/// materializer then owns and the spooler must clean up exactly once.
#[instrument(skip(payload, http))]
pub async fn materialize(
    payload: &Payload,
    temp_dir: &Path,
    http: &reqwest::Client,
) -> Result<MaterializedFile> {
    match payload {
        Payload::PdfPath(p) => {
            let path = PathBuf::from(p);
            if !path.exists() {
                return Err(AgentError::MaterializeError(format!(
                    "pdfPath does not exist: {p}"
                )));
            }
            Ok(MaterializedFile { path, owned: false })
        }
        Payload::PdfBytes(bytes) => {
            let path = new_temp_path(temp_dir);
            write_and_verify(&path, bytes)?;
            Ok(MaterializedFile { path, owned: true })
        }
        Payload::PdfUrl(url) => {
            let bytes = fetch(http, url).await?;
            let path = new_temp_path(temp_dir);
            write_and_verify(&path, &bytes)?;
            Ok(MaterializedFile { path, owned: true })
        }
        Payload::Html(_) | Payload::HtmlUrl(_) => Err(AgentError::MaterializeError(
            "HTML payloads are not materialized: rendering is delegated to the OS print \
             pipeline, which requires PDF input"
                .into(),
        )),
    }
}

/// Remove a materialized temp file exactly once. A no-op for `pdfPath`
/// jobs, since the caller owns those.
pub fn cleanup(file: &MaterializedFile) {
    if file.owned {
        let _ = std::fs::remove_file(&file.path);
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = timeout(FETCH_DEADLINE, http.get(url).send())
        .await
        .map_err(|_| AgentError::MaterializeError(format!("timed out fetching {url}")))?
        .map_err(|e| AgentError::MaterializeError(format!("fetching {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AgentError::MaterializeError(format!(
            "fetching {url} returned {}",
            response.status()
        )));
    }

    timeout(FETCH_DEADLINE, response.bytes())
        .await
        .map_err(|_| AgentError::MaterializeError(format!("timed out reading body of {url}")))?
        .map(|b| b.to_vec())
        .map_err(|e| AgentError::MaterializeError(format!("reading body of {url} failed: {e}")))
}

fn write_and_verify(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644));
    }

    let written = std::fs::metadata(path)?.len();
    if written as usize != bytes.len() {
        let _ = std::fs::remove_file(path);
        return Err(AgentError::MaterializeError(format!(
            "short write: expected {} bytes, wrote {}",
            bytes.len(),
            written
        )));
    }
    Ok(())
}

fn new_temp_path(temp_dir: &Path) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    temp_dir.join(format!("print_job_{millis}_{}.pdf", random_suffix(9)))
}

/// A short pseudo-random alphanumeric suffix, without pulling in a `rand`
/// dependency: `RandomState`'s per-process keys are seeded from the OS.
fn random_suffix(len: usize) -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut out = String::with_capacity(len);
    let mut seed = RandomState::new().build_hasher().finish();
    for _ in 0..len {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let idx = (seed >> 33) as usize % ALPHABET.len();
        out.push(ALPHABET[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pdf_path_passthrough_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let missing = Payload::PdfPath(dir.path().join("nope.pdf").display().to_string());
        let err = materialize(&missing, dir.path(), &http).await.unwrap_err();
        assert!(matches!(err, AgentError::MaterializeError(_)));
    }

    #[tokio::test]
    async fn pdf_path_passthrough_is_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("existing.pdf");
        std::fs::write(&file_path, b"%PDF-1.4").unwrap();
        let http = reqwest::Client::new();
        let payload = Payload::PdfPath(file_path.display().to_string());
        let materialized = materialize(&payload, dir.path(), &http).await.unwrap();
        assert!(!materialized.owned);
        assert_eq!(materialized.path, file_path);
    }

    #[tokio::test]
    async fn pdf_bytes_are_written_and_verified() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let payload = Payload::PdfBytes(b"%PDF-1.4 hello".to_vec());
        let materialized = materialize(&payload, dir.path(), &http).await.unwrap();
        assert!(materialized.owned);
        assert!(materialized.path.exists());
        let contents = std::fs::read(&materialized.path).unwrap();
        assert_eq!(contents, b"%PDF-1.4 hello");
    }

    #[tokio::test]
    async fn html_payloads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let payload = Payload::Html("<h1>hi</h1>".into());
        let err = materialize(&payload, dir.path(), &http).await.unwrap_err();
        assert!(matches!(err, AgentError::MaterializeError(_)));
    }

    #[tokio::test]
    async fn cleanup_removes_owned_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let payload = Payload::PdfBytes(b"%PDF".to_vec());
        let owned = materialize(&payload, dir.path(), &http).await.unwrap();
        let path = owned.path.clone();
        cleanup(&owned);
        assert!(!path.exists());

        let file_path = dir.path().join("keep.pdf");
        std::fs::write(&file_path, b"%PDF").unwrap();
        let not_owned = MaterializedFile {
            path: file_path.clone(),
            owned: false,
        };
        cleanup(&not_owned);
        assert!(file_path.exists());
    }
}
