// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print execution: hands a materialized PDF to the OS print subsystem.
//
// Deliberately does not implement a printer driver or protocol client —
// printing is delegated entirely to OS-provided commands.

use std::path::Path;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{instrument, warn};

const PRINT_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for waiting out a kiosk-mode browser print dialog on Windows
/// before force-terminating it; success or failure are indistinguishable
/// in that path, so this is a best-effort wait, not a success signal.
const KIOSK_WAIT: Duration = Duration::from_secs(5);

/// Send `path` to `printer_name` with the given number of copies.
///
/// `sumatra_path` is the configured override consulted first on Windows;
/// see `find_sumatra` for the full resolution order.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn print_file(
    printer_name: &str,
    path: &Path,
    copies: u32,
    sumatra_path: Option<&str>,
) -> Result<()> {
    timeout(
        PRINT_TIMEOUT,
        print_platform(printer_name, path, copies, sumatra_path),
    )
    .await
    .map_err(|_| AgentError::PrintError(format!("print timed out after {PRINT_TIMEOUT:?}")))?
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
async fn print_platform(
    printer_name: &str,
    path: &Path,
    copies: u32,
    _sumatra_path: Option<&str>,
) -> Result<()> {
    let copies = copies.max(1).to_string();
    let output = Command::new("lp")
        .arg("-d")
        .arg(printer_name)
        .arg("-n")
        .arg(&copies)
        .arg(path)
        .output()
        .await
        .map_err(|e| AgentError::PrintError(format!("could not run lp: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::PrintError(format!(
            "lp exited with {}: {}",
            output.status, stderr
        )));
    }
    Ok(())
}

#[cfg(target_os = "windows")]
async fn print_platform(
    printer_name: &str,
    path: &Path,
    copies: u32,
    sumatra_path: Option<&str>,
) -> Result<()> {
    if let Some(sumatra) = find_sumatra(sumatra_path) {
        return print_via_sumatra(&sumatra, printer_name, path, copies).await;
    }
    warn!("SumatraPDF not found, falling back to OS print verb");
    if print_via_os_verb(path).await.is_ok() {
        return Ok(());
    }
    warn!("OS print verb failed, falling back to kiosk-mode browser print");
    print_via_kiosk_browser(path).await
}

/// Resolution order: configured `sumatraPath`; bundled
/// `<resources>/sumatra/SumatraPDF.exe`; `<app>/assets/windows/sumatra/
/// SumatraPDF.exe`; `<cwd>/sumatra/SumatraPDF.exe`. First existing path
/// wins.
#[cfg(target_os = "windows")]
fn find_sumatra(configured: Option<&str>) -> Option<std::path::PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    let candidates = [
        configured.map(std::path::PathBuf::from),
        exe_dir
            .as_ref()
            .map(|d| d.join("resources/sumatra/SumatraPDF.exe")),
        exe_dir
            .as_ref()
            .map(|d| d.join("assets/windows/sumatra/SumatraPDF.exe")),
        std::env::current_dir()
            .ok()
            .map(|d| d.join("sumatra/SumatraPDF.exe")),
    ];

    candidates.into_iter().flatten().find(|p| p.exists())
}

#[cfg(target_os = "windows")]
async fn print_via_sumatra(
    sumatra: &Path,
    printer_name: &str,
    path: &Path,
    _copies: u32,
) -> Result<()> {
    let mut cmd = Command::new(sumatra);
    cmd.arg("-silent");
    if printer_name.is_empty() {
        cmd.arg("-print-to-default");
    } else {
        cmd.arg("-print-to").arg(printer_name);
    }
    cmd.arg("-print-settings")
        .arg("fit,center,paper=auto,bin=auto")
        .arg(path);

    let output = cmd
        .output()
        .await
        .map_err(|e| AgentError::PrintError(format!("could not run SumatraPDF: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::PrintError(format!(
            "SumatraPDF exited with {}: {}",
            output.status, stderr
        )));
    }
    Ok(())
}

#[cfg(target_os = "windows")]
async fn print_via_os_verb(path: &Path) -> Result<()> {
    let output = Command::new("cmd")
        .arg("/C")
        .arg("start")
        .arg("")
        .arg("/B")
        .arg("/WAIT")
        .arg(path)
        .output()
        .await
        .map_err(|e| AgentError::PrintError(format!("could not invoke print verb: {e}")))?;
    if !output.status.success() {
        return Err(AgentError::PrintError(
            "OS print verb exited non-zero".into(),
        ));
    }
    Ok(())
}

#[cfg(target_os = "windows")]
async fn print_via_kiosk_browser(path: &Path) -> Result<()> {
    let mut child = Command::new("cmd")
        .arg("/C")
        .arg("start")
        .arg("msedge")
        .arg("--kiosk-printing")
        .arg(path)
        .spawn()
        .map_err(|e| AgentError::PrintError(format!("could not launch kiosk browser: {e}")))?;

    match timeout(KIOSK_WAIT, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            let _ = child.kill().await;
        }
    }
    // Success here only means the browser was launched and the wait window
    // elapsed, not that the page actually printed — the caller treats this
    // path as best-effort.
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
async fn print_platform(
    _printer_name: &str,
    _path: &Path,
    _copies: u32,
    _sumatra_path: Option<&str>,
) -> Result<()> {
    Err(AgentError::PrintError(
        "printing is not supported on this platform".into(),
    ))
}
