// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer enumeration via OS shell tools. No native printing API bindings
// are used — everything here shells out and tolerates the shell-out failing.

use std::time::Duration;

use agent_core::types::PrinterInfo;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{instrument, warn};

const ENUMERATE_DEADLINE: Duration = Duration::from_secs(5);

/// List printers known to the OS. Never returns an error: any enumeration
/// failure (missing tool, non-zero exit, timeout) is logged and treated as
/// "no printers found" so callers always get a usable (possibly empty) list.
#[instrument]
pub async fn enumerate_printers() -> Vec<PrinterInfo> {
    let printers = match timeout(ENUMERATE_DEADLINE, enumerate_platform()).await {
        Ok(printers) => printers,
        Err(_) => {
            warn!("printer enumeration timed out after {:?}", ENUMERATE_DEADLINE);
            Vec::new()
        }
    };
    dedup_by_name(printers)
}

fn dedup_by_name(printers: Vec<PrinterInfo>) -> Vec<PrinterInfo> {
    let mut seen = std::collections::HashSet::new();
    printers
        .into_iter()
        .filter(|p| seen.insert(p.name.clone()))
        .collect()
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
async fn enumerate_platform() -> Vec<PrinterInfo> {
    let default_name = run("lpstat", &["-d"])
        .await
        .and_then(|out| parse_default_destination(&out));

    let mut printers = match run("lpstat", &["-p"]).await {
        Some(out) => parse_lpstat_p(&out),
        None => Vec::new(),
    };

    if printers.is_empty() {
        if let Some(out) = run("lpstat", &["-a"]).await {
            printers = parse_lpstat_a(&out);
        }
    }

    if printers.is_empty() && cfg!(target_os = "macos") {
        if let Some(out) = run("system_profiler", &["SPPrintersDataType"]).await {
            printers = parse_system_profiler(&out);
        }
    }

    if let Some(name) = &default_name {
        for p in &mut printers {
            p.is_default = &p.name == name;
        }
    }

    printers
}

#[cfg(target_os = "windows")]
async fn enumerate_platform() -> Vec<PrinterInfo> {
    match run("wmic", &["printer", "get", "name", "/value"]).await {
        Some(out) => parse_wmic_value(&out),
        None => Vec::new(),
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
async fn enumerate_platform() -> Vec<PrinterInfo> {
    Vec::new()
}

async fn run(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output().await {
        Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(out) => {
            warn!(program, status = ?out.status, "printer enumeration command exited non-zero");
            None
        }
        Err(e) => {
            warn!(program, error = %e, "could not run printer enumeration command");
            None
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn parse_default_destination(out: &str) -> Option<String> {
    out.trim()
        .strip_prefix("system default destination:")
        .map(|s| s.trim().to_string())
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn parse_lpstat_p(out: &str) -> Vec<PrinterInfo> {
    out.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("printer ")?;
            let name = rest.split_whitespace().next()?.to_string();
            Some(PrinterInfo {
                display_name: name.clone(),
                name,
                description: None,
                is_default: false,
            })
        })
        .collect()
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn parse_lpstat_a(out: &str) -> Vec<PrinterInfo> {
    out.lines()
        .filter_map(|line| {
            let name = line.split_whitespace().next()?.to_string();
            Some(PrinterInfo {
                display_name: name.clone(),
                name,
                description: None,
                is_default: false,
            })
        })
        .collect()
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn parse_system_profiler(out: &str) -> Vec<PrinterInfo> {
    out.lines()
        .filter_map(|line| line.trim().strip_prefix("Printer Name:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| PrinterInfo {
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            is_default: false,
        })
        .collect()
}

#[cfg(target_os = "windows")]
fn parse_wmic_value(out: &str) -> Vec<PrinterInfo> {
    out.lines()
        .filter_map(|line| line.strip_prefix("Name="))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|name| PrinterInfo {
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            is_default: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_os = "macos", target_os = "linux"))]
    #[test]
    fn parses_lpstat_p_output() {
        let sample = "printer Office_Laser is idle.  enabled since Mon\nprinter Kitchen_Inkjet is idle.  enabled since Mon\n";
        let printers = parse_lpstat_p(sample);
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "Office_Laser");
        assert_eq!(printers[1].name, "Kitchen_Inkjet");
    }

    #[cfg(any(target_os = "macos", target_os = "linux"))]
    #[test]
    fn parses_default_destination() {
        let sample = "system default destination: Office_Laser\n";
        assert_eq!(
            parse_default_destination(sample),
            Some("Office_Laser".to_string())
        );
    }

    #[cfg(any(target_os = "macos", target_os = "linux"))]
    #[test]
    fn parses_lpstat_a_fallback() {
        let sample = "Office_Laser accepting requests since Mon\n";
        let printers = parse_lpstat_a(sample);
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].name, "Office_Laser");
    }

    #[cfg(any(target_os = "macos", target_os = "linux"))]
    #[test]
    fn parses_system_profiler_output() {
        let sample = "SPPrintersDataType:\n\n      Office_Laser:\n\n          Printer Name: Office_Laser\n          PPD: Generic\n";
        let printers = parse_system_profiler(sample);
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].name, "Office_Laser");
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn parses_wmic_value_output() {
        let sample = "\r\nName=Office Laser\r\n\r\nName=Kitchen Inkjet\r\n";
        let printers = parse_wmic_value(sample);
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "Office Laser");
    }
}
