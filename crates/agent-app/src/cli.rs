// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cleverprint-agentd", version, about = "Local print spooler agent")]
pub struct Cli {
    /// Directory holding config.json and temp print files. Defaults to the
    /// platform user-data directory.
    #[arg(long, env = "CLEVERPRINT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
}
